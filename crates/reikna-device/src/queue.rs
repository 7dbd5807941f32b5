use std::sync::Arc;

use bytemuck::Pod;
use rayon::prelude::*;

use crate::buffer::DevSlice;
use crate::context::DeviceContext;
use crate::error::{DeviceError, DeviceResult};

/// Grid or group extent in three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub const fn x(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }

    pub const fn xy(x: u32, y: u32) -> Self {
        Self { x, y, z: 1 }
    }

    pub fn count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// Shape of one kernel launch: grid of cooperative groups, lanes per
/// group, and the group-local scratch the kernel will stage.
#[derive(Debug, Clone, Copy)]
pub struct LaunchConfig {
    pub grid: Dim3,
    pub group: Dim3,
    pub shared_bytes: usize,
}

impl LaunchConfig {
    pub fn new(grid: Dim3, group: Dim3) -> Self {
        Self {
            grid,
            group,
            shared_bytes: 0,
        }
    }

    pub fn with_shared(mut self, bytes: usize) -> Self {
        self.shared_bytes = bytes;
        self
    }
}

/// Per-group execution context handed to a kernel body.
#[derive(Debug, Clone, Copy)]
pub struct GroupCtx {
    /// Index of this group within the grid.
    pub group: Dim3,
    pub grid: Dim3,
    pub lanes: Dim3,
}

impl GroupCtx {
    /// Total lanes in the group.
    pub fn lane_count(&self) -> usize {
        self.lanes.count() as usize
    }
}

/// An ordered execution queue bound to one device context.
///
/// Work submitted to a queue completes in submission order: a kernel
/// enqueued after another observes all of its writes. The host runtime
/// realizes this by executing each launch to completion at submission;
/// `synchronize` is the point where host-visible results are guaranteed,
/// and stays in the calling convention for runtimes that overlap.
pub struct Queue {
    ctx: Arc<DeviceContext>,
}

impl Queue {
    pub fn new(ctx: &Arc<DeviceContext>) -> Self {
        Self { ctx: ctx.clone() }
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    /// Launch `body` once per cooperative group in `cfg.grid`.
    ///
    /// Groups may run concurrently and in any order; the body must write
    /// disjoint locations per group except through [`crate::AtomicAdd`].
    pub fn launch<F>(&self, cfg: LaunchConfig, body: F) -> DeviceResult<()>
    where
        F: Fn(GroupCtx) + Send + Sync,
    {
        let info = self.ctx.info();
        if cfg.grid.count() == 0 || cfg.group.count() == 0 {
            return Err(DeviceError::InvalidLaunch("empty grid or group".into()));
        }
        if cfg.group.count() as usize > info.max_group_lanes {
            return Err(DeviceError::InvalidLaunch(format!(
                "{} lanes exceeds device maximum {}",
                cfg.group.count(),
                info.max_group_lanes
            )));
        }
        if cfg.shared_bytes > info.max_shared_bytes {
            return Err(DeviceError::InvalidLaunch(format!(
                "{} shared bytes exceeds device maximum {}",
                cfg.shared_bytes, info.max_shared_bytes
            )));
        }

        let grid = cfg.grid;
        let per_plane = grid.x as u64 * grid.y as u64;
        (0..grid.count()).into_par_iter().for_each(|flat| {
            let z = (flat / per_plane) as u32;
            let rem = flat % per_plane;
            let y = (rem / grid.x as u64) as u32;
            let x = (rem % grid.x as u64) as u32;
            body(GroupCtx {
                group: Dim3::new(x, y, z),
                grid,
                lanes: cfg.group,
            });
        });
        Ok(())
    }

    /// Zero a device region, ordered like any other queue operation.
    pub fn memset_zero<T: Pod>(&self, dst: DevSlice<T>) -> DeviceResult<()> {
        unsafe {
            std::ptr::write_bytes(dst.raw(), 0, dst.len());
        }
        Ok(())
    }

    /// Block until all submitted work has completed.
    pub fn synchronize(&self) -> DeviceResult<()> {
        Ok(())
    }
}
