use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use crate::buffer::DeviceBuffer;
use crate::error::{DeviceError, DeviceResult};

/// Numeric identifier for a device generation.
///
/// Dispatch heuristics compare against this code when deciding whether an
/// architecture-specialized kernel variant applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchCode(pub u32);

/// The host runtime's architecture code.
pub const ARCH_HOST: ArchCode = ArchCode(1);

/// Read-only facts about a device, established once at context creation.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub arch: ArchCode,
    /// Native width of a cooperative lane group (power of two).
    pub wavefront: usize,
    /// Maximum lanes a single cooperative group may hold.
    pub max_group_lanes: usize,
    /// Group-local scratch capacity in bytes.
    pub max_shared_bytes: usize,
}

impl DeviceInfo {
    fn host() -> Self {
        Self {
            name: "host".to_string(),
            arch: ARCH_HOST,
            wavefront: 64,
            max_group_lanes: 1024,
            max_shared_bytes: 64 * 1024,
        }
    }
}

/// A device context: owns the architecture record and tracks allocations.
///
/// Buffers allocated from a context keep it alive through an `Arc` and
/// report their deallocation back for bookkeeping.
pub struct DeviceContext {
    info: DeviceInfo,
    allocated: AtomicUsize,
    mem_limit: usize,
}

impl DeviceContext {
    pub fn new() -> Arc<Self> {
        Self::with_memory_limit(usize::MAX)
    }

    /// Context with a hard allocation cap, for exercising out-of-memory
    /// paths.
    pub fn with_memory_limit(mem_limit: usize) -> Arc<Self> {
        let info = DeviceInfo::host();
        log::debug!(
            "device context: {} (arch {}, wavefront {}, {} max lanes/group)",
            info.name,
            info.arch.0,
            info.wavefront,
            info.max_group_lanes
        );
        Arc::new(Self {
            info,
            allocated: AtomicUsize::new(0),
            mem_limit,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Allocate a zero-initialized device buffer of `len` elements.
    pub fn alloc<T: Pod>(self: &Arc<Self>, len: usize) -> DeviceResult<DeviceBuffer<T>> {
        let bytes = len * std::mem::size_of::<T>();
        let in_use = self.allocated.load(Ordering::Relaxed);
        if in_use.saturating_add(bytes) > self.mem_limit {
            return Err(DeviceError::OutOfMemory {
                requested: bytes,
                in_use,
                limit: self.mem_limit,
            });
        }
        self.track_allocation(bytes);
        Ok(DeviceBuffer::new_zeroed(self.clone(), len))
    }

    /// Allocate and fill from a host slice.
    pub fn alloc_from<T: Pod>(self: &Arc<Self>, src: &[T]) -> DeviceResult<DeviceBuffer<T>> {
        let mut buf = self.alloc::<T>(src.len())?;
        buf.upload(src)?;
        Ok(buf)
    }

    pub fn allocated_bytes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    pub(crate) fn track_allocation(&self, bytes: usize) {
        let total = self.allocated.fetch_add(bytes, Ordering::Relaxed) + bytes;
        log::trace!("device alloc {} bytes, total {:.2}MB", bytes, total as f64 / 1_048_576.0);
    }

    pub(crate) fn track_deallocation(&self, bytes: usize) {
        self.allocated.fetch_sub(bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_tracked() {
        let ctx = DeviceContext::new();
        assert_eq!(ctx.allocated_bytes(), 0);
        let buf = ctx.alloc::<f32>(256).unwrap();
        assert_eq!(ctx.allocated_bytes(), 1024);
        drop(buf);
        assert_eq!(ctx.allocated_bytes(), 0);
    }

    #[test]
    fn memory_limit_is_enforced() {
        let ctx = DeviceContext::with_memory_limit(1024);
        let _a = ctx.alloc::<f64>(64).unwrap();
        let err = ctx.alloc::<f64>(64 + 1).unwrap_err();
        match err {
            DeviceError::OutOfMemory { requested, in_use, .. } => {
                assert_eq!(requested, 520);
                assert_eq!(in_use, 512);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn host_info_reports_wide_wavefront() {
        let ctx = DeviceContext::new();
        assert_eq!(ctx.info().wavefront, 64);
        assert_eq!(ctx.info().arch, ARCH_HOST);
    }
}
