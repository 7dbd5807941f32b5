use std::sync::{Arc, Mutex};

use bytemuck::Pod;
use reikna_device::{ArchCode, DevSlice, DeviceBuffer, DeviceContext, Queue};

use crate::error::Result;
use crate::ops::gemm::MatmulBackend;
use crate::tuning::Tunables;

pub(crate) fn align8(bytes: usize) -> usize {
    (bytes + 7) & !7
}

/// Per-caller state: the device context, the ordered queue every kernel
/// of this handle is enqueued on, the tuning table, and the reduction
/// scratch allocation.
///
/// The scratch allocation grows monotonically and is reused across
/// calls; its *contents* never survive a call — phase 1 writes it,
/// phase 2 consumes it, and the next call may overwrite everything. A
/// handle serves one in-flight call at a time; concurrent callers own
/// separate handles (and thereby separate queues).
pub struct Handle {
    ctx: Arc<DeviceContext>,
    queue: Queue,
    tunables: Tunables,
    scratch: Mutex<Option<DeviceBuffer<u64>>>,
    backend: Option<Arc<dyn MatmulBackend>>,
}

impl Handle {
    pub fn new(ctx: &Arc<DeviceContext>) -> Self {
        let info = ctx.info();
        log::debug!(
            "blas handle on {} (arch {}, wavefront {})",
            info.name,
            info.arch.0,
            info.wavefront
        );
        Self {
            ctx: ctx.clone(),
            queue: Queue::new(ctx),
            tunables: Tunables::default(),
            scratch: Mutex::new(None),
            backend: None,
        }
    }

    pub fn with_tunables(mut self, tunables: Tunables) -> Self {
        log::debug!("blas handle: custom tuning table installed");
        self.tunables = tunables;
        self
    }

    /// Install the external matmul collaborator tried ahead of the
    /// source-level gemm kernel.
    pub fn with_backend(mut self, backend: Arc<dyn MatmulBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.ctx
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn arch(&self) -> ArchCode {
        self.ctx.info().arch
    }

    pub fn wavefront(&self) -> usize {
        self.ctx.info().wavefront
    }

    pub(crate) fn backend(&self) -> Option<&Arc<dyn MatmulBackend>> {
        self.backend.as_ref()
    }

    /// Scratch view of at least `bytes`, reusing (and growing) the cached
    /// allocation. The view is exclusively owned by the current call.
    pub(crate) fn scratch(&self, bytes: usize) -> Result<DevSlice<u64>> {
        let words = align8(bytes) / 8;
        let mut guard = self.scratch.lock().expect("scratch lock");
        let grow = match guard.as_ref() {
            Some(buf) => buf.len() < words,
            None => true,
        };
        if grow {
            log::debug!("blas handle: scratch grows to {} bytes", words * 8);
            *guard = None; // release before the larger allocation
            *guard = Some(self.ctx.alloc::<u64>(words)?);
        }
        Ok(guard.as_ref().expect("scratch present").slice().subslice(0, words))
    }

    /// Two typed scratch regions carved from one allocation: reduction
    /// partials and a result staging tail.
    pub(crate) fn scratch_pair<A: Pod, B: Pod>(
        &self,
        a_len: usize,
        b_len: usize,
    ) -> Result<(DevSlice<A>, DevSlice<B>)> {
        let a_bytes = align8(a_len * std::mem::size_of::<A>());
        let b_bytes = align8(b_len * std::mem::size_of::<B>());
        let words = self.scratch(a_bytes + b_bytes)?;
        let a_words = a_bytes / 8;
        let a = words.subslice(0, a_words.max(1).min(words.len()));
        let b = words.subslice(a_words, b_bytes / 8);
        let a = if a_len == 0 {
            a.cast::<A>().subslice(0, 0)
        } else {
            a.cast::<A>().subslice(0, a_len)
        };
        let b = if b_len == 0 {
            b.cast::<B>().subslice(0, 0)
        } else {
            b.cast::<B>().subslice(0, b_len)
        };
        Ok((a, b))
    }
}
