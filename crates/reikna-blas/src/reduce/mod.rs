//! Tree reductions over cooperative lane groups.
//!
//! Summation order is fixed by the tree, not by data order: a butterfly
//! over each wavefront, wavefront sums staged to group scratch, then a
//! second butterfly over the staged sums. Any two runs over the same
//! data produce bit-identical results, which the self-dot fast path and
//! the finalize kernel both rely on.

use num_traits::Zero;
use reikna_device::{DevSlice, DeviceResult, Dim3, GroupCtx, LaunchConfig, Queue};

use crate::types::{Element, Scalar};

/// Butterfly sum over one wavefront. `lanes.len()` must be a power of
/// two; the total lands in lane 0.
///
/// At step `offset`, lane `i < offset` adds lane `i + offset` — the
/// shuffle-down tree, log2(len) steps.
pub fn wave_reduce_sum<A: Scalar>(lanes: &mut [A]) {
    debug_assert!(lanes.len().is_power_of_two());
    let mut offset = lanes.len() / 2;
    while offset > 0 {
        for i in 0..offset {
            let partner = lanes[i + offset];
            lanes[i] += partner;
        }
        offset /= 2;
    }
}

/// Group-wide sum: per-wavefront butterflies, then a butterfly over the
/// wavefront totals. Group size must be a power-of-two multiple of the
/// wavefront (or smaller than one wavefront).
pub fn group_reduce_sum<A: Scalar>(lanes: &mut [A], wavefront: usize) -> A {
    let n = lanes.len();
    debug_assert!(n.is_power_of_two());
    if n <= wavefront {
        wave_reduce_sum(lanes);
        return lanes[0];
    }
    let waves = n / wavefront;
    let mut staged = vec![A::zero(); waves];
    for (w, stage) in staged.iter_mut().enumerate() {
        let lane0 = w * wavefront;
        wave_reduce_sum(&mut lanes[lane0..lane0 + wavefront]);
        *stage = lanes[lane0];
    }
    wave_reduce_sum(&mut staged);
    staged[0]
}

/// Phase 2 of a two-phase reduction: one group per batch element sums
/// that element's `groups` partials from the scratch buffer and writes
/// the final value.
///
/// Lanes sweep `work` partials at a time; the tail shorter than `work`
/// is picked up from the end, one partial per low lane.
#[allow(clippy::too_many_arguments)]
pub(crate) fn launch_reduction_finalize<T: Element>(
    queue: &Queue,
    group_size: u32,
    work: u32,
    wavefront: usize,
    groups: u32,
    workspace: DevSlice<T::Acc>,
    out: DevSlice<T>,
    batch_count: i32,
) -> DeviceResult<()> {
    let cfg = LaunchConfig::new(Dim3::x(batch_count as u32), Dim3::x(group_size))
        .with_shared(wavefront * std::mem::size_of::<T::Acc>());
    queue.launch(cfg, move |g: GroupCtx| {
        let batch = g.group.x as usize;
        let base = batch * groups as usize;
        let lanes = g.lanes.x as usize;
        let work = work as usize;
        let n_sums = groups as usize;
        let remainder = n_sums % work;
        let end = n_sums - remainder;

        let mut partial = vec![T::Acc::zero(); lanes];
        for (tid, p) in partial.iter_mut().enumerate() {
            let mut sum = T::Acc::zero();
            let mut i = tid * work;
            while i < end {
                for j in 0..work {
                    sum += workspace.get(base + i + j);
                }
                i += lanes * work;
            }
            if tid < remainder {
                sum += workspace.get(base + n_sums - 1 - tid);
            }
            *p = sum;
        }
        let total = group_reduce_sum(&mut partial, wavefront);
        out.set(batch, T::from_acc(total));
    })
}

#[cfg(test)]
mod tests;
