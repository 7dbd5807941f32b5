//! Dot-product reduction engine.
//!
//! Every variant runs the same protocol: a map phase accumulates
//! products into per-lane partials, a tree reduction collapses each
//! group, and — when more than one group covers a batch element — a
//! finalize kernel sums the per-group partials from the scratch buffer.
//! The dispatch table decides which map kernel runs and whether phase 2
//! is needed at all.

use num_traits::Zero;
use reikna_device::{DevSlice, DeviceResult, Dim3, LaunchConfig, Queue};

use crate::dispatch::{self, DotKernel, DotLoad, DotPlan};
use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{dev_to_host, same_vector, ResultDest, VecArg};
use crate::reduce::{group_reduce_sum, launch_reduction_finalize, wave_reduce_sum};
use crate::types::{Element, Scalar};

/// `result[b] = sum_i x[i]*y[i]` for each batch element.
pub fn dot<T: Element>(
    handle: &Handle,
    n: i64,
    x: VecArg<T>,
    y: VecArg<T>,
    batch_count: i32,
    result: ResultDest<T>,
) -> Result<()> {
    dot_launcher(handle, n, x, y, batch_count, result, false)
}

/// `result[b] = sum_i conj(x[i])*y[i]`; identical to [`dot`] for real
/// element types.
pub fn dotc<T: Element>(
    handle: &Handle,
    n: i64,
    x: VecArg<T>,
    y: VecArg<T>,
    batch_count: i32,
    result: ResultDest<T>,
) -> Result<()> {
    dot_launcher(handle, n, x, y, batch_count, result, true)
}

/// Scratch bytes [`dot`] will request for this shape. Aliasing and
/// increments do not change the extent.
pub fn dot_workspace_size<T: Element>(
    handle: &Handle,
    n: i64,
    batch_count: i32,
    host_result: bool,
) -> usize {
    let plan = dispatch::select_dot(
        T::PRECISION,
        n,
        batch_count,
        false,
        false,
        handle.arch(),
        handle.tunables(),
    );
    dispatch::dot_workspace_bytes(
        &plan,
        std::mem::size_of::<T::Acc>(),
        std::mem::size_of::<T>(),
        batch_count,
        host_result,
    )
}

fn dot_launcher<T: Element>(
    handle: &Handle,
    n: i64,
    x: VecArg<T>,
    y: VecArg<T>,
    batch_count: i32,
    mut result: ResultDest<T>,
    conj: bool,
) -> Result<()> {
    let queue = handle.queue();

    // Quick return: results are forced to zero, operands never read.
    if n <= 0 || batch_count <= 0 {
        match &mut result {
            ResultDest::Host(dst) => {
                let count = batch_count.max(0) as usize;
                for v in dst.iter_mut().take(count) {
                    *v = bytemuck::Zeroable::zeroed();
                }
            }
            ResultDest::Device(dst) => {
                if batch_count > 0 {
                    queue.memset_zero(dst.subslice(0, batch_count as usize))?;
                }
            }
        }
        return Ok(());
    }

    let unit_inc = x.inc == 1 && y.inc == 1;
    let aliased = same_vector(&x, &y, batch_count);
    let plan = dispatch::select_dot(
        T::PRECISION,
        n,
        batch_count,
        unit_inc,
        aliased,
        handle.arch(),
        handle.tunables(),
    );

    let batches = batch_count as usize;
    let groups = plan.groups_per_batch as usize;
    let host_out = matches!(result, ResultDest::Host(_));
    let partial_len = if groups > 1 { groups * batches } else { 0 };
    let tail_len = if host_out { batches } else { 0 };
    let (workspace, tail) = handle.scratch_pair::<T::Acc, T>(partial_len, tail_len)?;

    let out: DevSlice<T> = match &result {
        ResultDest::Host(_) => tail,
        ResultDest::Device(dst) => *dst,
    };

    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    let wavefront = handle.wavefront();

    match plan.kernel {
        DotKernel::WavePerBatch => launch_wave_per_batch(
            queue, wavefront, plan.group_y, n, x, shiftx, y, shifty, batch_count, out, conj,
            aliased,
        )?,
        _ => {
            launch_map_phase(
                queue, &plan, wavefront, n, x, shiftx, y, shifty, batch_count, workspace, out,
                conj,
            )?;
            if groups > 1 {
                launch_reduction_finalize::<T>(
                    queue,
                    plan.group,
                    plan.work,
                    wavefront,
                    plan.groups_per_batch,
                    workspace,
                    out,
                    batch_count,
                )?;
            }
        }
    }

    // Host pointer mode blocks on queue completion before the copy-back.
    if let ResultDest::Host(dst) = result {
        queue.synchronize()?;
        dev_to_host(out, &mut dst[..batches]);
    }
    Ok(())
}

#[inline]
fn conj_if<A: Scalar>(v: A, conj: bool) -> A {
    if conj {
        v.conj()
    } else {
        v
    }
}

#[allow(clippy::too_many_arguments)]
fn launch_map_phase<T: Element>(
    queue: &Queue,
    plan: &DotPlan,
    wavefront: usize,
    n: i64,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    workspace: DevSlice<T::Acc>,
    out: DevSlice<T>,
    conj: bool,
) -> DeviceResult<()> {
    let groups = plan.groups_per_batch.max(1);
    let lanes = plan.group as usize;
    let work = plan.work as usize;
    let kernel = plan.kernel;
    let load = plan.load;
    let xinc = x.inc;
    let yinc = y.inc;

    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::x(plan.group),
    )
    .with_shared(lanes * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);
        let grid_x = g.grid.x as usize;
        let step = (lanes * grid_x) as i64;
        let gbase = (g.group.x as usize * lanes) as i64;

        let xl = |i: i64| conj_if(xs.get((shiftx + i * xinc) as usize).to_acc(), conj);
        let yl = |i: i64| ys.get((shifty + i * yinc) as usize).to_acc();

        let mut partial = vec![T::Acc::zero(); lanes];
        for (tid, lane) in partial.iter_mut().enumerate() {
            let mut sum = T::Acc::zero();
            match (kernel, load) {
                (DotKernel::Unrolled4, _) => {
                    let mut i = gbase + tid as i64;
                    if i + 3 * step < n {
                        sum += yl(i) * xl(i);
                        sum += yl(i + step) * xl(i + step);
                        sum += yl(i + 2 * step) * xl(i + 2 * step);
                        sum += yl(i + 3 * step) * xl(i + 3 * step);
                        i += 4 * step;
                    }
                    while i < 4 * step && i < n {
                        sum += yl(i) * xl(i);
                        i += step;
                    }
                }
                (_, DotLoad::SelfMagnitude) => {
                    let mut i = gbase + tid as i64;
                    let mut j = 0;
                    while j < work && i < n {
                        let xv = xs.get((shiftx + i * xinc) as usize).to_acc();
                        sum += xv * conj_if(xv, conj);
                        i += step;
                        j += 1;
                    }
                }
                (_, DotLoad::UnitPaired) => {
                    // two elements per step; the odd tail is a single load
                    let mut i = (gbase + tid as i64) * 2;
                    let step2 = step * 2;
                    let mut j = 0;
                    while j < work && i < n - 1 {
                        for k in 0..2 {
                            sum += ys.get((shifty + i + k) as usize).to_acc()
                                * conj_if(xs.get((shiftx + i + k) as usize).to_acc(), conj);
                        }
                        i += step2;
                        j += 1;
                    }
                    if n % 2 == 1 && i == n - 1 {
                        sum += ys.get((shifty + i) as usize).to_acc()
                            * conj_if(xs.get((shiftx + i) as usize).to_acc(), conj);
                    }
                }
                (_, DotLoad::Unit) => {
                    let mut i = gbase + tid as i64;
                    let mut j = 0;
                    while j < work && i < n {
                        sum += ys.get((shifty + i) as usize).to_acc()
                            * conj_if(xs.get((shiftx + i) as usize).to_acc(), conj);
                        i += step;
                        j += 1;
                    }
                }
                (_, DotLoad::Strided) => {
                    let mut i = gbase + tid as i64;
                    let mut j = 0;
                    while j < work && i < n {
                        sum += yl(i) * xl(i);
                        i += step;
                        j += 1;
                    }
                }
            }
            *lane = sum;
        }

        let sum = group_reduce_sum(&mut partial, wavefront);
        if grid_x == 1 {
            out.set(batch, T::from_acc(sum));
        } else {
            workspace.set(g.group.x as usize + batch * grid_x, sum);
        }
    })
}

/// Small-n/high-batch specialization: one wavefront per batch element,
/// several batch rows per group, results written directly.
#[allow(clippy::too_many_arguments)]
fn launch_wave_per_batch<T: Element>(
    queue: &Queue,
    wavefront: usize,
    rows: u32,
    n: i64,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    out: DevSlice<T>,
    conj: bool,
    aliased: bool,
) -> DeviceResult<()> {
    let grid = (batch_count as u32 - 1) / rows + 1;
    let xinc = x.inc;
    let yinc = y.inc;
    let cfg = LaunchConfig::new(Dim3::x(grid), Dim3::xy(wavefront as u32, rows))
        .with_shared(wavefront * rows as usize * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        for ty in 0..rows as usize {
            let batch = g.group.x as usize * rows as usize + ty;
            if batch >= batch_count as usize {
                continue;
            }
            let xs = x.resolve(batch);
            let ys = y.resolve(batch);
            let mut partial = vec![T::Acc::zero(); wavefront];
            for (tx, lane) in partial.iter_mut().enumerate() {
                let mut sum = T::Acc::zero();
                let mut i = tx as i64;
                while i < n {
                    let xv = conj_if(xs.get((shiftx + i * xinc) as usize).to_acc(), conj);
                    let yv = if aliased {
                        xs.get((shiftx + i * xinc) as usize).to_acc()
                    } else {
                        ys.get((shifty + i * yinc) as usize).to_acc()
                    };
                    sum += xv * yv;
                    i += wavefront as i64;
                }
                *lane = sum;
            }
            wave_reduce_sum(&mut partial);
            out.set(batch, T::from_acc(partial[0]));
        }
    })
}

#[cfg(test)]
mod tests;
