//! Matrix-vector tiling engine: `y := alpha*op(A)*x + beta*y`.
//!
//! Two structurally different tilings, chosen by `op`. The non-transpose
//! direction walks scattered row elements across column-major storage, so
//! each output row belongs to one lane accumulating four-column groups.
//! The transpose direction is a per-column dot product and reuses the
//! group reduction tree. Large square problems on the tuned architecture
//! take double-buffered tilings that overlap the next tile's loads with
//! the current tile's arithmetic; those accumulate into y with atomic
//! adds and are the library's only source of run-to-run rounding
//! variation.
//!
//! `alpha == 0` never loads A or x — the early exit sits before any
//! shared-scratch write, so it cannot strand a lane behind a barrier.

use num_complex::{Complex32, Complex64};
use num_traits::{One, Zero};
use reikna_device::{AtomicAdd, DevSlice, DeviceResult, Dim3, LaunchConfig, Queue};

use crate::dispatch::{self, GemvKernel};
use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg, VecArg};
use crate::reduce::group_reduce_sum;
use crate::types::{Element, Op, Scalar};

/// Atomic accumulation in the kernel accumulator type. Complex values
/// accumulate componentwise: the two halves land atomically but not as a
/// pair, which is within the documented reordering license of the atomic
/// tilings.
pub(crate) trait AtomicAcc: Scalar {
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self);
}

impl AtomicAcc for f32 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        <f32 as AtomicAdd>::atomic_add(dst, i, value);
    }
}

impl AtomicAcc for f64 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        <f64 as AtomicAdd>::atomic_add(dst, i, value);
    }
}

impl AtomicAcc for Complex32 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        let parts = dst.cast::<f32>();
        <f32 as AtomicAdd>::atomic_add(&parts, 2 * i, value.re);
        <f32 as AtomicAdd>::atomic_add(&parts, 2 * i + 1, value.im);
    }
}

impl AtomicAcc for Complex64 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        let parts = dst.cast::<f64>();
        <f64 as AtomicAdd>::atomic_add(&parts, 2 * i, value.re);
        <f64 as AtomicAdd>::atomic_add(&parts, 2 * i + 1, value.im);
    }
}

#[inline]
fn conj_if<A: Scalar>(v: A, conj: bool) -> A {
    if conj {
        v.conj()
    } else {
        v
    }
}

pub fn gemv<T: Element>(
    handle: &Handle,
    op: Op,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()>
where
    T::Acc: AtomicAcc,
{
    if m == 0 || n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if let (Some(av), Some(bv)) = (alpha.host_value(), beta.host_value()) {
        if av.is_zero() && bv.is_one() {
            return Ok(());
        }
    }

    let queue = handle.queue();
    let tun = handle.tunables();
    let (xlen, ylen) = if op.is_transposed() { (m, n) } else { (n, m) };
    let shiftx = x.shift(xlen);
    let shifty = y.shift(ylen);
    let conj = op.is_conjugated();
    let plan = dispatch::select_gemv(T::PRECISION, op, m, n, batch_count, handle.arch(), tun);
    let wavefront = handle.wavefront();

    match plan.kernel {
        GemvKernel::NSmallBatched => launch_gemvn_small_batched(
            queue, plan.group, m, n, alpha, a, x, shiftx, beta, y, shifty, batch_count,
        )?,
        GemvKernel::NTiled => launch_gemvn_tiled(
            queue, plan.group, m, n, alpha, a, x, shiftx, beta, y, shifty, batch_count,
        )?,
        GemvKernel::NTiledNarrow => launch_gemvn_narrow(
            queue, plan.group, m, n, alpha, a, x, shiftx, beta, y, shifty, batch_count,
        )?,
        GemvKernel::NDoubleBuffered => {
            launch_scal(
                queue,
                tun.gemv.scal_group_size,
                ylen,
                beta,
                y,
                shifty,
                batch_count,
            )?;
            launch_gemvn_double_buffered(
                queue,
                plan.group,
                plan.work,
                plan.groups_per_batch,
                m,
                n,
                alpha,
                a,
                x,
                shiftx,
                y,
                shifty,
                batch_count,
            )?;
        }
        GemvKernel::TSharedX => launch_gemvt_shared_x(
            queue, plan.group.0, m, n, alpha, a, x, shiftx, beta, y, shifty, batch_count, conj,
        )?,
        GemvKernel::TGroupPerColumn => launch_gemvt_column(
            queue, plan.group.0, wavefront, m, n, alpha, a, x, shiftx, beta, y, shifty,
            batch_count, conj,
        )?,
        GemvKernel::TTwoPhase => {
            let groups = plan.groups_per_batch as usize;
            let elems = groups * n as usize * batch_count as usize;
            let (ws, _) = handle.scratch_pair::<T::Acc, u8>(elems, 0)?;
            launch_gemvt_skinny(
                queue,
                plan.group.0,
                plan.work,
                plan.groups_per_batch,
                wavefront,
                m,
                n,
                alpha,
                a,
                x,
                shiftx,
                batch_count,
                conj,
                ws,
            )?;
            launch_gemvt_skinny_reduce(
                queue,
                plan.group.0,
                plan.work,
                plan.groups_per_batch,
                wavefront,
                n,
                beta,
                y,
                shifty,
                batch_count,
                ws,
            )?;
        }
        GemvKernel::TDoubleBuffered => {
            launch_scal(
                queue,
                tun.gemv.scal_group_size,
                ylen,
                beta,
                y,
                shifty,
                batch_count,
            )?;
            launch_gemvt_double_buffered(
                queue,
                plan.group,
                plan.work,
                plan.groups_per_batch,
                m,
                n,
                alpha,
                a,
                x,
                shiftx,
                y,
                shifty,
                batch_count,
                conj,
            )?;
        }
    }
    Ok(())
}

/// Scratch bytes a gemv call of this shape will request.
pub fn gemv_workspace_size<T: Element>(
    handle: &Handle,
    op: Op,
    m: i64,
    n: i64,
    batch_count: i32,
) -> usize {
    let plan = dispatch::select_gemv(
        T::PRECISION,
        op,
        m,
        n,
        batch_count,
        handle.arch(),
        handle.tunables(),
    );
    dispatch::gemv_workspace_bytes(&plan, std::mem::size_of::<T::Acc>(), n, batch_count)
}

/// `y := beta*y` ahead of the atomic-accumulate tilings. Skips batches
/// whose beta is one.
#[allow(clippy::too_many_arguments)]
pub(crate) fn launch_scal<T: Element>(
    queue: &Queue,
    group_size: u32,
    len: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
) -> DeviceResult<()> {
    let groups = ((len as u32) - 1) / group_size + 1;
    let yinc = y.inc;
    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::x(group_size),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let b = beta.get(batch);
        if b.is_one() {
            return;
        }
        let ys = y.resolve(batch);
        let lanes = g.lanes.x as usize;
        for t in 0..lanes {
            let tid = g.group.x as usize * lanes + t;
            if (tid as i64) < len {
                let idx = (shifty + tid as i64 * yinc) as usize;
                if b.is_zero() {
                    ys.set(idx, T::from_acc(T::Acc::zero()));
                } else {
                    ys.set(idx, T::from_acc(b * ys.get(idx).to_acc()));
                }
            }
        }
    })
}

/// Tiny-matrix, deep-batch non-transpose kernel: several batch elements
/// share one group, each staging its whole alpha*x in scratch, each lane
/// producing one output row with no inter-lane reduction.
#[allow(clippy::too_many_arguments)]
fn launch_gemvn_small_batched<T: Element>(
    queue: &Queue,
    group: (u32, u32),
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
) -> DeviceResult<()> {
    let (nb_x, nb_batch) = (group.0 as usize, group.1 as usize);
    let groups = ((batch_count as u32) - 1) / group.1 + 1;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(Dim3::x(groups), Dim3::xy(group.0, group.1))
        .with_shared(nb_x * nb_batch * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        for ty in 0..nb_batch {
            let batch = g.group.x as usize * nb_batch + ty;
            if batch >= batch_count as usize {
                continue;
            }
            let al = alpha.get(batch);
            let be = beta.get(batch);
            if al.is_zero() && be.is_one() {
                continue;
            }
            let ys = y.resolve(batch);

            if al.is_zero() {
                for tx in 0..m as usize {
                    let idx = (shifty + tx as i64 * yinc) as usize;
                    if be.is_zero() {
                        ys.set(idx, T::from_acc(T::Acc::zero()));
                    } else {
                        ys.set(idx, T::from_acc(be * ys.get(idx).to_acc()));
                    }
                }
                continue;
            }

            let asl = a.resolve(batch);
            let xs = x.resolve(batch);
            let mut sx = vec![T::Acc::zero(); nb_x];
            for (tx, s) in sx.iter_mut().enumerate().take(n as usize) {
                *s = al * xs.get((shiftx + tx as i64 * xinc) as usize).to_acc();
            }

            for tx in 0..m.min(nb_x as i64) {
                let idx = (shifty + tx * yinc) as usize;
                let mut res = if be.is_zero() {
                    T::Acc::zero()
                } else {
                    be * ys.get(idx).to_acc()
                };
                for (j, s) in sx.iter().enumerate().take(n as usize) {
                    res += asl.get((offa + tx + j as i64 * lda) as usize).to_acc() * *s;
                }
                ys.set(idx, T::from_acc(res));
            }
        }
    })
}

/// Non-transpose tiling: each lane owns four row-blocks and sweeps the
/// columns in groups of four, finishing with a cross-column-group
/// reduction through group scratch.
#[allow(clippy::too_many_arguments)]
fn launch_gemvn_tiled<T: Element>(
    queue: &Queue,
    group: (u32, u32),
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
) -> DeviceResult<()> {
    let (dim_x, dim_y) = (group.0 as usize, group.1 as usize);
    let rows_per_group = (dim_x * 4) as i64;
    let groups = ((m - 1) / rows_per_group + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::xy(group.0, group.1),
    )
    .with_shared(dim_x * 4 * dim_y * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let ys = y.resolve(batch);
        let group_base = g.group.x as i64 * rows_per_group;

        if al.is_zero() {
            for tid in 0..dim_x * 4 {
                let ind = group_base + tid as i64;
                if ind < m {
                    let idx = (shifty + ind * yinc) as usize;
                    if be.is_zero() {
                        ys.set(idx, T::from_acc(T::Acc::zero()));
                    } else {
                        ys.set(idx, T::from_acc(be * ys.get(idx).to_acc()));
                    }
                }
            }
            return;
        }

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let aload = |row: i64, col: i64| asl.get((offa + row + col * lda) as usize).to_acc();
        let xload = |i: i64| xs.get((shiftx + i * xinc) as usize).to_acc();

        let mut sdata = vec![T::Acc::zero(); dim_x * 4 * dim_y];
        let n_tail = n % (4 * dim_y as i64);

        for ty in 0..dim_y {
            for tx in 0..dim_x {
                let ind = group_base + tx as i64;
                let mut res = [T::Acc::zero(); 4];
                let mut col = (ty * 4) as i64;
                while col < n - n_tail {
                    let rx = [xload(col), xload(col + 1), xload(col + 2), xload(col + 3)];
                    for k in 0..4 {
                        let row = ind + (k * dim_x) as i64;
                        if row >= m {
                            break;
                        }
                        for (c, xv) in rx.iter().enumerate() {
                            res[k] += aload(row, col + c as i64) * *xv;
                        }
                    }
                    col += 4 * dim_y as i64;
                }
                if n_tail > 0 {
                    for k in 0..4 {
                        let row = ind + (k * dim_x) as i64;
                        if row >= m {
                            break;
                        }
                        for c in 0..4i64 {
                            if col + c < n {
                                res[k] += aload(row, col + c) * xload(col + c);
                            }
                        }
                    }
                }
                for k in 0..4 {
                    sdata[tx + k * dim_x + ty * dim_x * 4] = res[k];
                }
            }
        }

        for tid in 0..dim_x * 4 {
            let mut sum = sdata[tid];
            for i in 1..dim_y {
                sum += sdata[tid + dim_x * 4 * i];
            }
            let ind = group_base + tid as i64;
            if ind < m {
                let idx = (shifty + ind * yinc) as usize;
                let v = if be.is_zero() {
                    al * sum
                } else {
                    al * sum + be * ys.get(idx).to_acc()
                };
                ys.set(idx, T::from_acc(v));
            }
        }
    })
}

/// Single-row-per-lane non-transpose variant for the widest element
/// type, where the four-row tiling would exhaust registers.
#[allow(clippy::too_many_arguments)]
fn launch_gemvn_narrow<T: Element>(
    queue: &Queue,
    group: (u32, u32),
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
) -> DeviceResult<()> {
    let (dim_x, dim_y) = (group.0 as usize, group.1 as usize);
    let groups = ((m - 1) / dim_x as i64 + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::xy(group.0, group.1),
    )
    .with_shared(dim_x * dim_y * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let ys = y.resolve(batch);
        let group_base = g.group.x as i64 * dim_x as i64;

        if al.is_zero() {
            for tid in 0..dim_x {
                let ind = group_base + tid as i64;
                if ind < m {
                    let idx = (shifty + ind * yinc) as usize;
                    if be.is_zero() {
                        ys.set(idx, T::from_acc(T::Acc::zero()));
                    } else {
                        ys.set(idx, T::from_acc(be * ys.get(idx).to_acc()));
                    }
                }
            }
            return;
        }

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let mut sdata = vec![T::Acc::zero(); dim_x * dim_y];
        let n_tail = n % dim_y as i64;

        for ty in 0..dim_y {
            for tx in 0..dim_x {
                let ind = group_base + tx as i64;
                let mut res = T::Acc::zero();
                let mut col = ty as i64;
                while col < n - n_tail {
                    if ind < m {
                        res += asl.get((offa + ind + col * lda) as usize).to_acc()
                            * xs.get((shiftx + col * xinc) as usize).to_acc();
                    }
                    col += dim_y as i64;
                }
                if n_tail > 0 && col < n && ind < m {
                    res += asl.get((offa + ind + col * lda) as usize).to_acc()
                        * xs.get((shiftx + col * xinc) as usize).to_acc();
                }
                sdata[tx + ty * dim_x] = res;
            }
        }

        for tid in 0..dim_x {
            let mut sum = sdata[tid];
            for i in 1..dim_y {
                sum += sdata[tid + dim_x * i];
            }
            let ind = group_base + tid as i64;
            if ind < m {
                let idx = (shifty + ind * yinc) as usize;
                let v = if be.is_zero() {
                    al * sum
                } else {
                    al * sum + be * ys.get(idx).to_acc()
                };
                ys.set(idx, T::from_acc(v));
            }
        }
    })
}

/// Double-buffered non-transpose tiling for large square matrices whose
/// row count divides by the tile. Column blocks are split across
/// `grid.y`, so separate groups contribute to the same y element and the
/// final accumulation is atomic.
#[allow(clippy::too_many_arguments)]
fn launch_gemvn_double_buffered<T: Element>(
    queue: &Queue,
    group: (u32, u32),
    work: u32,
    grid_y: u32,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
) -> DeviceResult<()>
where
    T::Acc: AtomicAcc,
{
    let (dim_x, dim_y) = (group.0 as usize, group.1 as usize);
    let epl = work as usize;
    let half = dim_x / 2;
    let groups_x = (m / dim_x as i64) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(groups_x, grid_y, batch_count as u32),
        Dim3::xy(group.0, group.1),
    )
    .with_shared(dim_x * 2 * dim_y * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return; // y already carries beta*y from the scaling kernel
        }
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch).cast::<T::Acc>();

        let bx = g.group.x as i64;
        let by = g.group.y as i64;
        let gy = g.grid.y as i64;
        let col_blocks = n / dim_x as i64;
        let count = col_blocks / gy + i64::from(by < col_blocks % gy);
        if count == 0 {
            return;
        }
        let start = by * (col_blocks / gy) + by.min(col_blocks % gy);

        // advanced bases for this group
        let a0 = offa + dim_x as i64 * bx + start * dim_x as i64 * lda;
        let x0 = shiftx + start * dim_x as i64 * xinc;
        let y0 = shifty + bx * dim_x as i64 * yinc;

        let mut la = vec![T::Acc::zero(); dim_x * 2 * dim_y];
        for td in 0..dim_x * dim_y {
            let tx_ = (td % half) as i64;
            let ty_ = (td / half) as i64;
            let j = ty_ * epl as i64 * lda + tx_;

            let mut res_1 = T::Acc::zero();
            let mut res_2 = T::Acc::zero();
            let mut upper = vec![T::Acc::zero(); epl];
            let mut lower = vec![T::Acc::zero(); epl];
            let mut abase = a0;
            let mut xbase = x0;

            for (k, u) in upper.iter_mut().enumerate() {
                *u = asl.get((abase + j + k as i64 * lda) as usize).to_acc();
            }
            for vb in 0..count {
                for (k, l) in lower.iter_mut().enumerate() {
                    *l = asl
                        .get((abase + half as i64 + j + k as i64 * lda) as usize)
                        .to_acc();
                }
                for (k, u) in upper.iter().enumerate() {
                    res_1 += *u
                        * xs.get((xbase + (ty_ * epl as i64 + k as i64) * xinc) as usize)
                            .to_acc();
                }
                abase += dim_x as i64 * lda;
                if vb != count - 1 {
                    for (k, u) in upper.iter_mut().enumerate() {
                        *u = asl.get((abase + j + k as i64 * lda) as usize).to_acc();
                    }
                }
                for (k, l) in lower.iter().enumerate() {
                    res_2 += *l
                        * xs.get((xbase + (ty_ * epl as i64 + k as i64) * xinc) as usize)
                            .to_acc();
                }
                xbase += dim_x as i64 * xinc;
            }

            la[(ty_ as usize) * dim_x + tx_ as usize] = res_1;
            la[(ty_ as usize) * dim_x + tx_ as usize + half] = res_2;
        }

        for tx in 0..dim_x {
            let mut sum = T::Acc::zero();
            for k in 0..2 * dim_y {
                sum += la[k * dim_x + tx];
            }
            let idx = (y0 + tx as i64 * yinc) as usize;
            T::Acc::atomic_add(&ys, idx, al * sum);
        }
    })
}

/// Transpose: one group per output column, block-wide dot of the column
/// against x.
#[allow(clippy::too_many_arguments)]
fn launch_gemvt_column<T: Element>(
    queue: &Queue,
    group_size: u32,
    wavefront: usize,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(n as u32, 1, batch_count as u32),
        Dim3::x(group_size),
    )
    .with_shared(nb * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let col = g.group.x as i64;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let ys = y.resolve(batch);
        let yidx = (shifty + col * yinc) as usize;

        if al.is_zero() {
            let v = if be.is_zero() {
                T::Acc::zero()
            } else {
                be * ys.get(yidx).to_acc()
            };
            ys.set(yidx, T::from_acc(v));
            return;
        }

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let m_full = (m / nb as i64) * nb as i64;

        let mut partial = vec![T::Acc::zero(); nb];
        for (tx, lane) in partial.iter_mut().enumerate() {
            let tx = tx as i64;
            let mut res = T::Acc::zero();
            let mut i = 0;
            while tx + i < m_full {
                res += conj_if(
                    asl.get((offa + tx + i + col * lda) as usize).to_acc(),
                    conj,
                ) * xs.get((shiftx + (tx + i) * xinc) as usize).to_acc();
                i += nb as i64;
            }
            if tx + m_full < m {
                res += conj_if(
                    asl.get((offa + tx + m_full + col * lda) as usize).to_acc(),
                    conj,
                ) * xs.get((shiftx + (tx + m_full) * xinc) as usize).to_acc();
            }
            *lane = res;
        }
        let sum = group_reduce_sum(&mut partial, wavefront);
        let v = if be.is_zero() {
            al * sum
        } else {
            al * sum + be * ys.get(yidx).to_acc()
        };
        ys.set(yidx, T::from_acc(v));
    })
}

/// Transpose with m ≤ the shared-x bound: the whole of alpha*x is staged
/// in group scratch once and every lane forms full dot products against
/// it, no inter-lane reduction.
#[allow(clippy::too_many_arguments)]
fn launch_gemvt_shared_x<T: Element>(
    queue: &Queue,
    group_size: u32,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(Dim3::new(1, 1, batch_count as u32), Dim3::x(group_size))
        .with_shared(m as usize * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let ys = y.resolve(batch);

        if al.is_zero() {
            for t in 0..nb {
                let mut col = t as i64;
                while col < n {
                    let idx = (shifty + col * yinc) as usize;
                    if be.is_zero() {
                        ys.set(idx, T::from_acc(T::Acc::zero()));
                    } else {
                        ys.set(idx, T::from_acc(be * ys.get(idx).to_acc()));
                    }
                    col += nb as i64;
                }
            }
            return;
        }

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);

        let mut shared_x = vec![T::Acc::zero(); m as usize];
        for (l, sx) in shared_x.iter_mut().enumerate() {
            *sx = al * xs.get((shiftx + l as i64 * xinc) as usize).to_acc();
        }

        for t in 0..nb {
            let mut col = t as i64;
            while col < n {
                let idx = (shifty + col * yinc) as usize;
                let mut res = if be.is_zero() {
                    T::Acc::zero()
                } else {
                    be * ys.get(idx).to_acc()
                };
                for (l, sx) in shared_x.iter().enumerate() {
                    res += *sx
                        * conj_if(
                            asl.get((offa + l as i64 + col * lda) as usize).to_acc(),
                            conj,
                        );
                }
                ys.set(idx, T::from_acc(res));
                col += nb as i64;
            }
        }
    })
}

/// Skinny-n transpose, phase 1: groups split the rows, each group
/// reduces a four-column tile at a time and writes alpha-scaled partials
/// to the scratch buffer. When alpha is zero the partials are zeroed
/// without touching A or x.
#[allow(clippy::too_many_arguments)]
fn launch_gemvt_skinny<T: Element>(
    queue: &Queue,
    group_size: u32,
    work: u32,
    groups: u32,
    wavefront: usize,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    batch_count: i32,
    conj: bool,
    workspace: DevSlice<T::Acc>,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let win = work as usize;
    let (lda, offa) = (a.lda, a.offset);
    let xinc = x.inc;
    const NC: i64 = 4;

    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::x(group_size),
    )
    .with_shared(nb * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let bx = g.group.x as usize;
        let gx = g.grid.x as usize;
        let ws_base = gx * n as usize * batch;
        let al = alpha.get(batch);

        if al.is_zero() {
            for i in 0..n as usize {
                workspace.set(ws_base + bx + i * gx, T::Acc::zero());
            }
            return;
        }

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let n_tail = n % NC;
        let m_tail = m % win as i64;

        // full four-column tiles: each lane loads its row window of x
        // once and feeds all four column sums
        let mut col = 0i64;
        while col < n - n_tail {
            let mut tile = vec![[T::Acc::zero(); NC as usize]; nb];
            for (tx, lane) in tile.iter_mut().enumerate() {
                let row = (tx * win + bx * nb * win) as i64;
                let span = if row + win as i64 <= m {
                    win as i64
                } else if row + m_tail <= m {
                    m_tail
                } else {
                    0
                };
                for j in 0..span {
                    let xv = xs.get((shiftx + (row + j) * xinc) as usize).to_acc();
                    for k in 0..NC {
                        lane[k as usize] += conj_if(
                            asl.get((offa + row + j + (col + k) * lda) as usize).to_acc(),
                            conj,
                        ) * xv;
                    }
                }
            }
            for k in 0..NC as usize {
                let mut lanes: Vec<T::Acc> = tile.iter().map(|l| l[k]).collect();
                let sum = group_reduce_sum(&mut lanes, wavefront);
                workspace.set(ws_base + bx + (col as usize + k) * gx, al * sum);
            }
            col += NC;
        }
        while col < n {
            let mut lanes = vec![T::Acc::zero(); nb];
            for (tx, lane) in lanes.iter_mut().enumerate() {
                let row = (tx * win + bx * nb * win) as i64;
                let span = if row + win as i64 <= m {
                    win as i64
                } else if row + m_tail <= m {
                    m_tail
                } else {
                    0
                };
                for j in 0..span {
                    let xv = xs.get((shiftx + (row + j) * xinc) as usize).to_acc();
                    *lane += conj_if(
                        asl.get((offa + row + j + col * lda) as usize).to_acc(),
                        conj,
                    ) * xv;
                }
            }
            let sum = group_reduce_sum(&mut lanes, wavefront);
            workspace.set(ws_base + bx + col as usize * gx, al * sum);
            col += 1;
        }
    })
}

/// Skinny-n transpose, phase 2: per (column, batch) group sums the
/// phase-1 partials and applies beta.
#[allow(clippy::too_many_arguments)]
fn launch_gemvt_skinny_reduce<T: Element>(
    queue: &Queue,
    group_size: u32,
    work: u32,
    groups: u32,
    wavefront: usize,
    n: i64,
    beta: ScalarArg<T::Acc>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    workspace: DevSlice<T::Acc>,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let win = work as usize;
    let yinc = y.inc;
    let n_sums = groups as usize;

    let cfg = LaunchConfig::new(
        Dim3::new(1, n as u32, batch_count as u32),
        Dim3::x(group_size),
    )
    .with_shared(nb * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let col = g.group.y as usize;
        let base = n_sums * (g.grid.y as usize * batch + col);

        let remainder = n_sums % win;
        let end = n_sums - remainder;
        let mut partial = vec![T::Acc::zero(); nb];
        for (tid, lane) in partial.iter_mut().enumerate() {
            let mut sum = T::Acc::zero();
            let mut i = tid * win;
            while i < end {
                for j in 0..win {
                    sum += workspace.get(base + i + j);
                }
                i += nb * win;
            }
            if tid < remainder {
                sum += workspace.get(base + n_sums - 1 - tid);
            }
            *lane = sum;
        }
        let sum = group_reduce_sum(&mut partial, wavefront);

        let ys = y.resolve(batch);
        let be = beta.get(batch);
        let idx = (shifty + col as i64 * yinc) as usize;
        let v = if be.is_zero() {
            sum
        } else {
            be * ys.get(idx).to_acc() + sum
        };
        ys.set(idx, T::from_acc(v));
    })
}

/// Double-buffered transpose tiling; row blocks split across `grid.y`,
/// atomic accumulation into y.
#[allow(clippy::too_many_arguments)]
fn launch_gemvt_double_buffered<T: Element>(
    queue: &Queue,
    group: (u32, u32),
    work: u32,
    grid_y: u32,
    m: i64,
    n: i64,
    alpha: ScalarArg<T::Acc>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()>
where
    T::Acc: AtomicAcc,
{
    let (dim_x, dim_y) = (group.0 as usize, group.1 as usize);
    let epl = work as usize;
    let half = dim_x / 2;
    let groups_x = (n / dim_x as i64) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(groups_x, grid_y, batch_count as u32),
        Dim3::xy(group.0, group.1),
    )
    .with_shared(dim_x * half * std::mem::size_of::<T::Acc>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return; // beta handled by the scaling kernel
        }
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch).cast::<T::Acc>();

        let bx = g.group.x as i64;
        let by = g.group.y as i64;
        let gy = g.grid.y as i64;
        let row_blocks = m / dim_x as i64;
        let count = row_blocks / gy + i64::from(by < row_blocks % gy);
        if count == 0 {
            return;
        }
        let start = by * (row_blocks / gy) + by.min(row_blocks % gy);

        let a0 = offa + dim_x as i64 * bx * lda + start * dim_x as i64;
        let x0 = shiftx + start * dim_x as i64 * xinc;
        let y0 = shifty + bx * dim_x as i64 * yinc;

        let mut la = vec![T::Acc::zero(); dim_x * half];
        for td in 0..dim_x * dim_y {
            let tx_ = (td % half) as i64;
            let ty_ = (td / half) as i64;
            let j = ty_ * epl as i64 * lda + tx_;

            let mut treg = vec![T::Acc::zero(); epl];
            let mut upper = vec![T::Acc::zero(); epl];
            let mut lower = vec![T::Acc::zero(); epl];
            let mut abase = a0;
            let mut xbase = x0;

            for (k, u) in upper.iter_mut().enumerate() {
                *u = asl.get((abase + j + k as i64 * lda) as usize).to_acc();
            }
            for vb in 0..count {
                for (k, l) in lower.iter_mut().enumerate() {
                    *l = asl
                        .get((abase + half as i64 + j + k as i64 * lda) as usize)
                        .to_acc();
                }
                let xu = xs.get((xbase + tx_ * xinc) as usize).to_acc();
                for (k, u) in upper.iter().enumerate() {
                    treg[k] += conj_if(*u, conj) * xu;
                }
                abase += dim_x as i64;
                if vb != count - 1 {
                    for (k, u) in upper.iter_mut().enumerate() {
                        *u = asl.get((abase + j + k as i64 * lda) as usize).to_acc();
                    }
                }
                let xl = xs.get((xbase + (tx_ + half as i64) * xinc) as usize).to_acc();
                for (k, l) in lower.iter().enumerate() {
                    treg[k] += conj_if(*l, conj) * xl;
                }
                xbase += dim_x as i64 * xinc;
            }

            for (k, t) in treg.iter().enumerate() {
                la[(ty_ as usize * epl + k) * half + tx_ as usize] = *t;
            }
        }

        // skewed row sums: lane tx starts at its own offset to spread
        // scratch reads
        for tx in 0..dim_x {
            let mut sum = T::Acc::zero();
            for k in tx..tx + half {
                sum += la[tx * half + (k % half)];
            }
            let idx = (y0 + tx as i64 * yinc) as usize;
            T::Acc::atomic_add(&ys, idx, sum * al);
        }
    })
}
