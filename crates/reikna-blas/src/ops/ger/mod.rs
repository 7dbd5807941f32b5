//! Rank-1 update engine: `A := alpha*x*y^T + A` (and the conjugated
//! `alpha*x*y^H` form), in place on A.
//!
//! The generic tiling stages x and y fragments in group scratch once per
//! tile so each loaded element feeds a whole tile row/column of updates.
//! Large single-precision problems take a column-per-group kernel (one
//! y element broadcast per group), with a paired-element variant on the
//! wide-wave architecture; large square problems whose size divides the
//! tile take the double-buffered kernel, which writes disjoint tiles and
//! needs no atomics.

use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::dispatch::{self, GerKernel, GerPlan};
use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg, VecArg};
use crate::types::Scalar;

pub fn ger<T: Scalar>(
    handle: &Handle,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    ger_launcher(handle, m, n, alpha, x, y, a, batch_count, false)
}

/// Conjugated variant; identical to [`ger`] for real element types.
pub fn gerc<T: Scalar>(
    handle: &Handle,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    ger_launcher(handle, m, n, alpha, x, y, a, batch_count, true)
}

#[inline]
fn conj_if<T: Scalar>(v: T, conj: bool) -> T {
    if conj {
        v.conj()
    } else {
        v
    }
}

#[allow(clippy::too_many_arguments)]
fn ger_launcher<T: Scalar>(
    handle: &Handle,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
    conj: bool,
) -> Result<()> {
    if m == 0 || n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if let Some(av) = alpha.host_value() {
        if av.is_zero() {
            return Ok(());
        }
    }

    let shiftx = x.shift(m);
    let shifty = y.shift(n);
    let plan = dispatch::select_ger(T::PRECISION, m, n, handle.arch(), handle.tunables());

    match plan.kernel {
        GerKernel::Tiled => launch_ger_tiled(
            handle.queue(), &plan, m, n, alpha, x, shiftx, y, shifty, a, batch_count, conj,
        )?,
        GerKernel::GroupPerColumn => launch_ger_column(
            handle.queue(), plan.group.0, m, n, alpha, x, shiftx, y, shifty, a, batch_count, conj,
        )?,
        GerKernel::PairedColumn => launch_ger_paired(
            handle.queue(), plan.group.0, m, n, alpha, x, shiftx, y, shifty, a, batch_count, conj,
        )?,
        GerKernel::DoubleBuffered => launch_ger_double_buffered(
            handle.queue(), &plan, m, n, alpha, x, shiftx, y, shifty, a, batch_count, conj,
        )?,
    }
    Ok(())
}

/// Generic tiling: x and y fragments staged in group scratch, each lane
/// updating `work` columns of one row.
#[allow(clippy::too_many_arguments)]
fn launch_ger_tiled<T: Scalar>(
    queue: &Queue,
    plan: &GerPlan,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    a: MatArg<T>,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let (dim_x, dim_y) = (plan.group.0 as usize, plan.group.1 as usize);
    let win = plan.work as usize;
    let blocks_x = ((m - 1) / dim_x as i64 + 1) as u32;
    let blocks_y = ((n - 1) / (dim_y * win) as i64 + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    // both tile coordinates packed into grid.x
    let cfg = LaunchConfig::new(
        Dim3::new(blocks_x * blocks_y, 1, batch_count as u32),
        Dim3::xy(plan.group.0, plan.group.1),
    )
    .with_shared((dim_x + dim_y * win) * std::mem::size_of::<T>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }

        let blkx = (g.group.x % blocks_x) as i64;
        let blky = (g.group.x / blocks_x) as i64;
        let row0 = blkx * dim_x as i64;
        let col0 = blky * (dim_y * win) as i64;

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);

        // stage the x and y fragments this tile touches
        let mut xdata = vec![T::zero(); dim_x];
        for (t, xd) in xdata.iter_mut().enumerate() {
            let r = row0 + t as i64;
            if r < m {
                *xd = xs.get((shiftx + r * xinc) as usize);
            }
        }
        let mut ydata = vec![T::zero(); dim_y * win];
        for (t, yd) in ydata.iter_mut().enumerate() {
            let c = col0 + t as i64;
            if c < n {
                *yd = ys.get((shifty + c * yinc) as usize);
            }
        }

        for ty in 0..dim_y {
            for tx in 0..dim_x {
                let row = row0 + tx as i64;
                if row >= m {
                    continue;
                }
                let xv = al * xdata[tx];
                for i in 0..win {
                    let col = col0 + (ty * win + i) as i64;
                    if col < n {
                        let idx = (offa + row + col * lda) as usize;
                        asl.set(idx, asl.get(idx) + xv * conj_if(ydata[ty * win + i], conj));
                    }
                }
            }
        }
    })
}

/// One group per column: a single broadcast y element, lanes strided
/// down the rows.
#[allow(clippy::too_many_arguments)]
fn launch_ger_column<T: Scalar>(
    queue: &Queue,
    group_size: u32,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    a: MatArg<T>,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(n as u32, 1, batch_count as u32),
        Dim3::x(group_size),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let col = g.group.x as i64;
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);
        let res_y = conj_if(ys.get((shifty + col * yinc) as usize), conj) * al;
        for tx in 0..nb {
            let mut i = tx as i64;
            while i < m {
                let idx = (offa + i + col * lda) as usize;
                asl.set(idx, asl.get(idx) + res_y * xs.get((shiftx + i * xinc) as usize));
                i += nb as i64;
            }
        }
    })
}

/// Wide-wave architecture fast path: two consecutive rows per lane, one
/// column per grid.y slot.
#[allow(clippy::too_many_arguments)]
fn launch_ger_paired<T: Scalar>(
    queue: &Queue,
    group_size: u32,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    a: MatArg<T>,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let nb = group_size as usize;
    let blocks_x = ((m - 1) / (nb as i64 * 2) + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(blocks_x, n as u32, batch_count as u32),
        Dim3::x(group_size),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let col = g.group.y as i64;
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);
        let reg_y = conj_if(ys.get((shifty + col * yinc) as usize), conj) * al;

        for t in 0..nb {
            let tx = (g.group.x as i64 * nb as i64 + t as i64) * 2;
            let x1 = if tx < m {
                xs.get((shiftx + tx * xinc) as usize)
            } else {
                T::zero()
            };
            let x2 = if tx + 1 < m {
                xs.get((shiftx + (tx + 1) * xinc) as usize)
            } else {
                T::zero()
            };
            // odd m: the final lone row
            if m % 2 != 0 && tx + 1 == m {
                let idx = (offa + tx + col * lda) as usize;
                asl.set(idx, asl.get(idx) + reg_y * x1);
            }
            if tx + 1 < m {
                let i1 = (offa + tx + col * lda) as usize;
                let i2 = (offa + tx + 1 + col * lda) as usize;
                asl.set(i1, asl.get(i1) + reg_y * x1);
                asl.set(i2, asl.get(i2) + reg_y * x2);
            }
        }
    })
}

/// Double-buffered square tiling: each group owns one DIM×DIM tile of A
/// outright, staging upper and lower half-tiles alternately.
#[allow(clippy::too_many_arguments)]
fn launch_ger_double_buffered<T: Scalar>(
    queue: &Queue,
    plan: &GerPlan,
    m: i64,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    y: VecArg<T>,
    shifty: i64,
    a: MatArg<T>,
    batch_count: i32,
    conj: bool,
) -> DeviceResult<()> {
    let (dim_x, dim_y) = (plan.group.0 as usize, plan.group.1 as usize);
    let epl = plan.work as usize;
    let half = dim_x / 2;
    let blocks_x = (m / dim_x as i64) as u32;
    let blocks_y = (n / dim_x as i64) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(blocks_x, blocks_y, batch_count as u32),
        Dim3::xy(plan.group.0, plan.group.1),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);

        let bx = g.group.x as i64;
        let by = g.group.y as i64;
        let a0 = offa + dim_x as i64 * bx + by * dim_x as i64 * lda;
        let x0 = shiftx + bx * dim_x as i64 * xinc;
        let y0 = shifty + by * dim_x as i64 * yinc;

        for td in 0..dim_x * dim_y {
            let tx_ = (td % half) as i64;
            let ty_ = (td / half) as i64;
            let j = ty_ * epl as i64 * lda + tx_;

            let x_upper = xs.get((x0 + tx_ * xinc) as usize) * al;
            let x_lower = xs.get((x0 + (half as i64 + tx_) * xinc) as usize) * al;

            let mut upper = vec![T::zero(); epl];
            let mut lower = vec![T::zero(); epl];
            let mut y_reg = vec![T::zero(); epl];
            for (k, u) in upper.iter_mut().enumerate() {
                *u = asl.get((a0 + j + k as i64 * lda) as usize);
            }
            for k in 0..epl {
                lower[k] = asl.get((a0 + half as i64 + j + k as i64 * lda) as usize);
                y_reg[k] = ys.get((y0 + (ty_ * epl as i64 + k as i64) * yinc) as usize);
            }
            for (k, u) in upper.iter_mut().enumerate() {
                *u += x_upper * conj_if(y_reg[k], conj);
            }
            for (k, u) in upper.iter().enumerate() {
                asl.set((a0 + j + k as i64 * lda) as usize, *u);
            }
            for (k, l) in lower.iter_mut().enumerate() {
                *l += x_lower * conj_if(y_reg[k], conj);
            }
            for (k, l) in lower.iter().enumerate() {
                asl.set((a0 + half as i64 + j + k as i64 * lda) as usize, *l);
            }
        }
    })
}

#[cfg(test)]
mod tests;
