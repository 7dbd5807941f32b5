//! Packed-triangle storage: matrix-vector products and rank updates on
//! matrices stored as one triangle laid out column by column.
//!
//! The element at logical (row, col) of the stored triangle lives at
//! `col*(col+1)/2 + row` in the upper layout and at
//! `col*(2n-col+1)/2 + (row-col)` in the lower layout — the prefix sums
//! of the preceding column lengths.

use num_traits::Zero;
use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{ScalarArg, VecArg};
use crate::types::{Scalar, Uplo};

/// Storage index of (row, col); callers keep row on the stored side of
/// the diagonal.
#[inline]
pub(crate) fn packed_index(upper: bool, n: i64, row: i64, col: i64) -> i64 {
    if upper {
        col * (col + 1) / 2 + row
    } else {
        col * (2 * n - col + 1) / 2 + (row - col)
    }
}

/// `y := alpha*A*x + beta*y`, A symmetric in packed storage.
pub fn spmv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    ap: VecArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_mv_launcher(handle, uplo, n, alpha, ap, x, beta, y, batch_count, false)
}

/// Hermitian packed variant; the stored diagonal's imaginary part is
/// ignored.
pub fn hpmv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    ap: VecArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_mv_launcher(handle, uplo, n, alpha, ap, x, beta, y, batch_count, true)
}

#[allow(clippy::too_many_arguments)]
fn packed_mv_launcher<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    ap: VecArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
    hermitian: bool,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if let (Some(av), Some(bv)) = (alpha.host_value(), beta.host_value()) {
        if av.is_zero() && bv.is_one() {
            return Ok(());
        }
    }
    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    launch_packed_mv(
        handle.queue(),
        uplo.is_upper(),
        n,
        alpha,
        ap,
        x,
        shiftx,
        beta,
        y,
        shifty,
        batch_count,
        hermitian,
    )?;
    Ok(())
}

const DIM_X: usize = 64;
const DIM_Y: usize = 16;

#[allow(clippy::too_many_arguments)]
fn launch_packed_mv<T: Scalar>(
    queue: &Queue,
    upper: bool,
    n: i64,
    alpha: ScalarArg<T>,
    ap: VecArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    hermitian: bool,
) -> DeviceResult<()> {
    let groups = ((n - 1) / DIM_X as i64 + 1) as u32;
    let offa = ap.offset;
    let (xinc, yinc) = (x.inc, y.inc);

    let cfg = LaunchConfig::new(
        Dim3::new(groups, 1, batch_count as u32),
        Dim3::xy(DIM_X as u32, DIM_Y as u32),
    )
    .with_shared(DIM_X * DIM_Y * std::mem::size_of::<T>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let ys = y.resolve(batch);
        let group_base = g.group.x as i64 * DIM_X as i64;

        if al.is_zero() {
            for tid in 0..DIM_X {
                let ind = group_base + tid as i64;
                if ind < n {
                    let idx = (shifty + ind * yinc) as usize;
                    if be.is_zero() {
                        ys.set(idx, T::zero());
                    } else {
                        ys.set(idx, be * ys.get(idx));
                    }
                }
            }
            return;
        }

        let asl = ap.resolve(batch);
        let xs = x.resolve(batch);
        let mut sdata = vec![T::zero(); DIM_X * DIM_Y];

        for ty in 0..DIM_Y {
            for tx in 0..DIM_X {
                let ind = group_base + tx as i64;
                let mut res = T::zero();
                if ind < n {
                    let mut col = ty as i64;
                    while col < n {
                        let mirrored = (ind > col && upper) || (ind < col && !upper);
                        let (r, c) = if mirrored { (col, ind) } else { (ind, col) };
                        let stored = asl.get((offa + packed_index(upper, n, r, c)) as usize);
                        let av = if hermitian && r == c {
                            T::from_real(stored.re())
                        } else if hermitian && mirrored {
                            stored.conj()
                        } else {
                            stored
                        };
                        res += av * xs.get((shiftx + col * xinc) as usize);
                        col += DIM_Y as i64;
                    }
                }
                sdata[tx + ty * DIM_X] = res;
            }
        }

        for tid in 0..DIM_X {
            let ind = group_base + tid as i64;
            if ind < n {
                let mut sum = sdata[tid];
                for i in 1..DIM_Y {
                    sum += sdata[tid + DIM_X * i];
                }
                let idx = (shifty + ind * yinc) as usize;
                let v = if be.is_zero() {
                    al * sum
                } else {
                    al * sum + be * ys.get(idx)
                };
                ys.set(idx, v);
            }
        }
    })
}

const UPD_DIM: usize = 32;

/// Shared tiling for the packed in-place updates: one lane per element
/// of the tile; `visit` writes the stored-triangle elements it owns.
fn launch_packed_update<F>(
    queue: &Queue,
    n: i64,
    batch_count: i32,
    visit: F,
) -> DeviceResult<()>
where
    F: Fn(usize, i64, i64) + Send + Sync,
{
    let groups = ((n - 1) / UPD_DIM as i64 + 1) as u32;
    let cfg = LaunchConfig::new(
        Dim3::new(groups, groups, batch_count as u32),
        Dim3::xy(UPD_DIM as u32, UPD_DIM as u32),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        for ty in 0..UPD_DIM {
            for tx in 0..UPD_DIM {
                let row = g.group.x as i64 * UPD_DIM as i64 + tx as i64;
                let col = g.group.y as i64 * UPD_DIM as i64 + ty as i64;
                if row < n && col < n {
                    visit(batch, row, col);
                }
            }
        }
    })
}

macro_rules! packed_update_quick_returns {
    ($n:expr, $batch_count:expr, $alpha:expr) => {
        if $n == 0 || $batch_count <= 0 {
            return Ok(());
        }
        if let Some(av) = $alpha.host_value() {
            if av.is_zero() {
                return Ok(());
            }
        }
    };
}

/// `A := alpha*x*x^T + A`, A symmetric packed.
pub fn spr<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    ap: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_update_quick_returns!(n, batch_count, alpha);
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let (xinc, offa) = (x.inc, ap.offset);
    launch_packed_update(handle.queue(), n, batch_count, move |batch, row, col| {
        let stored = if upper { row <= col } else { row >= col };
        if !stored {
            return;
        }
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let asl = ap.resolve(batch);
        let xs = x.resolve(batch);
        let xr = xs.get((shiftx + row * xinc) as usize);
        let xc = xs.get((shiftx + col * xinc) as usize);
        let idx = (offa + packed_index(upper, n, row, col)) as usize;
        asl.set(idx, asl.get(idx) + al * xr * xc);
    })?;
    Ok(())
}

/// `A := alpha*x*x^H + A`, A Hermitian packed, alpha real. The updated
/// diagonal keeps a zero imaginary part.
pub fn hpr<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T::Real>,
    x: VecArg<T>,
    ap: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_update_quick_returns!(n, batch_count, alpha);
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let (xinc, offa) = (x.inc, ap.offset);
    launch_packed_update(handle.queue(), n, batch_count, move |batch, row, col| {
        let stored = if upper { row <= col } else { row >= col };
        if !stored {
            return;
        }
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let asl = ap.resolve(batch);
        let xs = x.resolve(batch);
        let xr = xs.get((shiftx + row * xinc) as usize);
        let xc = xs.get((shiftx + col * xinc) as usize);
        let idx = (offa + packed_index(upper, n, row, col)) as usize;
        let next = asl.get(idx) + (xr * xc.conj()).scale(al);
        let next = if row == col { T::from_real(next.re()) } else { next };
        asl.set(idx, next);
    })?;
    Ok(())
}

/// `A := alpha*x*y^T + alpha*y*x^T + A`, A symmetric packed.
pub fn spr2<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    ap: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_update_quick_returns!(n, batch_count, alpha);
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    let (xinc, yinc, offa) = (x.inc, y.inc, ap.offset);
    launch_packed_update(handle.queue(), n, batch_count, move |batch, row, col| {
        let stored = if upper { row <= col } else { row >= col };
        if !stored {
            return;
        }
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let asl = ap.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);
        let xr = xs.get((shiftx + row * xinc) as usize);
        let xc = xs.get((shiftx + col * xinc) as usize);
        let yr = ys.get((shifty + row * yinc) as usize);
        let yc = ys.get((shifty + col * yinc) as usize);
        let idx = (offa + packed_index(upper, n, row, col)) as usize;
        asl.set(idx, asl.get(idx) + al * xr * yc + al * yr * xc);
    })?;
    Ok(())
}

/// `A := alpha*x*y^H + conj(alpha)*y*x^H + A`, A Hermitian packed.
pub fn hpr2<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    ap: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    packed_update_quick_returns!(n, batch_count, alpha);
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    let (xinc, yinc, offa) = (x.inc, y.inc, ap.offset);
    launch_packed_update(handle.queue(), n, batch_count, move |batch, row, col| {
        let stored = if upper { row <= col } else { row >= col };
        if !stored {
            return;
        }
        let al = alpha.get(batch);
        if al.is_zero() {
            return;
        }
        let asl = ap.resolve(batch);
        let xs = x.resolve(batch);
        let ys = y.resolve(batch);
        let xr = xs.get((shiftx + row * xinc) as usize);
        let xc = xs.get((shiftx + col * xinc) as usize);
        let yr = ys.get((shifty + row * yinc) as usize);
        let yc = ys.get((shifty + col * yinc) as usize);
        let idx = (offa + packed_index(upper, n, row, col)) as usize;
        let next = asl.get(idx) + al * xr * yc.conj() + al.conj() * yr * xc.conj();
        let next = if row == col { T::from_real(next.re()) } else { next };
        asl.set(idx, next);
    })?;
    Ok(())
}
