//! Symmetric and Hermitian rank-1/rank-2 updates on full triangular
//! storage, in place on one triangle of A.
//!
//! Tiling follows the rank-update pattern: a grid of lane tiles over the
//! (row, column) plane, each lane updating one or two rows of its
//! column, with writes confined to the stored triangle. Hermitian
//! variants take a real alpha (rank-1) and force the updated diagonal's
//! imaginary part to zero.

use num_traits::Zero;
use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg, VecArg};
use crate::tuning::SyrTunables;
use crate::types::{Precision, Scalar, Uplo};

/// `A := alpha*x*x^T + A`, A symmetric.
pub fn syr<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if alpha.host_value().is_some_and(|v| v.is_zero()) {
        return Ok(());
    }
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let (xinc, lda, offa) = (x.inc, a.lda, a.offset);
    launch_triangular_update(
        handle.queue(),
        handle.tunables().syr.clone(),
        T::PRECISION,
        n,
        batch_count,
        move |batch, row, col| {
            let stored = if upper { row <= col } else { row >= col };
            if !stored {
                return;
            }
            let al = alpha.get(batch);
            if al.is_zero() {
                return;
            }
            let asl = a.resolve(batch);
            let xs = x.resolve(batch);
            let xr = xs.get((shiftx + row * xinc) as usize);
            let xc = xs.get((shiftx + col * xinc) as usize);
            let idx = (offa + row + col * lda) as usize;
            asl.set(idx, asl.get(idx) + al * xr * xc);
        },
    )?;
    Ok(())
}

/// `A := alpha*x*x^H + A`, A Hermitian, alpha real.
pub fn her<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T::Real>,
    x: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if alpha.host_value().is_some_and(|v| v.is_zero()) {
        return Ok(());
    }
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let (xinc, lda, offa) = (x.inc, a.lda, a.offset);
    launch_triangular_update(
        handle.queue(),
        handle.tunables().syr.clone(),
        T::PRECISION,
        n,
        batch_count,
        move |batch, row, col| {
            let stored = if upper { row <= col } else { row >= col };
            if !stored {
                return;
            }
            let al = alpha.get(batch);
            if al.is_zero() {
                return;
            }
            let asl = a.resolve(batch);
            let xs = x.resolve(batch);
            let xr = xs.get((shiftx + row * xinc) as usize);
            let xc = xs.get((shiftx + col * xinc) as usize);
            let idx = (offa + row + col * lda) as usize;
            let next = asl.get(idx) + (xr * xc.conj()).scale(al);
            let next = if row == col { T::from_real(next.re()) } else { next };
            asl.set(idx, next);
        },
    )?;
    Ok(())
}

/// `A := alpha*x*y^T + alpha*y*x^T + A`, A symmetric.
#[allow(clippy::too_many_arguments)]
pub fn syr2<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if alpha.host_value().is_some_and(|v| v.is_zero()) {
        return Ok(());
    }
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    let (xinc, yinc, lda, offa) = (x.inc, y.inc, a.lda, a.offset);
    launch_triangular_update(
        handle.queue(),
        handle.tunables().syr.clone(),
        T::PRECISION,
        n,
        batch_count,
        move |batch, row, col| {
            let stored = if upper { row <= col } else { row >= col };
            if !stored {
                return;
            }
            let al = alpha.get(batch);
            if al.is_zero() {
                return;
            }
            let asl = a.resolve(batch);
            let xs = x.resolve(batch);
            let ys = y.resolve(batch);
            let xr = xs.get((shiftx + row * xinc) as usize);
            let xc = xs.get((shiftx + col * xinc) as usize);
            let yr = ys.get((shifty + row * yinc) as usize);
            let yc = ys.get((shifty + col * yinc) as usize);
            let idx = (offa + row + col * lda) as usize;
            asl.set(idx, asl.get(idx) + al * xr * yc + al * yr * xc);
        },
    )?;
    Ok(())
}

/// `A := alpha*x*y^H + conj(alpha)*y*x^H + A`, A Hermitian.
#[allow(clippy::too_many_arguments)]
pub fn her2<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    x: VecArg<T>,
    y: VecArg<T>,
    a: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if alpha.host_value().is_some_and(|v| v.is_zero()) {
        return Ok(());
    }
    let upper = uplo.is_upper();
    let shiftx = x.shift(n);
    let shifty = y.shift(n);
    let (xinc, yinc, lda, offa) = (x.inc, y.inc, a.lda, a.offset);
    launch_triangular_update(
        handle.queue(),
        handle.tunables().syr.clone(),
        T::PRECISION,
        n,
        batch_count,
        move |batch, row, col| {
            let stored = if upper { row <= col } else { row >= col };
            if !stored {
                return;
            }
            let al = alpha.get(batch);
            if al.is_zero() {
                return;
            }
            let asl = a.resolve(batch);
            let xs = x.resolve(batch);
            let ys = y.resolve(batch);
            let xr = xs.get((shiftx + row * xinc) as usize);
            let xc = xs.get((shiftx + col * xinc) as usize);
            let yr = ys.get((shifty + row * yinc) as usize);
            let yc = ys.get((shifty + col * yinc) as usize);
            let idx = (offa + row + col * lda) as usize;
            let next = asl.get(idx) + al * xr * yc.conj() + al.conj() * yr * xc.conj();
            let next = if row == col { T::from_real(next.re()) } else { next };
            asl.set(idx, next);
        },
    )?;
    Ok(())
}

/// Shared tile sweep: lanes cover (tile.0 * row_work) rows by tile.1
/// columns per group; single precision doubles the rows per lane.
fn launch_triangular_update<F>(
    queue: &Queue,
    tun: SyrTunables,
    precision: Precision,
    n: i64,
    batch_count: i32,
    visit: F,
) -> DeviceResult<()>
where
    F: Fn(usize, i64, i64) + Send + Sync,
{
    let (dim_x, dim_y) = (tun.tile.0 as usize, tun.tile.1 as usize);
    let row_work = if precision == Precision::F32 {
        tun.f32_work as usize
    } else {
        1
    };
    let blocks_x = ((n - 1) / (dim_x * row_work) as i64 + 1) as u32;
    let blocks_y = ((n - 1) / dim_y as i64 + 1) as u32;

    let cfg = LaunchConfig::new(
        Dim3::new(blocks_x, blocks_y, batch_count as u32),
        Dim3::xy(tun.tile.0, tun.tile.1),
    );
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        for ty in 0..dim_y {
            for tx in 0..dim_x {
                let col = g.group.y as i64 * dim_y as i64 + ty as i64;
                if col >= n {
                    continue;
                }
                let mut row = g.group.x as i64 * (dim_x * row_work) as i64 + tx as i64;
                for _ in 0..row_work {
                    if row < n {
                        visit(batch, row, col);
                    }
                    row += dim_x as i64;
                }
            }
        }
    })
}
