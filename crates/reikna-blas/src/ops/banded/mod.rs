//! Symmetric/Hermitian banded matrix-vector products.
//!
//! Storage holds only the band: column j of the logical matrix occupies
//! storage column j, with the logical row remapped into the band by
//! `row = upper ? ind + (k - col) : ind - col`. The upper layout keeps
//! the main diagonal in storage row k, the lower layout in storage
//! row 0.

use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg, VecArg};
use crate::types::{Scalar, Uplo};

/// `y := alpha*A*x + beta*y`, A symmetric banded with k super/subdiagonals.
pub fn sbmv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    banded_launcher(handle, uplo, n, k, alpha, a, x, beta, y, batch_count, false)
}

/// Hermitian banded variant; the stored diagonal's imaginary part is
/// ignored.
pub fn hbmv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    banded_launcher(handle, uplo, n, k, alpha, a, x, beta, y, batch_count, true)
}

#[allow(clippy::too_many_arguments)]
fn banded_launcher<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
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
    launch_banded_kernel(
        handle.queue(),
        uplo.is_upper(),
        n,
        k,
        alpha,
        a,
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
fn launch_banded_kernel<T: Scalar>(
    queue: &Queue,
    upper: bool,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    shifty: i64,
    batch_count: i32,
    hermitian: bool,
) -> DeviceResult<()> {
    let groups = ((n - 1) / DIM_X as i64 + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
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

        let asl = a.resolve(batch);
        let xs = x.resolve(batch);
        let mut sdata = vec![T::zero(); DIM_X * DIM_Y];

        for ty in 0..DIM_Y {
            for tx in 0..DIM_X {
                let ind = group_base + tx as i64;
                let mut res = T::zero();
                if ind < n {
                    let mut col = ty as i64;
                    while col < n {
                        let xv = xs.get((shiftx + col * xinc) as usize);
                        if (ind <= col && upper) || (ind >= col && !upper) {
                            // stored triangle: remap the logical row into
                            // the band
                            let row = if upper { ind + (k - col) } else { ind - col };
                            if (0..=k).contains(&row) {
                                let stored = asl.get((offa + row + col * lda) as usize);
                                let diag = if upper { row == k } else { row == 0 };
                                let av = if hermitian && diag {
                                    T::from_real(stored.re())
                                } else {
                                    stored
                                };
                                res += av * xv;
                            }
                        } else {
                            // opposite triangle: value lives at the
                            // transposed position, conjugated for the
                            // Hermitian case
                            let trans_row = if upper { col + (k - ind) } else { col - ind };
                            if (0..=k).contains(&trans_row) {
                                let stored = asl.get((offa + trans_row + ind * lda) as usize);
                                let av = if hermitian { stored.conj() } else { stored };
                                res += av * xv;
                            }
                        }
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
