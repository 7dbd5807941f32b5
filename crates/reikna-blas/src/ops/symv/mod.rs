//! Symmetric and Hermitian matrix-vector products over full (dense)
//! storage: `y := alpha*A*x + beta*y` with only one triangle of A
//! referenced.
//!
//! Reads landing in the unstored triangle are redirected to the
//! transposed position; the Hermitian variant conjugates the redirected
//! value and treats the diagonal as purely real regardless of what the
//! stored imaginary part says.

use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg, VecArg};
use crate::types::{Scalar, Uplo};

pub fn symv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    symv_launcher(handle, uplo, n, alpha, a, x, beta, y, batch_count, false)
}

pub fn hemv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    x: VecArg<T>,
    beta: ScalarArg<T>,
    y: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    symv_launcher(handle, uplo, n, alpha, a, x, beta, y, batch_count, true)
}

#[allow(clippy::too_many_arguments)]
fn symv_launcher<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    n: i64,
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
    launch_symv_kernel(
        handle.queue(),
        uplo.is_upper(),
        n,
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
fn launch_symv_kernel<T: Scalar>(
    queue: &Queue,
    upper: bool,
    n: i64,
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
                        // reads in the unstored triangle mirror to the
                        // transposed position
                        let mirrored = (ind > col && upper) || (ind < col && !upper);
                        let (r, c) = if mirrored { (col, ind) } else { (ind, col) };
                        let stored = asl.get((offa + r + c * lda) as usize);
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
