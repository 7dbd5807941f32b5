//! General matrix multiply: `C := alpha*op(A)*op(B) + beta*C`.
//!
//! The optimized matmul engine is an external collaborator behind
//! [`MatmulBackend`]: a handle may install one, it is consulted first,
//! and a `NotImplemented` answer falls through to the source-level tiled
//! kernel here. The fallback stages square tiles of op(A) and op(B) in
//! group scratch and accumulates one output element per lane.

use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::operand::{MatArg, ScalarArg};
use crate::types::{Op, Scalar};

/// One gemm invocation, as handed to an external backend.
pub struct GemmRequest<'a, T: Scalar> {
    pub queue: &'a Queue,
    pub transa: Op,
    pub transb: Op,
    pub m: i64,
    pub n: i64,
    pub k: i64,
    pub alpha: ScalarArg<T>,
    pub a: MatArg<'a, T>,
    pub b: MatArg<'a, T>,
    pub beta: ScalarArg<T>,
    pub c: MatArg<'a, T>,
    pub batch_count: i32,
}

/// Narrow call contract of the vendor-accelerated matmul collaborator.
///
/// Every method defaults to `NotImplemented`; the caller falls back to
/// the built-in kernel on exactly that status, so a backend only claims
/// the combinations it truly handles.
pub trait MatmulBackend: Send + Sync {
    fn gemm_f32(&self, _req: GemmRequest<'_, f32>) -> Result<()> {
        Err(Error::NotImplemented)
    }

    fn gemm_f64(&self, _req: GemmRequest<'_, f64>) -> Result<()> {
        Err(Error::NotImplemented)
    }
}

/// Routes a request to the backend entry point of its element type.
/// Precisions without a backend hook always report `NotImplemented`.
pub trait GemmElement: Scalar {
    fn dispatch_backend(
        _backend: &dyn MatmulBackend,
        _req: GemmRequest<'_, Self>,
    ) -> Result<()> {
        Err(Error::NotImplemented)
    }
}

impl GemmElement for f32 {
    fn dispatch_backend(backend: &dyn MatmulBackend, req: GemmRequest<'_, Self>) -> Result<()> {
        backend.gemm_f32(req)
    }
}

impl GemmElement for f64 {
    fn dispatch_backend(backend: &dyn MatmulBackend, req: GemmRequest<'_, Self>) -> Result<()> {
        backend.gemm_f64(req)
    }
}

impl GemmElement for num_complex::Complex32 {}
impl GemmElement for num_complex::Complex64 {}

#[allow(clippy::too_many_arguments)]
pub fn gemm<T: GemmElement>(
    handle: &Handle,
    transa: Op,
    transb: Op,
    m: i64,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    b: MatArg<T>,
    beta: ScalarArg<T>,
    c: MatArg<T>,
    batch_count: i32,
) -> Result<()> {
    if m == 0 || n == 0 || batch_count <= 0 {
        return Ok(());
    }
    if let (Some(av), Some(bv)) = (alpha.host_value(), beta.host_value()) {
        if av.is_zero() && bv.is_one() {
            return Ok(());
        }
    }

    if let Some(backend) = handle.backend() {
        match T::dispatch_backend(
            backend.as_ref(),
            GemmRequest {
                queue: handle.queue(),
                transa,
                transb,
                m,
                n,
                k,
                alpha,
                a,
                b,
                beta,
                c,
                batch_count,
            },
        ) {
            Err(Error::NotImplemented) => {} // fall through to the source kernel
            other => return other,
        }
    }

    let tile = handle.tunables().gemm.tile;
    launch_gemm_tiled(
        handle.queue(),
        tile,
        transa,
        transb,
        m,
        n,
        k,
        alpha,
        a,
        b,
        beta,
        c,
        batch_count,
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn launch_gemm_tiled<T: Scalar>(
    queue: &Queue,
    tile: u32,
    transa: Op,
    transb: Op,
    m: i64,
    n: i64,
    k: i64,
    alpha: ScalarArg<T>,
    a: MatArg<T>,
    b: MatArg<T>,
    beta: ScalarArg<T>,
    c: MatArg<T>,
    batch_count: i32,
) -> DeviceResult<()> {
    let ts = tile as usize;
    let groups_x = ((n - 1) / ts as i64 + 1) as u32;
    let groups_y = ((m - 1) / ts as i64 + 1) as u32;
    let (lda, offa) = (a.lda, a.offset);
    let (ldb, offb) = (b.lda, b.offset);
    let (ldc, offc) = (c.lda, c.offset);

    let cfg = LaunchConfig::new(
        Dim3::new(groups_x, groups_y, batch_count as u32),
        Dim3::xy(tile, tile),
    )
    .with_shared(2 * ts * ts * std::mem::size_of::<T>());

    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let al = alpha.get(batch);
        let be = beta.get(batch);
        let cs = c.resolve(batch);
        let row0 = g.group.y as i64 * ts as i64;
        let col0 = g.group.x as i64 * ts as i64;

        if al.is_zero() {
            for ty in 0..ts {
                for tx in 0..ts {
                    let (row, col) = (row0 + tx as i64, col0 + ty as i64);
                    if row < m && col < n {
                        let idx = (offc + row + col * ldc) as usize;
                        if be.is_zero() {
                            cs.set(idx, T::zero());
                        } else {
                            cs.set(idx, be * cs.get(idx));
                        }
                    }
                }
            }
            return;
        }

        let asl = a.resolve(batch);
        let bsl = b.resolve(batch);
        let aload = |row: i64, kk: i64| {
            let v = match transa {
                Op::None => asl.get((offa + row + kk * lda) as usize),
                _ => asl.get((offa + kk + row * lda) as usize),
            };
            if transa.is_conjugated() {
                v.conj()
            } else {
                v
            }
        };
        let bload = |kk: i64, col: i64| {
            let v = match transb {
                Op::None => bsl.get((offb + kk + col * ldb) as usize),
                _ => bsl.get((offb + col + kk * ldb) as usize),
            };
            if transb.is_conjugated() {
                v.conj()
            } else {
                v
            }
        };

        let mut acc = vec![T::zero(); ts * ts];
        let mut a_tile = vec![T::zero(); ts * ts];
        let mut b_tile = vec![T::zero(); ts * ts];
        let k_tiles = (k + ts as i64 - 1) / ts as i64;

        for kt in 0..k_tiles {
            let kbase = kt * ts as i64;
            // stage both operand tiles, zero-padded at the edges
            for ty in 0..ts {
                for tx in 0..ts {
                    let row = row0 + tx as i64;
                    let kk = kbase + ty as i64;
                    a_tile[tx + ty * ts] = if row < m && kk < k {
                        aload(row, kk)
                    } else {
                        T::zero()
                    };
                    let col = col0 + ty as i64;
                    let kb = kbase + tx as i64;
                    b_tile[tx + ty * ts] = if kb < k && col < n {
                        bload(kb, col)
                    } else {
                        T::zero()
                    };
                }
            }
            for ty in 0..ts {
                for tx in 0..ts {
                    let mut sum = acc[tx + ty * ts];
                    for kk in 0..ts {
                        sum += a_tile[tx + kk * ts] * b_tile[kk + ty * ts];
                    }
                    acc[tx + ty * ts] = sum;
                }
            }
        }

        for ty in 0..ts {
            for tx in 0..ts {
                let (row, col) = (row0 + tx as i64, col0 + ty as i64);
                if row < m && col < n {
                    let idx = (offc + row + col * ldc) as usize;
                    let v = if be.is_zero() {
                        al * acc[tx + ty * ts]
                    } else {
                        al * acc[tx + ty * ts] + be * cs.get(idx)
                    };
                    cs.set(idx, v);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests;
