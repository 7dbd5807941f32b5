//! Triangular solve with a single right-hand side: `op(A) * x = b`,
//! solved in place over x.
//!
//! One cooperative group per batch element walks the columns in
//! substitution order; after each pivot the remaining entries are
//! updated lane-parallel. The transpose cases fold into the same loop by
//! flipping the effective triangle and transposing the element accessor.

use reikna_device::{DeviceResult, Dim3, LaunchConfig, Queue};

use crate::error::Result;
use crate::handle::Handle;
use crate::operand::{MatArg, VecArg};
use crate::types::{Diag, Op, Scalar, Uplo};

const NB: usize = 128;

pub fn trsv<T: Scalar>(
    handle: &Handle,
    uplo: Uplo,
    op: Op,
    diag: Diag,
    n: i64,
    a: MatArg<T>,
    x: VecArg<T>,
    batch_count: i32,
) -> Result<()> {
    if n == 0 || batch_count <= 0 {
        return Ok(());
    }
    let shiftx = x.shift(n);
    launch_trsv_kernel(handle.queue(), uplo, op, diag, n, a, x, shiftx, batch_count)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn launch_trsv_kernel<T: Scalar>(
    queue: &Queue,
    uplo: Uplo,
    op: Op,
    diag: Diag,
    n: i64,
    a: MatArg<T>,
    x: VecArg<T>,
    shiftx: i64,
    batch_count: i32,
) -> DeviceResult<()> {
    let (lda, offa) = (a.lda, a.offset);
    let xinc = x.inc;
    // transposition flips which stored triangle is the forward one
    let forward = uplo.is_upper() == op.is_transposed();
    let conj = op.is_conjugated();
    let unit = diag == Diag::Unit;

    let cfg = LaunchConfig::new(Dim3::new(1, 1, batch_count as u32), Dim3::x(NB as u32));
    queue.launch(cfg, move |g| {
        let batch = g.group.z as usize;
        let asl = a.resolve(batch);
        let xs = x.resolve(batch);

        let aload = |r: i64, c: i64| {
            let v = if op.is_transposed() {
                asl.get((offa + c + r * lda) as usize)
            } else {
                asl.get((offa + r + c * lda) as usize)
            };
            if conj {
                v.conj()
            } else {
                v
            }
        };
        let xidx = |i: i64| (shiftx + i * xinc) as usize;

        let mut j = if forward { 0 } else { n - 1 };
        for _ in 0..n {
            // pivot step, lane 0
            let mut xj = xs.get(xidx(j));
            if !unit {
                xj = xj / aload(j, j);
            }
            xs.set(xidx(j), xj);

            // trailing update, lane-parallel over the unsolved entries
            if forward {
                for t in 0..NB {
                    let mut i = j + 1 + t as i64;
                    while i < n {
                        let idx = xidx(i);
                        xs.set(idx, xs.get(idx) - aload(i, j) * xj);
                        i += NB as i64;
                    }
                }
                j += 1;
            } else {
                for t in 0..NB {
                    let mut i = t as i64;
                    while i < j {
                        let idx = xidx(i);
                        xs.set(idx, xs.get(idx) - aload(i, j) * xj);
                        i += NB as i64;
                    }
                }
                j -= 1;
            }
        }
    })
}
