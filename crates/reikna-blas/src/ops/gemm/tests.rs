use std::sync::Arc;

use ndarray::{Array2, ShapeBuilder};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reikna_device::DeviceContext;

use super::*;
use crate::operand::Plain;

fn setup() -> (Arc<DeviceContext>, Handle) {
    let ctx = DeviceContext::new();
    let handle = Handle::new(&ctx);
    (ctx, handle)
}

fn run_gemm_f64(
    h: &Handle,
    ctx: &Arc<DeviceContext>,
    transa: Op,
    transb: Op,
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    lda: usize,
    b: &[f64],
    ldb: usize,
    beta: f64,
    c: &mut [f64],
) {
    let ab = ctx.alloc_from(a).unwrap();
    let bb = ctx.alloc_from(b).unwrap();
    let mut cb = ctx.alloc::<f64>(c.len()).unwrap();
    cb.upload(c).unwrap();
    let asrc = Plain(ab.slice());
    let bsrc = Plain(bb.slice());
    let csrc = Plain(cb.slice());
    gemm(
        h,
        transa,
        transb,
        m as i64,
        n as i64,
        k as i64,
        ScalarArg::Host(alpha),
        MatArg::new(&asrc, lda as i64),
        MatArg::new(&bsrc, ldb as i64),
        ScalarArg::Host(beta),
        MatArg::new(&csrc, m as i64),
        1,
    )
    .unwrap();
    cb.download(c).unwrap();
}

#[test]
fn matches_ndarray_oracle() {
    let (ctx, h) = setup();
    let (m, n, k) = (50usize, 37usize, 29usize);
    let mut rng = StdRng::seed_from_u64(100);
    let amat = Array2::<f64>::random_using((m, k).f(), Uniform::new(-1.0, 1.0), &mut rng);
    let bmat = Array2::<f64>::random_using((k, n).f(), Uniform::new(-1.0, 1.0), &mut rng);
    let cmat = Array2::<f64>::random_using((m, n).f(), Uniform::new(-1.0, 1.0), &mut rng);
    let a: Vec<f64> = amat.as_slice_memory_order().unwrap().to_vec();
    let b: Vec<f64> = bmat.as_slice_memory_order().unwrap().to_vec();
    let c0: Vec<f64> = cmat.as_slice_memory_order().unwrap().to_vec();

    let want = amat.dot(&bmat) * 1.5 + cmat * -0.25;

    let mut c = c0;
    run_gemm_f64(&h, &ctx, Op::None, Op::None, m, n, k, 1.5, &a, m, &b, k, -0.25, &mut c);
    for col in 0..n {
        for row in 0..m {
            let w = want[(row, col)];
            assert!(
                (c[row + col * m] - w).abs() < 1e-12 * (1.0 + w.abs()),
                "({row},{col})"
            );
        }
    }
}

#[test]
fn transposed_operands() {
    let (ctx, h) = setup();
    let (m, n, k) = (20usize, 18usize, 26usize);
    let mut rng = StdRng::seed_from_u64(101);
    // A stored k x m (to be transposed), B stored n x k (to be transposed)
    let a: Vec<f64> = (0..k * m).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let b: Vec<f64> = (0..n * k).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let mut c = vec![0.0f64; m * n];
    run_gemm_f64(&h, &ctx, Op::Transpose, Op::Transpose, m, n, k, 1.0, &a, k, &b, n, 0.0, &mut c);
    for col in 0..n {
        for row in 0..m {
            let mut want = 0.0;
            for kk in 0..k {
                want += a[kk + row * k] * b[col + kk * n];
            }
            assert!((c[row + col * m] - want).abs() < 1e-12, "({row},{col})");
        }
    }
}

#[test]
fn alpha_zero_scales_c_without_reading_operands() {
    let (ctx, h) = setup();
    let (m, n, k) = (19usize, 23usize, 11usize);
    let a = vec![f64::NAN; m * k];
    let b = vec![f64::NAN; k * n];
    let mut c: Vec<f64> = (0..m * n).map(|i| i as f64).collect();
    let want: Vec<f64> = c.iter().map(|v| v * -2.0).collect();
    run_gemm_f64(&h, &ctx, Op::None, Op::None, m, n, k, 0.0, &a, m, &b, k, -2.0, &mut c);
    assert_eq!(c, want);
}

#[test]
fn zero_inner_dimension_scales_c() {
    let (ctx, h) = setup();
    let (m, n) = (9usize, 7usize);
    let a = vec![f64::NAN; 1];
    let b = vec![f64::NAN; 1];
    let mut c = vec![1.0f64; m * n];
    run_gemm_f64(&h, &ctx, Op::None, Op::None, m, n, 0, 1.0, &a, m, &b, 1, 3.0, &mut c);
    assert_eq!(c, vec![3.0; m * n]);
}

#[test]
fn conj_transpose_complex() {
    let (ctx, h) = setup();
    let (m, n, k) = (6usize, 5usize, 4usize);
    let mut rng = StdRng::seed_from_u64(102);
    let a: Vec<Complex64> = (0..k * m)
        .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    let b: Vec<Complex64> = (0..k * n)
        .map(|_| Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();

    let ab = ctx.alloc_from(&a).unwrap();
    let bb = ctx.alloc_from(&b).unwrap();
    let cb = ctx.alloc::<Complex64>(m * n).unwrap();
    let asrc = Plain(ab.slice());
    let bsrc = Plain(bb.slice());
    let csrc = Plain(cb.slice());
    gemm(
        &h,
        Op::ConjTranspose,
        Op::None,
        m as i64,
        n as i64,
        k as i64,
        ScalarArg::Host(Complex64::new(1.0, 0.0)),
        MatArg::new(&asrc, k as i64),
        MatArg::new(&bsrc, k as i64),
        ScalarArg::Host(Complex64::new(0.0, 0.0)),
        MatArg::new(&csrc, m as i64),
        1,
    )
    .unwrap();
    let c = cb.to_vec();
    for col in 0..n {
        for row in 0..m {
            let mut want = Complex64::new(0.0, 0.0);
            for kk in 0..k {
                want += a[kk + row * k].conj() * b[kk + col * k];
            }
            assert!((c[row + col * m] - want).norm() < 1e-12, "({row},{col})");
        }
    }
}

struct RecordingBackend;

impl MatmulBackend for RecordingBackend {
    fn gemm_f32(&self, req: GemmRequest<'_, f32>) -> Result<()> {
        // claim f32 by writing a sentinel into C
        let cs = req.c.resolve(0);
        cs.set(0, 42.0);
        Ok(())
    }
    // f64 keeps the default NotImplemented
}

#[test]
fn backend_is_tried_first_and_not_implemented_falls_back() {
    let ctx = DeviceContext::new();
    let h = Handle::new(&ctx).with_backend(Arc::new(RecordingBackend));

    // f32 goes to the backend
    let ab = ctx.alloc_from(&[1.0f32; 4]).unwrap();
    let bb = ctx.alloc_from(&[1.0f32; 4]).unwrap();
    let cb = ctx.alloc::<f32>(4).unwrap();
    let asrc = Plain(ab.slice());
    let bsrc = Plain(bb.slice());
    let csrc = Plain(cb.slice());
    gemm(
        &h,
        Op::None,
        Op::None,
        2,
        2,
        2,
        ScalarArg::Host(1.0f32),
        MatArg::new(&asrc, 2),
        MatArg::new(&bsrc, 2),
        ScalarArg::Host(0.0f32),
        MatArg::new(&csrc, 2),
        1,
    )
    .unwrap();
    assert_eq!(cb.to_vec()[0], 42.0);

    // f64 falls back to the source kernel and computes the real product
    let ad = ctx.alloc_from(&[1.0f64; 4]).unwrap();
    let bd = ctx.alloc_from(&[1.0f64; 4]).unwrap();
    let cd = ctx.alloc::<f64>(4).unwrap();
    let asrc = Plain(ad.slice());
    let bsrc = Plain(bd.slice());
    let csrc = Plain(cd.slice());
    gemm(
        &h,
        Op::None,
        Op::None,
        2,
        2,
        2,
        ScalarArg::Host(1.0f64),
        MatArg::new(&asrc, 2),
        MatArg::new(&bsrc, 2),
        ScalarArg::Host(0.0f64),
        MatArg::new(&csrc, 2),
        1,
    )
    .unwrap();
    assert_eq!(cd.to_vec(), vec![2.0; 4]);
}
