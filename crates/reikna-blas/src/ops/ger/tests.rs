use std::sync::Arc;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reikna_device::DeviceContext;

use super::*;
use crate::dispatch::select_ger;
use crate::operand::Plain;
use crate::tuning::Tunables;
use crate::types::Precision;

fn setup() -> (Arc<DeviceContext>, Handle) {
    let ctx = DeviceContext::new();
    let handle = Handle::new(&ctx);
    (ctx, handle)
}

fn run_ger_f64(
    h: &Handle,
    ctx: &Arc<DeviceContext>,
    m: usize,
    n: usize,
    alpha: f64,
    x: &[f64],
    y: &[f64],
    a: &mut [f64],
) {
    let xb = ctx.alloc_from(x).unwrap();
    let yb = ctx.alloc_from(y).unwrap();
    let mut ab = ctx.alloc::<f64>(a.len()).unwrap();
    ab.upload(a).unwrap();
    let xsrc = Plain(xb.slice());
    let ysrc = Plain(yb.slice());
    let asrc = Plain(ab.slice());
    ger(
        h,
        m as i64,
        n as i64,
        ScalarArg::Host(alpha),
        VecArg::new(&xsrc, 1),
        VecArg::new(&ysrc, 1),
        MatArg::new(&asrc, m as i64),
        1,
    )
    .unwrap();
    ab.download(a).unwrap();
}

#[test]
fn outer_product_on_zero_matrix() {
    let (ctx, h) = setup();
    // [1,2] x [1,2]^T on zero A => column-major [1,2,2,4]
    let mut a = vec![0.0f64; 4];
    run_ger_f64(&h, &ctx, 2, 2, 1.0, &[1.0, 2.0], &[1.0, 2.0], &mut a);
    assert_eq!(a, vec![1.0, 2.0, 2.0, 4.0]);
}

#[test]
fn round_trip_restores_a() {
    let (ctx, h) = setup();
    let (m, n) = (57usize, 33usize);
    let mut rng = StdRng::seed_from_u64(70);
    let x: Vec<f64> = (0..m).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a0: Vec<f64> = (0..m * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut a = a0.clone();
    run_ger_f64(&h, &ctx, m, n, 0.75, &x, &y, &mut a);
    run_ger_f64(&h, &ctx, m, n, -0.75, &x, &y, &mut a);
    for i in 0..m * n {
        assert!((a[i] - a0[i]).abs() < 1e-14, "element {i}");
    }

    // trivial alpha == 0 round trip is exact
    let mut a = a0.clone();
    run_ger_f64(&h, &ctx, m, n, 0.0, &x, &y, &mut a);
    assert_eq!(a, a0);
}

#[test]
fn alpha_zero_never_reads_x_or_y() {
    let (ctx, h) = setup();
    let (m, n) = (16usize, 8usize);
    let a0: Vec<f64> = (0..m * n).map(|i| i as f64).collect();
    let mut a = a0.clone();
    run_ger_f64(
        &h,
        &ctx,
        m,
        n,
        0.0,
        &vec![f64::NAN; m],
        &vec![f64::NAN; n],
        &mut a,
    );
    assert_eq!(a, a0);
}

#[test]
fn tiled_path_matches_oracle() {
    let (ctx, h) = setup();
    let (m, n) = (70usize, 90usize);
    assert_eq!(
        select_ger(Precision::F64, m as i64, n as i64, h.arch(), h.tunables()).kernel,
        GerKernel::Tiled
    );
    let mut rng = StdRng::seed_from_u64(71);
    let x: Vec<f64> = (0..m).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a0: Vec<f64> = (0..m * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut a = a0.clone();
    run_ger_f64(&h, &ctx, m, n, 1.25, &x, &y, &mut a);
    for c in 0..n {
        for r in 0..m {
            let want = a0[r + c * m] + 1.25 * x[r] * y[c];
            assert!((a[r + c * m] - want).abs() < 1e-13, "({r},{c})");
        }
    }
}

#[test]
fn paired_column_path_for_large_single_precision() {
    let (ctx, h) = setup();
    let (m, n) = (1501usize, 7usize); // odd m exercises the lone-row edge
    assert_eq!(
        select_ger(Precision::F32, m as i64, n as i64, h.arch(), h.tunables()).kernel,
        GerKernel::PairedColumn
    );
    let mut rng = StdRng::seed_from_u64(72);
    let x: Vec<f32> = (0..m).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let a0: Vec<f32> = (0..m * n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let xb = ctx.alloc_from(&x).unwrap();
    let yb = ctx.alloc_from(&y).unwrap();
    let mut ab = ctx.alloc::<f32>(m * n).unwrap();
    ab.upload(&a0).unwrap();
    let xsrc = Plain(xb.slice());
    let ysrc = Plain(yb.slice());
    let asrc = Plain(ab.slice());
    ger(
        &h,
        m as i64,
        n as i64,
        ScalarArg::Host(2.0f32),
        VecArg::new(&xsrc, 1),
        VecArg::new(&ysrc, 1),
        MatArg::new(&asrc, m as i64),
        1,
    )
    .unwrap();
    let a = ab.to_vec();
    for c in 0..n {
        for r in 0..m {
            let want = a0[r + c * m] + 2.0 * x[r] * y[c];
            assert!((a[r + c * m] - want).abs() < 1e-4, "({r},{c})");
        }
    }
}

#[test]
fn column_path_without_the_paired_architecture() {
    let ctx = DeviceContext::new();
    let mut tun = Tunables::default();
    tun.ger.paired_arch = 999;
    let h = Handle::new(&ctx).with_tunables(tun);
    let (m, n) = (1200usize, 5usize);
    assert_eq!(
        select_ger(Precision::F32, m as i64, n as i64, h.arch(), h.tunables()).kernel,
        GerKernel::GroupPerColumn
    );
    let mut rng = StdRng::seed_from_u64(73);
    let x: Vec<f32> = (0..m).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let y: Vec<f32> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let xb = ctx.alloc_from(&x).unwrap();
    let yb = ctx.alloc_from(&y).unwrap();
    let ab = ctx.alloc::<f32>(m * n).unwrap();
    let xsrc = Plain(xb.slice());
    let ysrc = Plain(yb.slice());
    let asrc = Plain(ab.slice());
    ger(
        &h,
        m as i64,
        n as i64,
        ScalarArg::Host(1.0f32),
        VecArg::new(&xsrc, 1),
        VecArg::new(&ysrc, 1),
        MatArg::new(&asrc, m as i64),
        1,
    )
    .unwrap();
    let a = ab.to_vec();
    for c in 0..n {
        for r in 0..m {
            assert!((a[r + c * m] - x[r] * y[c]).abs() < 1e-5, "({r},{c})");
        }
    }
}

#[test]
fn double_buffered_path_for_large_squares() {
    let (ctx, h) = setup();
    let n = 2048usize;
    assert_eq!(
        select_ger(Precision::F64, n as i64, n as i64, h.arch(), h.tunables()).kernel,
        GerKernel::DoubleBuffered
    );
    let x: Vec<f64> = (0..n).map(|i| ((i * 3) % 7) as f64 * 0.5 - 1.0).collect();
    let y: Vec<f64> = (0..n).map(|i| ((i * 5) % 11) as f64 * 0.25 - 1.0).collect();
    let mut a = vec![0.0f64; n * n];
    run_ger_f64(&h, &ctx, n, n, 1.0, &x, &y, &mut a);
    // spot check a grid of elements
    for &r in &[0usize, 1, 63, 64, 1024, 2047] {
        for &c in &[0usize, 1, 63, 64, 1024, 2047] {
            assert_eq!(a[r + c * n], x[r] * y[c], "({r},{c})");
        }
    }
}

#[test]
fn gerc_conjugates_y() {
    let (ctx, h) = setup();
    let (m, n) = (3usize, 2usize);
    let x = [
        Complex64::new(1.0, 1.0),
        Complex64::new(0.0, -2.0),
        Complex64::new(3.0, 0.5),
    ];
    let y = [Complex64::new(2.0, -1.0), Complex64::new(-1.0, 4.0)];
    let xb = ctx.alloc_from(&x).unwrap();
    let yb = ctx.alloc_from(&y).unwrap();
    let ab = ctx.alloc::<Complex64>(m * n).unwrap();
    let xsrc = Plain(xb.slice());
    let ysrc = Plain(yb.slice());
    let asrc = Plain(ab.slice());
    gerc(
        &h,
        m as i64,
        n as i64,
        ScalarArg::Host(Complex64::new(1.0, 0.0)),
        VecArg::new(&xsrc, 1),
        VecArg::new(&ysrc, 1),
        MatArg::new(&asrc, m as i64),
        1,
    )
    .unwrap();
    let a = ab.to_vec();
    for c in 0..n {
        for r in 0..m {
            let want = x[r] * y[c].conj();
            assert!((a[r + c * m] - want).norm() < 1e-13, "({r},{c})");
        }
    }
}

#[test]
fn batched_ger_with_per_batch_alpha() {
    let (ctx, h) = setup();
    let (m, n, batch) = (4usize, 3usize, 2usize);
    let x: Vec<f64> = (0..m * batch).map(|i| i as f64 + 1.0).collect();
    let y: Vec<f64> = (0..n * batch).map(|i| i as f64 + 1.0).collect();
    let alphas = ctx.alloc_from(&[1.0f64, -2.0]).unwrap();

    let xb = ctx.alloc_from(&x).unwrap();
    let yb = ctx.alloc_from(&y).unwrap();
    let ab = ctx.alloc::<f64>(m * n * batch).unwrap();
    let xsrc = crate::operand::Strided { base: xb.slice(), stride: m as i64 };
    let ysrc = crate::operand::Strided { base: yb.slice(), stride: n as i64 };
    let asrc = crate::operand::Strided { base: ab.slice(), stride: (m * n) as i64 };
    ger(
        &h,
        m as i64,
        n as i64,
        ScalarArg::Device { values: alphas.slice(), stride: 1 },
        VecArg::new(&xsrc, 1),
        VecArg::new(&ysrc, 1),
        MatArg::new(&asrc, m as i64),
        batch as i32,
    )
    .unwrap();
    let a = ab.to_vec();
    for b in 0..batch {
        let al = if b == 0 { 1.0 } else { -2.0 };
        for c in 0..n {
            for r in 0..m {
                let want = al * x[b * m + r] * y[b * n + c];
                assert_eq!(a[b * m * n + r + c * m], want, "batch {b} ({r},{c})");
            }
        }
    }
}
