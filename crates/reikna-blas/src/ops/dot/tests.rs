use std::sync::Arc;

use half::f16;
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reikna_device::DeviceContext;

use super::*;
use crate::dispatch::{select_dot, DotKernel};
use crate::operand::{Plain, PtrArray, ResultDest, Strided, VecArg};
use crate::tuning::Tunables;
use crate::types::Precision;

fn setup() -> (Arc<DeviceContext>, Handle) {
    let ctx = DeviceContext::new();
    let handle = Handle::new(&ctx);
    (ctx, handle)
}

fn assert_close(got: f64, want: f64, tol: f64) {
    assert!(
        (got - want).abs() <= tol * (1.0 + want.abs()),
        "got {got}, want {want}"
    );
}

#[test]
fn dot_small_example() {
    let (ctx, h) = setup();
    let xb = ctx.alloc_from(&[1.0f32, 2.0, 3.0, 4.0, 5.0]).unwrap();
    let yb = ctx.alloc_from(&[5.0f32, 4.0, 3.0, 2.0, 1.0]).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [0.0f32];
    dot(
        &h,
        5,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out[0], 35.0);
}

#[test]
fn quick_return_zeroes_without_reading_operands() {
    let (ctx, h) = setup();
    let xb = ctx.alloc_from(&[f32::NAN; 8]).unwrap();
    let yb = ctx.alloc_from(&[f32::NAN; 8]).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());

    let mut out = [7.0f32, 7.0];
    dot(
        &h,
        0,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        2,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out, [0.0, 0.0]);

    let mut dev = ctx.alloc::<f32>(2).unwrap();
    dev.fill(7.0);
    dot(
        &h,
        -3,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        2,
        ResultDest::Device(dev.slice()),
    )
    .unwrap();
    assert_eq!(dev.to_vec(), vec![0.0, 0.0]);

    // batch_count == 0: nothing to zero, still a success
    let mut empty: [f32; 0] = [];
    dot(
        &h,
        8,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        0,
        ResultDest::Host(&mut empty),
    )
    .unwrap();
}

#[test]
fn self_dot_matches_generic_path_bitwise_f64() {
    let (ctx, h) = setup();
    let mut rng = StdRng::seed_from_u64(11);
    let data: Vec<f64> = (0..1537).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let xb = ctx.alloc_from(&data).unwrap();
    let yb = ctx.alloc_from(&data).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());

    // same descriptor twice: the squared-magnitude kernel
    let mut self_out = [0.0f64];
    dot(
        &h,
        1537,
        VecArg::new(&xs, 1),
        VecArg::new(&xs, 1),
        1,
        ResultDest::Host(&mut self_out),
    )
    .unwrap();
    // distinct buffers with identical contents: the generic kernel
    let mut gen_out = [0.0f64];
    dot(
        &h,
        1537,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut gen_out),
    )
    .unwrap();
    // both walk lanes identically, so the trees match bit for bit
    assert_eq!(self_out[0].to_bits(), gen_out[0].to_bits());
}

#[test]
fn self_dot_matches_generic_path_bitwise_f32_strided() {
    let (ctx, h) = setup();
    let mut rng = StdRng::seed_from_u64(12);
    let data: Vec<f32> = (0..2048).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let xb = ctx.alloc_from(&data).unwrap();
    let yb = ctx.alloc_from(&data).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let n = 1024;

    let mut self_out = [0.0f32];
    dot(
        &h,
        n,
        VecArg::new(&xs, 2),
        VecArg::new(&xs, 2),
        1,
        ResultDest::Host(&mut self_out),
    )
    .unwrap();
    let mut gen_out = [0.0f32];
    dot(
        &h,
        n,
        VecArg::new(&xs, 2),
        VecArg::new(&ys, 2),
        1,
        ResultDest::Host(&mut gen_out),
    )
    .unwrap();
    assert_eq!(self_out[0].to_bits(), gen_out[0].to_bits());
}

#[test]
fn negative_increment_reads_backwards() {
    let (ctx, h) = setup();
    let xb = ctx.alloc_from(&[1.0f64, 2.0, 3.0]).unwrap();
    let yb = ctx.alloc_from(&[10.0f64, 20.0, 30.0]).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [0.0f64];
    // x reversed: [3,2,1] . [10,20,30] = 30+40+30
    dot(
        &h,
        3,
        VecArg::new(&xs, -1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out[0], 100.0);
}

#[test]
fn offset_descriptors() {
    let (ctx, h) = setup();
    let xb = ctx.alloc_from(&[9.0f32, 1.0, 2.0]).unwrap();
    let yb = ctx.alloc_from(&[9.0f32, 9.0, 3.0, 4.0]).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [0.0f32];
    dot(
        &h,
        2,
        VecArg::with_offset(&xs, 1, 1),
        VecArg::with_offset(&ys, 2, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out[0], 1.0 * 3.0 + 2.0 * 4.0);
}

#[test]
fn strided_batches() {
    let (ctx, h) = setup();
    // batch b holds [b+1, b+1] so dot = 2*(b+1)^2
    let data: Vec<f64> = (0..3).flat_map(|b| [(b + 1) as f64, (b + 1) as f64]).collect();
    let xb = ctx.alloc_from(&data).unwrap();
    let xs = Strided {
        base: xb.slice(),
        stride: 2,
    };
    let ys = Strided {
        base: xb.slice(),
        stride: 2,
    };
    let mut out = [0.0f64; 3];
    dot(
        &h,
        2,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        3,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out, [2.0, 8.0, 18.0]);
}

#[test]
fn pointer_array_batches() {
    let (ctx, h) = setup();
    let a = ctx.alloc_from(&[1.0f32, 2.0]).unwrap();
    let b = ctx.alloc_from(&[3.0f32, 4.0]).unwrap();
    let ptrs = [a.slice(), b.slice()];
    let xs = PtrArray(&ptrs);
    let ys = PtrArray(&ptrs);
    let mut out = [0.0f32; 2];
    dot(
        &h,
        2,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        2,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    assert_eq!(out, [5.0, 25.0]);
}

#[test]
fn wave_per_batch_path() {
    let (ctx, h) = setup();
    let batch = 300usize;
    let n = 64usize;
    let plan = select_dot(Precision::F64, n as i64, batch as i32, true, false, h.arch(), h.tunables());
    assert_eq!(plan.kernel, DotKernel::WavePerBatch);

    let mut rng = StdRng::seed_from_u64(3);
    let xv: Vec<f64> = (0..batch * n).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let yv: Vec<f64> = (0..batch * n).map(|_| rng.gen_range(-2.0..2.0)).collect();
    let xb = ctx.alloc_from(&xv).unwrap();
    let yb = ctx.alloc_from(&yv).unwrap();
    let xs = Strided { base: xb.slice(), stride: n as i64 };
    let ys = Strided { base: yb.slice(), stride: n as i64 };
    let mut out = vec![0.0f64; batch];
    dot(
        &h,
        n as i64,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        batch as i32,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    for b in 0..batch {
        let want: f64 = (0..n).map(|i| xv[b * n + i] * yv[b * n + i]).sum();
        assert_close(out[b], want, 1e-12);
    }
}

#[test]
fn two_phase_path() {
    let (ctx, h) = setup();
    let n = 20_000usize;
    let plan = select_dot(Precision::F64, n as i64, 1, true, false, h.arch(), h.tunables());
    assert_eq!(plan.kernel, DotKernel::TwoPhase);
    assert!(plan.groups_per_batch > 1);

    let mut rng = StdRng::seed_from_u64(4);
    let xv: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let yv: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let xb = ctx.alloc_from(&xv).unwrap();
    let yb = ctx.alloc_from(&yv).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [0.0f64];
    dot(
        &h,
        n as i64,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    let want: f64 = xv.iter().zip(&yv).map(|(a, b)| a * b).sum();
    assert_close(out[0], want, 1e-12);
}

#[test]
fn unrolled_path_via_injected_table() {
    let ctx = DeviceContext::new();
    let mut tun = Tunables::default();
    tun.dot.single_group_threshold.f32 = 512;
    tun.dot.unrolled_min_n = 1024;
    let h = Handle::new(&ctx).with_tunables(tun);

    let n = 5000usize;
    let plan = select_dot(Precision::F32, n as i64, 1, true, false, h.arch(), h.tunables());
    assert_eq!(plan.kernel, DotKernel::Unrolled4);

    let xv: Vec<f32> = (0..n).map(|i| ((i % 13) as f32) * 0.25).collect();
    let yv: Vec<f32> = (0..n).map(|i| ((i % 7) as f32) * 0.5).collect();
    let xb = ctx.alloc_from(&xv).unwrap();
    let yb = ctx.alloc_from(&yv).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [0.0f32];
    dot(
        &h,
        n as i64,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    let want: f64 = xv.iter().zip(&yv).map(|(a, b)| *a as f64 * *b as f64).sum();
    assert_close(out[0] as f64, want, 1e-4);
}

#[test]
fn dotc_conjugates_x() {
    let (ctx, h) = setup();
    let xv = [Complex64::new(1.0, 2.0), Complex64::new(-3.0, 0.5)];
    let yv = [Complex64::new(2.0, -1.0), Complex64::new(4.0, 4.0)];
    let xb = ctx.alloc_from(&xv).unwrap();
    let yb = ctx.alloc_from(&yv).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());

    let mut out = [Complex64::new(0.0, 0.0)];
    dotc(
        &h,
        2,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    let want: Complex64 = xv.iter().zip(&yv).map(|(x, y)| x.conj() * y).sum();
    assert!((out[0] - want).norm() < 1e-12);

    // unconjugated variant differs
    let mut out_u = [Complex64::new(0.0, 0.0)];
    dot(
        &h,
        2,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out_u),
    )
    .unwrap();
    let want_u: Complex64 = xv.iter().zip(&yv).map(|(x, y)| x * y).sum();
    assert!((out_u[0] - want_u).norm() < 1e-12);
    assert!((out_u[0] - out[0]).norm() > 1e-6);
}

#[test]
fn half_precision_accumulates_in_f32() {
    let (ctx, h) = setup();
    let n = 4096usize;
    let ones = vec![f16::from_f32(1.0); n];
    let xb = ctx.alloc_from(&ones).unwrap();
    let yb = ctx.alloc_from(&ones).unwrap();
    let xs = Plain(xb.slice());
    let ys = Plain(yb.slice());
    let mut out = [f16::from_f32(0.0)];
    dot(
        &h,
        n as i64,
        VecArg::new(&xs, 1),
        VecArg::new(&ys, 1),
        1,
        ResultDest::Host(&mut out),
    )
    .unwrap();
    // f16 accumulation would stall at 2048; the f32 accumulator does not
    assert_eq!(f32::from(out[0]), 4096.0);
}

#[test]
fn device_result_destination() {
    let (ctx, h) = setup();
    let xb = ctx.alloc_from(&[2.0f64, 3.0]).unwrap();
    let xs = Plain(xb.slice());
    let out = ctx.alloc::<f64>(1).unwrap();
    dot(
        &h,
        2,
        VecArg::new(&xs, 1),
        VecArg::new(&xs, 1),
        1,
        ResultDest::Device(out.slice()),
    )
    .unwrap();
    assert_eq!(out.to_vec(), vec![13.0]);
}

#[test]
fn workspace_size_tracks_plan() {
    let (_ctx, h) = setup();
    // single-group shapes need no partials; host results stage a tail
    assert_eq!(dot_workspace_size::<f64>(&h, 1000, 4, false), 0);
    assert_eq!(dot_workspace_size::<f64>(&h, 1000, 4, true), 32);
    // two-phase shapes hold one partial per (group, batch element)
    let n = 20_000;
    let plan = select_dot(Precision::F64, n, 2, false, false, h.arch(), h.tunables());
    let want = plan.groups_per_batch as usize * 2 * 8 + 16;
    assert_eq!(dot_workspace_size::<f64>(&h, n, 2, true), want);
}
