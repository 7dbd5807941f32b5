use super::*;
use num_complex::Complex32;
use reikna_device::DeviceContext;

#[test]
fn wave_reduce_sums_all_lanes() {
    for width in [1usize, 2, 4, 32, 64] {
        let mut lanes: Vec<f64> = (0..width).map(|i| i as f64 + 0.5).collect();
        let expect: f64 = lanes.iter().sum();
        wave_reduce_sum(&mut lanes);
        assert_eq!(lanes[0], expect, "width {width}");
    }
}

#[test]
fn wave_reduce_tree_shape_is_fixed() {
    // The butterfly pairs lane i with lane i+offset, so the result is
    // ((a+c)+(b+d)) for four lanes, not ((a+b)+c)+d.
    let mut lanes = vec![1.0e16f64, 1.0, -1.0e16, 1.0];
    wave_reduce_sum(&mut lanes);
    assert_eq!(lanes[0], 2.0);
}

#[test]
fn group_reduce_matches_wave_for_small_groups() {
    let mut a: Vec<f32> = (0..32).map(|i| i as f32).collect();
    let mut b = a.clone();
    let r = group_reduce_sum(&mut a, 64);
    wave_reduce_sum(&mut b);
    assert_eq!(r, b[0]);
}

#[test]
fn group_reduce_spans_wavefronts() {
    for wavefront in [32usize, 64] {
        let mut lanes: Vec<f64> = (0..512).map(|i| (i % 7) as f64 * 0.25).collect();
        let expect: f64 = lanes.iter().sum();
        let got = group_reduce_sum(&mut lanes, wavefront);
        assert!((got - expect).abs() < 1e-9, "wavefront {wavefront}");
    }
}

#[test]
fn group_reduce_is_bitwise_reproducible() {
    let data: Vec<f32> = (0..256)
        .map(|i| ((i * 2654435761u64 as usize) % 1000) as f32 * 1.0e-3 + 0.1)
        .collect();
    let mut a = data.clone();
    let mut b = data.clone();
    let ra = group_reduce_sum(&mut a, 64);
    let rb = group_reduce_sum(&mut b, 64);
    assert_eq!(ra.to_bits(), rb.to_bits());
    // a different tree (32-wide waves) is allowed to differ, but must
    // still be internally reproducible
    let mut c = data.clone();
    let mut d = data;
    assert_eq!(
        group_reduce_sum(&mut c, 32).to_bits(),
        group_reduce_sum(&mut d, 32).to_bits()
    );
}

#[test]
fn complex_lanes_reduce() {
    let mut lanes: Vec<Complex32> = (0..64)
        .map(|i| Complex32::new(i as f32, -(i as f32)))
        .collect();
    let total = group_reduce_sum(&mut lanes, 64);
    assert_eq!(total, Complex32::new(2016.0, -2016.0));
}

#[test]
fn finalize_kernel_sums_partials_per_batch() {
    let ctx = DeviceContext::new();
    let q = reikna_device::Queue::new(&ctx);
    let batch_count = 3;
    let groups = 13u32;
    let data: Vec<f64> = (0..batch_count * groups as usize)
        .map(|i| i as f64)
        .collect();
    let ws = ctx.alloc_from(&data).unwrap();
    let out = ctx.alloc::<f64>(batch_count).unwrap();
    launch_reduction_finalize::<f64>(
        &q,
        256,
        2,
        64,
        groups,
        ws.slice(),
        out.slice(),
        batch_count as i32,
    )
    .unwrap();
    let got = out.to_vec();
    for b in 0..batch_count {
        let expect: f64 = data[b * 13..(b + 1) * 13].iter().sum();
        assert_eq!(got[b], expect, "batch {b}");
    }
}

#[test]
fn finalize_handles_single_partial() {
    let ctx = DeviceContext::new();
    let q = reikna_device::Queue::new(&ctx);
    let ws = ctx.alloc_from(&[42.0f32]).unwrap();
    let out = ctx.alloc::<f32>(1).unwrap();
    launch_reduction_finalize::<f32>(&q, 64, 4, 64, 1, ws.slice(), out.slice(), 1).unwrap();
    assert_eq!(out.to_vec(), vec![42.0]);
}
