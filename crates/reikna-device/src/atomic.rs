use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::buffer::DevSlice;

/// Hardware-style atomic floating-point accumulation into device memory.
///
/// This is the one sanctioned way for multiple cooperative groups to write
/// the same location within a launch. Addition is associative and
/// commutative only up to rounding, so kernels built on it are documented
/// as numerically non-deterministic run to run.
pub trait AtomicAdd: Copy {
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self);
}

impl AtomicAdd for f32 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        debug_assert!(i < dst.len());
        // Same-layout reinterpretation of the device word as an atomic cell.
        let cell = unsafe { &*(dst.raw().add(i) as *const AtomicU32) };
        let mut cur = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(cur) + value).to_bits();
            match cell.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => cur = seen,
            }
        }
    }
}

impl AtomicAdd for f64 {
    #[inline]
    fn atomic_add(dst: &DevSlice<Self>, i: usize, value: Self) {
        debug_assert!(i < dst.len());
        let cell = unsafe { &*(dst.raw().add(i) as *const AtomicU64) };
        let mut cur = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + value).to_bits();
            match cell.compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(seen) => cur = seen,
            }
        }
    }
}
