//! Operand descriptors: one resolution rule for the three batched
//! calling conventions.
//!
//! A vector or matrix argument is {storage source, element offset,
//! increment (or leading dimension), batch stride}. The source is a trait
//! with a single method so the plain, pointer-array and strided-batched
//! conventions are interchangeable behind every kernel.

use reikna_device::DevSlice;

/// Per-batch storage resolution. Out-of-range batch indices are a caller
/// contract violation, checked only in debug builds.
pub trait BatchSource<T>: Send + Sync {
    fn resolve(&self, batch: usize) -> DevSlice<T>;
}

/// One buffer shared by every batch element.
pub struct Plain<T>(pub DevSlice<T>);

impl<T: Copy + Send + Sync> BatchSource<T> for Plain<T> {
    #[inline]
    fn resolve(&self, _batch: usize) -> DevSlice<T> {
        self.0
    }
}

/// One contiguous buffer holding `batch_count` replicas `stride`
/// elements apart.
pub struct Strided<T> {
    pub base: DevSlice<T>,
    pub stride: i64,
}

impl<T: Copy + Send + Sync> BatchSource<T> for Strided<T> {
    #[inline]
    fn resolve(&self, batch: usize) -> DevSlice<T> {
        let start = batch as i64 * self.stride;
        debug_assert!(start >= 0, "batch stride walked before the buffer");
        self.base
            .subslice(start as usize, self.base.len() - start as usize)
    }
}

/// One device buffer per batch element.
pub struct PtrArray<'a, T>(pub &'a [DevSlice<T>]);

impl<'a, T: Copy + Send + Sync> BatchSource<T> for PtrArray<'a, T> {
    #[inline]
    fn resolve(&self, batch: usize) -> DevSlice<T> {
        self.0[batch]
    }
}

/// A vector operand: source plus element offset and logical increment.
pub struct VecArg<'a, T> {
    pub src: &'a dyn BatchSource<T>,
    pub offset: i64,
    pub inc: i64,
}

impl<'a, T> Clone for VecArg<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Copy for VecArg<'a, T> {}

impl<'a, T: Copy> VecArg<'a, T> {
    pub fn new(src: &'a dyn BatchSource<T>, inc: i64) -> Self {
        Self { src, offset: 0, inc }
    }

    pub fn with_offset(src: &'a dyn BatchSource<T>, offset: i64, inc: i64) -> Self {
        Self { src, offset, inc }
    }

    /// Base offset adjusted so a negative increment indexes forward:
    /// logical element 0 of a reversed vector lives at the highest
    /// address touched.
    pub fn shift(&self, n: i64) -> i64 {
        if self.inc < 0 {
            self.offset - self.inc * (n - 1)
        } else {
            self.offset
        }
    }

    #[inline]
    pub fn resolve(&self, batch: usize) -> DevSlice<T> {
        self.src.resolve(batch)
    }
}

/// A matrix operand in column-major (or banded/packed) storage.
pub struct MatArg<'a, T> {
    pub src: &'a dyn BatchSource<T>,
    pub offset: i64,
    pub lda: i64,
}

impl<'a, T> Clone for MatArg<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Copy for MatArg<'a, T> {}

impl<'a, T: Copy> MatArg<'a, T> {
    pub fn new(src: &'a dyn BatchSource<T>, lda: i64) -> Self {
        Self { src, offset: 0, lda }
    }

    pub fn with_offset(src: &'a dyn BatchSource<T>, offset: i64, lda: i64) -> Self {
        Self { src, offset, lda }
    }

    #[inline]
    pub fn resolve(&self, batch: usize) -> DevSlice<T> {
        self.src.resolve(batch)
    }
}

/// Alpha/beta location: resolved once per batch element inside a kernel.
pub enum ScalarArg<T> {
    Host(T),
    Device { values: DevSlice<T>, stride: i64 },
}

impl<T> Clone for ScalarArg<T>
where
    T: Copy,
{
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: Copy> Copy for ScalarArg<T> {}

impl<T: Copy> ScalarArg<T> {
    #[inline]
    pub fn get(&self, batch: usize) -> T {
        match self {
            ScalarArg::Host(v) => *v,
            ScalarArg::Device { values, stride } => {
                values.get((batch as i64 * stride) as usize)
            }
        }
    }

    /// The value when it is host-resident and batch-invariant, for
    /// launcher-level short-circuits. Device-resident scalars are only
    /// inspected inside kernels.
    pub fn host_value(&self) -> Option<T> {
        match self {
            ScalarArg::Host(v) => Some(*v),
            ScalarArg::Device { .. } => None,
        }
    }
}

/// Where a reduction result lands. Host destinations block on the queue
/// before the copy-back; device destinations return at submission.
pub enum ResultDest<'a, T> {
    Host(&'a mut [T]),
    Device(DevSlice<T>),
}

/// Descriptor identity test used for the self-dot fast path: same
/// storage, same offset, same increment for every batch element.
pub fn same_vector<T: Copy>(x: &VecArg<T>, y: &VecArg<T>, batch_count: i32) -> bool {
    if x.offset != y.offset || x.inc != y.inc {
        return false;
    }
    let last = (batch_count.max(1) - 1) as usize;
    x.resolve(0).addr() == y.resolve(0).addr()
        && x.resolve(last).addr() == y.resolve(last).addr()
}

pub(crate) fn dev_to_host<T: Copy>(src: DevSlice<T>, dst: &mut [T]) {
    for (i, out) in dst.iter_mut().enumerate() {
        *out = src.get(i);
    }
}
