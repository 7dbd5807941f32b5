use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use bytemuck::Pod;

use crate::context::DeviceContext;
use crate::error::{DeviceError, DeviceResult};

/// An owned device allocation of `len` elements of `T`.
///
/// Memory is held behind a raw pointer rather than a borrowed slice:
/// kernels access it through [`DevSlice`] views while the buffer is
/// logically shared with the in-flight launch, exactly as device memory
/// behaves behind a real driver. Host access (`upload`/`download`) must
/// not overlap a launch that writes the same buffer; the ordered queue
/// makes that the natural calling pattern.
pub struct DeviceBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    ctx: Arc<DeviceContext>,
}

unsafe impl<T: Send> Send for DeviceBuffer<T> {}
unsafe impl<T: Sync> Sync for DeviceBuffer<T> {}

impl<T> core::fmt::Debug for DeviceBuffer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Pod> DeviceBuffer<T> {
    pub(crate) fn new_zeroed(ctx: Arc<DeviceContext>, len: usize) -> Self {
        let mut storage = vec![T::zeroed(); len].into_boxed_slice();
        let ptr = NonNull::new(storage.as_mut_ptr()).expect("boxed slice pointer");
        std::mem::forget(storage);
        Self { ptr, len, ctx }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> usize {
        self.len * std::mem::size_of::<T>()
    }

    /// Full view of the allocation.
    pub fn slice(&self) -> DevSlice<T> {
        DevSlice {
            ptr: self.ptr,
            len: self.len,
            _marker: PhantomData,
        }
    }

    pub fn upload(&mut self, src: &[T]) -> DeviceResult<()> {
        if src.len() != self.len {
            return Err(DeviceError::CopyExtents {
                src: src.len(),
                dst: self.len,
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr(), self.len);
        }
        Ok(())
    }

    pub fn download(&self, dst: &mut [T]) -> DeviceResult<()> {
        if dst.len() != self.len {
            return Err(DeviceError::CopyExtents {
                src: self.len,
                dst: dst.len(),
            });
        }
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), dst.as_mut_ptr(), self.len);
        }
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<T> {
        let mut out = vec![T::zeroed(); self.len];
        self.download(&mut out).expect("extents match");
        out
    }

    pub fn fill(&mut self, value: T) {
        let s = self.slice();
        for i in 0..self.len {
            s.set(i, value);
        }
    }
}

impl<T> Drop for DeviceBuffer<T> {
    fn drop(&mut self) {
        self.ctx
            .track_deallocation(self.len * std::mem::size_of::<T>());
        unsafe {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.ptr.as_ptr(),
                self.len,
            )));
        }
    }
}

/// An unowned view into device memory, the kernel-side handle to a buffer.
///
/// Copyable and freely shareable across cooperative groups. Writes are
/// racy by construction — the kernel contract is that concurrent groups
/// write disjoint locations, except through [`crate::AtomicAdd`]. Bounds
/// are checked in debug builds only, mirroring the undefined-behavior
/// boundary of out-of-range device addressing.
pub struct DevSlice<T> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for DevSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for DevSlice<T> {}

impl<T> core::fmt::Debug for DevSlice<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DevSlice")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

unsafe impl<T: Send> Send for DevSlice<T> {}
unsafe impl<T: Sync> Sync for DevSlice<T> {}

impl<T: Copy> DevSlice<T> {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address identity, used for operand aliasing detection.
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    #[inline]
    pub fn get(&self, i: usize) -> T {
        debug_assert!(i < self.len, "device read out of bounds: {i} >= {}", self.len);
        unsafe { self.ptr.as_ptr().add(i).read() }
    }

    #[inline]
    pub fn set(&self, i: usize, value: T) {
        debug_assert!(i < self.len, "device write out of bounds: {i} >= {}", self.len);
        unsafe { self.ptr.as_ptr().add(i).write(value) }
    }

    #[inline]
    pub(crate) fn raw(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Narrowed view of `len` elements starting at `start`.
    pub fn subslice(&self, start: usize, len: usize) -> DevSlice<T> {
        assert!(
            start + len <= self.len,
            "subslice {start}+{len} exceeds {}",
            self.len
        );
        DevSlice {
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(start)) },
            len,
            _marker: PhantomData,
        }
    }
}

impl<T: Pod> DevSlice<T> {
    /// Reinterpret the view as another element type of compatible
    /// alignment, preserving the byte extent.
    pub fn cast<U: Pod>(&self) -> DevSlice<U> {
        let bytes = self.len * std::mem::size_of::<T>();
        let addr = self.ptr.as_ptr() as usize;
        assert_eq!(addr % std::mem::align_of::<U>(), 0, "misaligned cast");
        assert_eq!(bytes % std::mem::size_of::<U>(), 0, "byte extent not divisible");
        DevSlice {
            ptr: unsafe { NonNull::new_unchecked(self.ptr.as_ptr() as *mut U) },
            len: bytes / std::mem::size_of::<U>(),
            _marker: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::context::DeviceContext;

    #[test]
    fn upload_download_roundtrip() {
        let ctx = DeviceContext::new();
        let data: Vec<f32> = (0..97).map(|i| i as f32).collect();
        let buf = ctx.alloc_from(&data).unwrap();
        assert_eq!(buf.to_vec(), data);
    }

    #[test]
    fn slice_get_set() {
        let ctx = DeviceContext::new();
        let buf = ctx.alloc::<f64>(8).unwrap();
        let s = buf.slice();
        s.set(3, 2.5);
        assert_eq!(s.get(3), 2.5);
        assert_eq!(s.get(0), 0.0);
    }

    #[test]
    fn subslice_and_cast() {
        let ctx = DeviceContext::new();
        let buf = ctx.alloc_from(&[1u64, 2, 3, 4]).unwrap();
        let tail = buf.slice().subslice(2, 2);
        assert_eq!(tail.get(0), 3);
        let words = buf.slice().cast::<u32>();
        assert_eq!(words.len(), 8);
    }

    #[test]
    fn extent_mismatch_is_an_error() {
        let ctx = DeviceContext::new();
        let mut buf = ctx.alloc::<f32>(4).unwrap();
        assert!(buf.upload(&[0.0; 3]).is_err());
    }
}
