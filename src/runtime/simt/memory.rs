//! Device memory views and the scratch arena

use std::marker::PhantomData;

use bytemuck::Pod;

use crate::error::{Error, Result};

/// Read-only view of device memory
///
/// Shared by every thread of a launch. Reads are bounds-checked; an
/// out-of-range read is a device fault.
pub struct DeviceSlice<'a, T> {
    ptr: *const T,
    len: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<T> Clone for DeviceSlice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceSlice<'_, T> {}

// SAFETY: a DeviceSlice only hands out copies of `T` read through a shared
// borrow, exactly like `&[T]`.
unsafe impl<T: Sync> Send for DeviceSlice<'_, T> {}
unsafe impl<T: Sync> Sync for DeviceSlice<'_, T> {}

impl<'a, T: Copy> DeviceSlice<'a, T> {
    /// View a host slice as device memory
    #[inline]
    pub fn new(data: &'a [T]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// View a single value as device memory
    #[inline]
    pub fn scalar(value: &'a T) -> Self {
        Self::new(std::slice::from_ref(value))
    }

    /// Build a view from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` elements for `'a`, and the
    /// memory must not be written during that time.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *const T, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Build a view of memory whose extent is only known to the caller.
    ///
    /// # Safety
    ///
    /// Every element a kernel reads through the view must be valid for
    /// reads for `'a`.
    #[inline]
    pub unsafe fn from_raw_unbounded(ptr: *const T) -> Self {
        // SAFETY: forwarded to the caller
        unsafe { Self::from_raw_parts(ptr, unbounded_len::<T>()) }
    }

    /// Number of elements covered by the view
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the view
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Load element `idx`
    #[inline]
    #[track_caller]
    pub fn load(&self, idx: usize) -> T {
        assert!(
            idx < self.len,
            "device read out of bounds: index {idx}, length {}",
            self.len
        );
        // SAFETY: idx < len and the view covers len readable elements for 'a
        unsafe { *self.ptr.add(idx) }
    }
}

/// Writable view of device memory
///
/// Every thread of a launch sees the same view, so accesses are `unsafe`: the
/// kernel guarantees that no two threads touch the same element within one
/// phase unless they only read it.
pub struct DeviceSliceMut<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

impl<T> Clone for DeviceSliceMut<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DeviceSliceMut<'_, T> {}

// SAFETY: all element access goes through the unsafe load/store below, whose
// contract forbids data races between threads.
unsafe impl<T: Send> Send for DeviceSliceMut<'_, T> {}
unsafe impl<T: Send> Sync for DeviceSliceMut<'_, T> {}

impl<'a, T: Copy> DeviceSliceMut<'a, T> {
    /// View a mutable host slice as device memory
    #[inline]
    pub fn new(data: &'a mut [T]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// View a single value as device memory
    #[inline]
    pub fn scalar(value: &'a mut T) -> Self {
        Self::new(std::slice::from_mut(value))
    }

    /// Build a view from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` elements for `'a`,
    /// and nothing outside the launch may access the memory during that time.
    #[inline]
    pub unsafe fn from_raw_parts(ptr: *mut T, len: usize) -> Self {
        Self {
            ptr,
            len,
            _marker: PhantomData,
        }
    }

    /// Build a view of memory whose extent is only known to the caller.
    ///
    /// # Safety
    ///
    /// Every element a kernel touches through the view must be valid for
    /// reads and writes for `'a`.
    #[inline]
    pub unsafe fn from_raw_unbounded(ptr: *mut T) -> Self {
        // SAFETY: forwarded to the caller
        unsafe { Self::from_raw_parts(ptr, unbounded_len::<T>()) }
    }

    /// Number of elements covered by the view
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the view
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.ptr
    }

    /// Read-only view of the same memory
    #[inline]
    pub fn as_const(&self) -> DeviceSlice<'a, T> {
        DeviceSlice {
            ptr: self.ptr,
            len: self.len,
            _marker: PhantomData,
        }
    }

    /// Load element `idx`.
    ///
    /// # Safety
    ///
    /// No other thread may store to `idx` in the same phase.
    #[inline]
    #[track_caller]
    pub unsafe fn load(&self, idx: usize) -> T {
        assert!(
            idx < self.len,
            "device read out of bounds: index {idx}, length {}",
            self.len
        );
        // SAFETY: in bounds; the caller excludes concurrent stores
        unsafe { *self.ptr.add(idx) }
    }

    /// Store `value` at element `idx`.
    ///
    /// # Safety
    ///
    /// No other thread may access `idx` in the same phase.
    #[inline]
    #[track_caller]
    pub unsafe fn store(&self, idx: usize, value: T) {
        assert!(
            idx < self.len,
            "device write out of bounds: index {idx}, length {}",
            self.len
        );
        // SAFETY: in bounds; the caller excludes concurrent access
        unsafe { *self.ptr.add(idx) = value }
    }
}

#[inline]
fn unbounded_len<T>() -> usize {
    isize::MAX as usize / std::mem::size_of::<T>().max(1)
}

/// Scratch arena owned by a handle
///
/// Primitives that need temporary device memory (the partial sums of `doti`)
/// borrow it for the duration of one call. The arena never grows: a request
/// that does not fit fails with [`Error::OutOfMemory`].
pub struct Scratch {
    words: Vec<u64>,
}

impl Scratch {
    /// Allocate an arena of at least `bytes` bytes
    pub fn new(bytes: usize) -> Self {
        Self {
            words: vec![0u64; bytes.div_ceil(8)],
        }
    }

    /// Capacity in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.words.len() * 8
    }

    /// Borrow the first `len` elements of the arena as `T`
    pub fn typed<T: Pod>(&mut self, len: usize) -> Result<&mut [T]> {
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .ok_or(Error::OutOfMemory { size: usize::MAX })?;
        if bytes > self.size_bytes() {
            return Err(Error::OutOfMemory { size: bytes });
        }
        let all: &mut [T] = bytemuck::try_cast_slice_mut(&mut self.words)
            .map_err(|e| Error::Internal(format!("scratch arena cast: {e}")))?;
        Ok(&mut all[..len])
    }
}

impl std::fmt::Debug for Scratch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scratch")
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_slice_load() {
        let data = [1.0f32, 2.0, 3.0];
        let view = DeviceSlice::new(&data);
        assert_eq!(view.len(), 3);
        assert_eq!(view.load(2), 3.0);
    }

    #[test]
    #[should_panic(expected = "device read out of bounds")]
    fn test_device_slice_out_of_bounds() {
        let data = [1.0f64];
        DeviceSlice::new(&data).load(1);
    }

    #[test]
    fn test_device_slice_mut_store() {
        let mut data = [0i32; 4];
        {
            let view = DeviceSliceMut::new(&mut data);
            for i in 0..4 {
                unsafe { view.store(i, i as i32 * 10) };
            }
            assert_eq!(view.as_const().load(3), 30);
        }
        assert_eq!(data, [0, 10, 20, 30]);
    }

    #[test]
    fn test_scratch_typed() {
        let mut scratch = Scratch::new(100);
        assert_eq!(scratch.size_bytes(), 104);
        let buf: &mut [f64] = scratch.typed(13).unwrap();
        assert_eq!(buf.len(), 13);
        buf[12] = 1.5;
        let buf: &mut [f32] = scratch.typed(26).unwrap();
        assert_eq!(buf.len(), 26);
    }

    #[test]
    fn test_scratch_exhausted() {
        let mut scratch = Scratch::new(64);
        assert!(matches!(
            scratch.typed::<f64>(9),
            Err(Error::OutOfMemory { size: 72 })
        ));
    }
}
