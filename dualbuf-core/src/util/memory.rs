use bytemuck::Pod;

/// Returns the raw bytes of `values` as a byte slice, without copying.
///
/// ```
/// # use dualbuf_core::util::*;
/// let values: [u32; 2] = [1, 2];
/// assert_eq!(view_raw_bytes(&values).len(), 8);
/// ```
pub fn view_raw_bytes<T: Pod>(values: &[T]) -> &[u8] {
    bytemuck::cast_slice(values)
}

/// Returns the raw bytes of `values` as a mutable byte slice, without copying. Any byte pattern written
/// through the returned slice is a valid `T`.
///
/// ```
/// # use dualbuf_core::util::*;
/// let mut values: [u16; 2] = [0, 0];
/// view_raw_bytes_mut(&mut values).fill(0xFF);
/// assert_eq!(values, [u16::MAX, u16::MAX]);
/// ```
pub fn view_raw_bytes_mut<T: Pod>(values: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(values)
}

/// Size in bytes of `count` elements of type `T`, or `None` on overflow
///
/// ```
/// # use dualbuf_core::util::*;
/// assert_eq!(size_in_bytes_of::<u32>(3), Some(12));
/// assert_eq!(size_in_bytes_of::<u64>(usize::MAX), None);
/// ```
pub fn size_in_bytes_of<T>(count: usize) -> Option<usize> {
    count.checked_mul(std::mem::size_of::<T>())
}
