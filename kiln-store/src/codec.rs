//! Splitting byte buffers into fixed-size chunks and joining them back.

use kiln::{Error, Result};

/// Split `bytes` into consecutive slices of at most `chunk_size` bytes.
///
/// Slice `i` covers `[i * chunk_size, min((i + 1) * chunk_size, len))`.
/// An empty input yields no slices.
///
/// # Errors
/// Returns `InvalidConfig` if `chunk_size` is zero.
pub fn split(bytes: &[u8], chunk_size: usize) -> Result<Vec<&[u8]>> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk size must be at least 1".into()));
    }
    Ok(bytes.chunks(chunk_size).collect())
}

/// Number of chunks `split` produces for `total_size` bytes.
///
/// Zero for a zero `chunk_size`, which `split` rejects.
#[must_use]
pub fn chunk_count(total_size: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    total_size.div_ceil(chunk_size)
}

/// Reassemble a buffer of exactly `total_size` bytes from ordered slices.
///
/// # Errors
/// Returns `SizeMismatch` if the slice lengths do not sum to `total_size`.
pub fn join<B: AsRef<[u8]>>(slices: &[B], total_size: usize) -> Result<Vec<u8>> {
    let got: usize = slices.iter().map(|s| s.as_ref().len()).sum();
    if got != total_size {
        return Err(Error::SizeMismatch {
            expected: total_size,
            got,
        });
    }
    let mut buffer = vec![0u8; total_size];
    let mut offset = 0;
    for slice in slices {
        let slice = slice.as_ref();
        buffer[offset..offset + slice.len()].copy_from_slice(slice);
        offset += slice.len();
    }
    Ok(buffer)
}
