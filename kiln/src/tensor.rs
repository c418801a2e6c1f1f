//! Host-resident tensors exchanged with an inference session.

use std::sync::Arc;

use half::f16;

use crate::dtype::DType;
use crate::{Error, Result};

/// A host tensor backed by shared byte storage.
///
/// Uses `Arc<Vec<u8>>` so that carrying a per-layer cache entry from one
/// step's outputs into the next step's inputs never copies the payload.
/// Data is little-endian.
#[derive(Clone, Debug)]
pub struct HostTensor {
    data: Arc<Vec<u8>>,
    shape: Vec<usize>,
    dtype: DType,
}

impl HostTensor {
    /// Create a tensor from an f32 slice.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `data` does not hold `shape.product()` elements.
    pub fn from_f32(shape: &[usize], data: &[f32]) -> Result<Self> {
        check_numel(shape, data.len())?;
        Ok(Self::from_raw(
            shape,
            DType::F32,
            bytemuck::cast_slice(data).to_vec(),
        ))
    }

    /// Create a tensor from an f16 slice.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `data` does not hold `shape.product()` elements.
    pub fn from_f16(shape: &[usize], data: &[f16]) -> Result<Self> {
        check_numel(shape, data.len())?;
        Ok(Self::from_raw(
            shape,
            DType::F16,
            bytemuck::cast_slice(data).to_vec(),
        ))
    }

    /// Create a tensor from an i64 slice.
    ///
    /// # Errors
    /// Returns `InvalidShape` if `data` does not hold `shape.product()` elements.
    pub fn from_i64(shape: &[usize], data: &[i64]) -> Result<Self> {
        check_numel(shape, data.len())?;
        Ok(Self::from_raw(
            shape,
            DType::I64,
            bytemuck::cast_slice(data).to_vec(),
        ))
    }

    /// Create a tensor from raw bytes with a given dtype.
    ///
    /// The caller is responsible for `data.len()` matching the shape.
    #[must_use]
    pub fn from_raw(shape: &[usize], dtype: DType, data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            shape: shape.to_vec(),
            dtype,
        }
    }

    /// Create a zero-filled tensor. A zero extent in `shape` yields an
    /// empty placeholder, e.g. `[1, heads, 0, head_dim]`.
    #[must_use]
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let numel: usize = shape.iter().product();
        Self::from_raw(shape, dtype, vec![0u8; numel * dtype.size_in_bytes()])
    }

    /// Returns the shape of the tensor
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the data type of tensor elements
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Returns the total number of elements in the tensor
    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns the number of dimensions (rank) of the tensor
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the raw little-endian bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// True when both tensors share the same backing allocation.
    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Read the elements as f32, widening f16 data.
    ///
    /// # Errors
    /// Returns `DtypeMismatch` for integer tensors and `InvalidShape` if the
    /// byte length does not match the shape.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        self.check_byte_len()?;
        match self.dtype {
            DType::F32 => Ok(self
                .data
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()),
            DType::F16 => Ok(self
                .data
                .chunks_exact(2)
                .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
                .collect()),
            DType::I64 => Err(Error::DtypeMismatch {
                expected: "f32 or f16".into(),
                got: self.dtype.to_string(),
            }),
        }
    }

    /// Read the elements as i64.
    ///
    /// # Errors
    /// Returns `DtypeMismatch` for floating-point tensors and `InvalidShape`
    /// if the byte length does not match the shape.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        if self.dtype != DType::I64 {
            return Err(Error::DtypeMismatch {
                expected: DType::I64.to_string(),
                got: self.dtype.to_string(),
            });
        }
        self.check_byte_len()?;
        Ok(self
            .data
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    /// Tensors built with [`Self::from_raw`] are not checked on construction.
    fn check_byte_len(&self) -> Result<()> {
        let expected = self.numel() * self.dtype.size_in_bytes();
        if self.data.len() == expected {
            Ok(())
        } else {
            Err(Error::InvalidShape(format!(
                "{} tensor {:?} needs {expected} bytes, holds {}",
                self.dtype,
                self.shape,
                self.data.len()
            )))
        }
    }
}

fn check_numel(shape: &[usize], len: usize) -> Result<()> {
    let numel: usize = shape.iter().product();
    if numel == len {
        Ok(())
    } else {
        Err(Error::InvalidShape(format!(
            "shape {shape:?} needs {numel} elements, got {len}"
        )))
    }
}
