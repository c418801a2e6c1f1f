//! Next-token scores taken from a session's `logits` output.
//!
//! The session returns scores for every input position. Only the final
//! position matters for choosing the next token, so [`Logits`] keeps just
//! that row.

use crate::tensor::HostTensor;
use crate::{Error, Result};

/// Scores for the final position of one invocation.
#[derive(Debug, Clone)]
pub struct Logits {
    row: Vec<f32>,
}

impl Logits {
    /// Extract the last row of a `[.., seq_len, vocab_size]` logits tensor.
    ///
    /// # Errors
    /// Returns `InvalidShape` for a rank-0 or empty tensor or one whose
    /// buffer is shorter than its shape, and `DtypeMismatch` for integer data.
    pub fn last_position(tensor: &HostTensor) -> Result<Self> {
        let vocab_size = *tensor
            .shape()
            .last()
            .ok_or_else(|| Error::InvalidShape("logits tensor has rank 0".into()))?;
        if vocab_size == 0 || tensor.numel() == 0 {
            return Err(Error::InvalidShape(format!(
                "logits tensor {:?} is empty",
                tensor.shape()
            )));
        }
        let mut data = tensor.to_f32_vec()?;
        let Some(start) = data.len().checked_sub(vocab_size) else {
            return Err(Error::InvalidShape(format!(
                "logits tensor {:?} holds {} scores, fewer than one row",
                tensor.shape(),
                data.len()
            )));
        };
        Ok(Self {
            row: data.split_off(start),
        })
    }

    /// Build directly from one row of scores.
    #[must_use]
    pub fn from_row(row: Vec<f32>) -> Self {
        Self { row }
    }

    /// Vocabulary size (number of scores).
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.row.len()
    }

    /// Greedy: the index of the strictly highest score.
    ///
    /// Ties resolve to the lowest index; NaN never wins.
    #[must_use]
    pub fn argmax(&self) -> u32 {
        let mut max_idx = 0u32;
        let mut max_val = f32::NEG_INFINITY;
        #[allow(clippy::cast_possible_truncation)]
        for (i, &v) in self.row.iter().enumerate() {
            if v > max_val {
                max_val = v;
                max_idx = i as u32;
            }
        }
        max_idx
    }
}
