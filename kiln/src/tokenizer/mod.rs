//! Tokenizer integration
//!
//! Defines the [`Tokenizer`] trait the runtime uses for text in/out, the
//! read-only [`SpecialTokens`] set, and a `tokenizers`-backed
//! implementation.

mod pretrained;

use crate::Result;

pub use pretrained::PretrainedTokenizer;

/// Special tokens of a chat model, loaded once and read-only thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialTokens {
    /// Ids that terminate generation.
    pub eos_token_ids: Vec<u32>,
    /// Beginning-of-sequence id, if the vocabulary has one.
    pub bos_token_id: Option<u32>,
    /// Marker that closes every turn (e.g. `<|end|>`).
    pub turn_end: String,
    /// Marker that opens the assistant's turn (e.g. `<|assistant|>`).
    pub assistant_start: String,
}

impl SpecialTokens {
    /// Phi-3 markers with the given EOS set.
    #[must_use]
    pub fn phi3(eos_token_ids: Vec<u32>, bos_token_id: Option<u32>) -> Self {
        Self {
            eos_token_ids,
            bos_token_id,
            turn_end: "<|end|>".into(),
            assistant_start: "<|assistant|>".into(),
        }
    }
}

/// Trait for tokenizers that convert between text and token IDs.
pub trait Tokenizer: Send + Sync {
    /// Encode text to token IDs.
    ///
    /// # Arguments
    /// * `text` - The text to encode
    /// * `add_bos` - Whether to prepend the beginning-of-sequence token
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>>;

    /// Decode token IDs to text, skipping special tokens.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Render a single token ID with special tokens kept verbatim.
    ///
    /// Used by the turn-end marker check, which must see `<|end|>` even
    /// though [`Tokenizer::decode`] would drop it.
    ///
    /// # Errors
    /// Returns an error if decoding fails.
    fn render_token(&self, id: u32) -> Result<String>;

    /// The model's special tokens.
    fn special_tokens(&self) -> &SpecialTokens;

    /// Ids that terminate generation.
    fn eos_token_ids(&self) -> Vec<u32> {
        self.special_tokens().eos_token_ids.clone()
    }
}
