//! Tokenizer backed by a `tokenizer.json` file via the `tokenizers` crate

use std::path::Path;

use tokenizers::Tokenizer as HfTokenizer;

use super::{SpecialTokens, Tokenizer};
use crate::{Error, Result};

/// Wrapper around the `tokenizers` crate for Phi-3 style chat models
pub struct PretrainedTokenizer {
    tokenizer: HfTokenizer,
    special: SpecialTokens,
}

impl PretrainedTokenizer {
    /// Load a tokenizer from a directory containing tokenizer.json
    ///
    /// # Errors
    /// Returns an error if the tokenizer cannot be loaded
    pub fn from_pretrained(model_path: impl AsRef<Path>) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = model_path.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(Error::Tokenizer(format!(
                "No tokenizer.json found in {}",
                model_path.display()
            )));
        }
        Self::from_file(&tokenizer_path)
    }

    /// Load a tokenizer from a tokenizer.json file
    ///
    /// # Errors
    /// Returns an error if the file cannot be parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer =
            HfTokenizer::from_file(path.as_ref()).map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(Self::from_tokenizer(tokenizer))
    }

    /// Wrap an already-built tokenizer, resolving special token ids.
    #[must_use]
    pub fn from_tokenizer(tokenizer: HfTokenizer) -> Self {
        let bos_token_id = tokenizer
            .token_to_id("<s>")
            .or_else(|| tokenizer.token_to_id("<|endoftext|>"));

        let eos_token_ids = ["<|endoftext|>", "</s>"]
            .iter()
            .filter_map(|t| tokenizer.token_to_id(t))
            .collect();

        Self {
            tokenizer,
            special: SpecialTokens::phi3(eos_token_ids, bos_token_id),
        }
    }

    /// Get the vocabulary size
    #[must_use]
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

impl Tokenizer for PretrainedTokenizer {
    fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;

        let mut ids: Vec<u32> = encoding.get_ids().to_vec();
        if let (true, Some(bos)) = (add_bos, self.special.bos_token_id) {
            ids.insert(0, bos);
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }

    fn render_token(&self, id: u32) -> Result<String> {
        self.tokenizer
            .decode(&[id], false)
            .map_err(|e| Error::Tokenizer(e.to_string()))
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }
}
