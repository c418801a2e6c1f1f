//! Options for text generation

/// Default turn-end marker for Phi-3 style chat models.
pub const DEFAULT_TURN_END_MARKER: &str = "<|end|>";

/// Options for text generation.
///
/// Controls the generation loop: how many tokens to produce and when to
/// stop. Decoding is always greedy.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Maximum number of new tokens, which is also the maximum number of
    /// session invocations.
    pub max_new_tokens: usize,
    /// Token ids that end generation. Empty means "fill from tokenizer".
    pub eos_token_ids: Vec<u32>,
    /// Generation also stops when the rendering of the selected token
    /// contains this string. `None` disables the check.
    pub turn_end_marker: Option<String>,
}

impl GenerateOptions {
    /// Whether `token_id` is in the EOS set.
    #[must_use]
    pub fn is_eos(&self, token_id: u32) -> bool {
        self.eos_token_ids.contains(&token_id)
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 64,
            eos_token_ids: Vec::new(),
            turn_end_marker: Some(DEFAULT_TURN_END_MARKER.to_string()),
        }
    }
}
