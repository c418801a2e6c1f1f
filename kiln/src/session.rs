//! Inference session trait
//!
//! Defines the invocation contract of the external inference backend. A
//! session consumes a map of named input tensors and returns a map of named
//! output tensors. The engine is generic over this trait, so it can be
//! driven by a real backend or by a mock in tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

use crate::dtype::DType;
use crate::tensor::HostTensor;
use crate::Result;

/// Named tensors passed to or returned from one invocation.
pub type TensorMap = HashMap<String, HostTensor>;

/// Tensor names used at the session boundary.
pub mod names {
    pub const INPUT_IDS: &str = "input_ids";
    pub const ATTENTION_MASK: &str = "attention_mask";
    pub const POSITION_IDS: &str = "position_ids";
    pub const LOGITS: &str = "logits";

    /// Input name of layer `layer`'s cached keys.
    #[must_use]
    pub fn past_key(layer: usize) -> String {
        format!("past_key_values.{layer}.key")
    }

    /// Input name of layer `layer`'s cached values.
    #[must_use]
    pub fn past_value(layer: usize) -> String {
        format!("past_key_values.{layer}.value")
    }

    /// Output name of layer `layer`'s updated keys.
    #[must_use]
    pub fn present_key(layer: usize) -> String {
        format!("present.{layer}.key")
    }

    /// Output name of layer `layer`'s updated values.
    #[must_use]
    pub fn present_value(layer: usize) -> String {
        format!("present.{layer}.value")
    }
}

/// Cache geometry the engine needs to build feeds.
///
/// Parsed from a JSON description of the exported graph.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Number of transformer layers (per-layer cache pairs)
    pub num_layers: usize,
    /// Number of key-value heads
    pub num_kv_heads: usize,
    /// Dimension of each attention head
    pub head_dim: usize,
    /// Element type of the per-layer cache tensors
    #[serde(default = "default_cache_dtype")]
    pub cache_dtype: DType,
}

fn default_cache_dtype() -> DType {
    DType::F16
}

impl SessionConfig {
    /// Geometry of the Phi-3 mini web export (q4f16).
    #[must_use]
    pub fn phi3_mini() -> Self {
        Self {
            num_layers: 32,
            num_kv_heads: 32,
            head_dim: 96,
            cache_dtype: DType::F16,
        }
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Shape of an empty cache placeholder: `[1, heads, 0, head_dim]`.
    #[must_use]
    pub fn empty_cache_shape(&self) -> [usize; 4] {
        [1, self.num_kv_heads, 0, self.head_dim]
    }
}

/// A stateful inference session.
///
/// Each call to [`InferenceSession::run`] is one invocation. The session
/// owns the growth of the cache's time dimension: it receives the previous
/// per-layer cache as inputs and returns the extended cache as outputs.
#[async_trait]
pub trait InferenceSession: Send + Sync {
    /// Cache geometry for feed construction.
    fn config(&self) -> SessionConfig;

    /// Run one invocation.
    ///
    /// # Errors
    /// Returns `SessionInvocation` if the backend rejects the feeds or fails.
    async fn run(&self, feeds: TensorMap) -> Result<TensorMap>;
}

/// Creates sessions from a serialized graph and its external weights.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: InferenceSession;

    /// Build a session. `external_weights` is the raw weights file the graph
    /// refers to by name.
    ///
    /// # Errors
    /// Returns `SessionInvocation` if the backend cannot load the graph.
    async fn create(&self, graph: &[u8], external_weights: &[u8]) -> Result<Self::Session>;
}
