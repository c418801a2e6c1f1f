//! Kiln Runtime: text-in, text-out generation over an inference session
//!
//! This crate provides the [`Engine`] (token-level) and [`Runtime`]
//! (text-level) abstractions.
//!
//! # Architecture
//!
//! ```text
//! Runtime<S, T, C>        ← chat turns in, reply text out (owns Engine + Tokenizer + ChatTemplate)
//!   ├── ReplyFilter       ← cleans decoded reply text
//!   └── Engine<S>         ← tokens in, tokens out (greedy, single-flight)
//!         ├── SessionFeedBuilder  ← named input tensors per step
//!         ├── KvCache             ← per-layer cache, indexed by layer
//!         └── S: InferenceSession ← one invocation per step
//! ```

mod engine;
mod feed;
mod reply;
mod runtime;

pub use engine::{Engine, FinishReason, Generation};
pub use feed::{KvCache, LayerCache, SessionFeedBuilder};
pub use reply::{ReplyFilter, PHI3_JA_FALLBACK_REPLY, PHI3_JA_SYSTEM_PROMPT};
pub use runtime::{ChatReply, Runtime};
