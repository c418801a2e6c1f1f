//! Kiln: incremental-decoding inference over an external session
//!
//! This crate provides the core types and traits shared by the artifact
//! store and the generation runtime. The inference backend and the
//! tokenizer are collaborators behind the [`InferenceSession`] and
//! [`Tokenizer`] traits.

pub mod cancel;
pub mod chat_template;
pub mod dtype;
pub mod error;
pub mod logits;
pub mod options;
pub mod session;
pub mod tensor;
pub mod tokenizer;

pub use cancel::CancelToken;
pub use chat_template::{ChatMessage, ChatTemplate, Phi3Template, RawTemplate};
pub use dtype::DType;
pub use error::{Error, FetchFailure, Result};
pub use logits::Logits;
pub use options::GenerateOptions;
pub use session::{InferenceSession, SessionConfig, SessionFactory, TensorMap};
pub use tensor::HostTensor;
pub use tokenizer::{PretrainedTokenizer, SpecialTokens, Tokenizer};
