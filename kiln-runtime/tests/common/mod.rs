//! Mock session and tokenizer shared by the runtime integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use kiln::session::names;
use kiln::{
    DType, Error, HostTensor, InferenceSession, Result, SessionConfig, SpecialTokens, TensorMap,
    Tokenizer,
};

pub const VOCAB: usize = 128;
/// Renders as the turn-end marker.
pub const END_ID: u32 = 7;
/// Renders as a newline.
pub const NEWLINE_ID: u32 = 10;
pub const EOS_ID: u32 = 99;

pub fn tiny_config() -> SessionConfig {
    SessionConfig {
        num_layers: 2,
        num_kv_heads: 1,
        head_dim: 4,
        cache_dtype: DType::F32,
    }
}

// ---------------------------------------------------------------------------
// MockTokenizer — deterministic, no vocabulary files needed
// ---------------------------------------------------------------------------

pub struct MockTokenizer {
    special: SpecialTokens,
}

impl MockTokenizer {
    pub fn new() -> Self {
        Self {
            special: SpecialTokens::phi3(vec![EOS_ID], None),
        }
    }
}

impl Tokenizer for MockTokenizer {
    fn encode(&self, text: &str, _add_bos: bool) -> Result<Vec<u32>> {
        // One token per word, ids are word indices + 1.
        Ok(text
            .split_whitespace()
            .enumerate()
            .map(|(i, _)| u32::try_from(i + 1).unwrap())
            .collect())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(ids
            .iter()
            .filter(|&&id| id != END_ID && id != EOS_ID)
            .map(|id| format!("tok{id}"))
            .collect::<Vec<_>>()
            .join(" "))
    }

    fn render_token(&self, id: u32) -> Result<String> {
        Ok(match id {
            END_ID => "<|end|>".to_string(),
            NEWLINE_ID => "\n".to_string(),
            EOS_ID => "<|endoftext|>".to_string(),
            other => format!("tok{other}"),
        })
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }
}

// ---------------------------------------------------------------------------
// ScriptedSession — picks token `script[call]`, grows the cache by the input
// ---------------------------------------------------------------------------

pub struct ScriptedSession {
    config: SessionConfig,
    script: Vec<u32>,
    fail_at: Option<usize>,
    calls: AtomicUsize,
    feeds: Mutex<Vec<TensorMap>>,
}

impl ScriptedSession {
    /// Invocation `i` selects `script[i]`; past the end, the last entry repeats.
    pub fn new(script: Vec<u32>) -> Self {
        assert!(!script.is_empty());
        Self {
            config: tiny_config(),
            script,
            fail_at: None,
            calls: AtomicUsize::new(0),
            feeds: Mutex::new(Vec::new()),
        }
    }

    /// Invocation `call` (0-based) fails.
    pub fn failing_at(mut self, call: usize) -> Self {
        self.fail_at = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Feeds received so far, in invocation order.
    pub fn feeds(&self) -> Vec<TensorMap> {
        self.feeds.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceSession for ScriptedSession {
    fn config(&self) -> SessionConfig {
        self.config.clone()
    }

    async fn run(&self, feeds: TensorMap) -> Result<TensorMap> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(call) {
            return Err(Error::SessionInvocation("backend crashed".into()));
        }

        let seq_len = feeds[names::INPUT_IDS].shape()[1];
        let past_len = feeds[&names::past_key(0)].shape()[2];
        let token = *self.script.get(call).unwrap_or(self.script.last().unwrap());

        let mut logits = vec![0.0_f32; seq_len * VOCAB];
        logits[(seq_len - 1) * VOCAB + token as usize] = 10.0;

        let mut outputs = TensorMap::new();
        outputs.insert(
            names::LOGITS.to_string(),
            HostTensor::from_f32(&[1, seq_len, VOCAB], &logits).unwrap(),
        );
        let shape = [
            1,
            self.config.num_kv_heads,
            past_len + seq_len,
            self.config.head_dim,
        ];
        for layer in 0..self.config.num_layers {
            outputs.insert(
                names::present_key(layer),
                HostTensor::zeros(&shape, self.config.cache_dtype),
            );
            outputs.insert(
                names::present_value(layer),
                HostTensor::zeros(&shape, self.config.cache_dtype),
            );
        }

        self.feeds.lock().unwrap().push(feeds);
        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// GatedSession — each invocation waits until released
// ---------------------------------------------------------------------------

pub struct GatedSession {
    pub inner: ScriptedSession,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedSession {
    pub fn new(script: Vec<u32>) -> Self {
        Self {
            inner: ScriptedSession::new(script),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl InferenceSession for GatedSession {
    fn config(&self) -> SessionConfig {
        self.inner.config()
    }

    async fn run(&self, feeds: TensorMap) -> Result<TensorMap> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.run(feeds).await
    }
}
