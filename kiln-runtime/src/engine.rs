//! Token-level generation engine
//!
//! The [`Engine`] drives an [`InferenceSession`] through greedy incremental
//! decoding: one prefill invocation over the whole prompt, then one
//! invocation per accepted token. It is generic over any session
//! implementation.
//!
//! A session handle is stateful, so the engine runs at most one generation
//! at a time. A second call while one is active fails with
//! `GenerationInProgress` and leaves the active one untouched.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use kiln::session::names;
use kiln::{
    CancelToken, Error, GenerateOptions, InferenceSession, Logits, Result, SessionConfig,
    TensorMap, Tokenizer,
};

use crate::feed::{KvCache, SessionFeedBuilder};

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The selected token is in the EOS set.
    Eos,
    /// The selected token renders to text containing the turn-end marker.
    StopMarker,
    /// Reached the maximum number of new tokens.
    Length,
}

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Accepted tokens, excluding the prompt and the stop token.
    pub tokens: Vec<u32>,
    pub finish_reason: FinishReason,
    /// Number of session invocations made.
    pub steps: usize,
}

/// State owned by one in-flight generation.
struct GenerationState {
    sequence: Vec<u32>,
    prompt_len: usize,
    cache: Option<KvCache>,
    step: usize,
}

impl GenerationState {
    fn new(prompt: &[u32]) -> Self {
        Self {
            sequence: prompt.to_vec(),
            prompt_len: prompt.len(),
            cache: None,
            step: 0,
        }
    }

    fn accept(&mut self, token: u32, cache: KvCache) {
        self.sequence.push(token);
        self.cache = Some(cache);
        self.step += 1;
    }

    fn finish(mut self, finish_reason: FinishReason, steps: usize) -> Generation {
        Generation {
            tokens: self.sequence.split_off(self.prompt_len),
            finish_reason,
            steps,
        }
    }
}

/// Releases the single-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::GenerationInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Greedy generation engine over one session.
pub struct Engine<S> {
    session: S,
    feeds: SessionFeedBuilder,
    active: AtomicBool,
}

impl<S: InferenceSession> Engine<S> {
    /// Create an engine that owns `session`.
    pub fn new(session: S) -> Self {
        let feeds = SessionFeedBuilder::new(session.config());
        Self {
            session,
            feeds,
            active: AtomicBool::new(false),
        }
    }

    /// Get the session configuration.
    #[must_use]
    pub fn session_config(&self) -> &SessionConfig {
        self.feeds.config()
    }

    /// Get a reference to the session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Whether a generation is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Generate up to `options.max_new_tokens` tokens after `input_ids`.
    ///
    /// Each step selects the arg-max of the final position's logits. The
    /// token stops generation if it is in the EOS set, or if its rendering
    /// alone contains the turn-end marker; otherwise it is accepted and the
    /// session's per-layer outputs replace the cache.
    ///
    /// # Returns
    /// The accepted tokens (not including the prompt) and why generation
    /// stopped. Reaching the token budget is a normal finish.
    ///
    /// # Errors
    /// Returns `GenerationInProgress` if another generation is active,
    /// `Cancelled` if `cancel` fires, and the session's error if an
    /// invocation fails. No partial output is returned on error.
    pub async fn generate<T: Tokenizer + ?Sized>(
        &self,
        input_ids: &[u32],
        options: &GenerateOptions,
        tokenizer: &T,
        cancel: &CancelToken,
    ) -> Result<Generation> {
        let _flight = FlightGuard::acquire(&self.active)?;
        if input_ids.is_empty() {
            return Err(Error::InvalidShape("prompt has no tokens".into()));
        }

        let marker = options
            .turn_end_marker
            .as_deref()
            .filter(|m| !m.is_empty());
        let num_layers = self.feeds.config().num_layers;
        let mut state = GenerationState::new(input_ids);

        loop {
            if state.step >= options.max_new_tokens {
                let steps = state.step;
                return Ok(finished(state, FinishReason::Length, steps));
            }
            cancel.check()?;

            let feeds = match &state.cache {
                None => self.feeds.prefill(&state.sequence)?,
                Some(cache) => self.feeds.decode(&state.sequence, cache)?,
            };
            let mut outputs = self.invoke(feeds, cancel).await?;

            let logits = outputs
                .get(names::LOGITS)
                .ok_or_else(|| Error::SessionInvocation("session returned no `logits`".into()))?;
            let next = Logits::last_position(logits)?.argmax();
            debug!(step = state.step, token = next, "selected token");

            if options.is_eos(next) {
                let steps = state.step + 1;
                return Ok(finished(state, FinishReason::Eos, steps));
            }
            if let Some(marker) = marker {
                if tokenizer.render_token(next)?.contains(marker) {
                    let steps = state.step + 1;
                    return Ok(finished(state, FinishReason::StopMarker, steps));
                }
            }

            let cache = KvCache::from_outputs(&mut outputs, num_layers)?;
            state.accept(next, cache);
        }
    }

    /// One session invocation, abandoned if `cancel` fires first.
    async fn invoke(&self, feeds: TensorMap, cancel: &CancelToken) -> Result<TensorMap> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            outputs = self.session.run(feeds) => outputs,
        }
    }
}

fn finished(state: GenerationState, reason: FinishReason, steps: usize) -> Generation {
    let generation = state.finish(reason, steps);
    info!(
        tokens = generation.tokens.len(),
        steps,
        reason = ?reason,
        "generation finished"
    );
    generation
}
