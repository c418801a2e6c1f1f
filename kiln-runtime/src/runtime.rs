//! Text-level chat runtime
//!
//! The [`Runtime`] wraps an [`Engine`], a [`Tokenizer`] and a
//! [`ChatTemplate`], providing a turns-in, reply-out interface.

use tracing::info;

use kiln::{
    CancelToken, ChatMessage, ChatTemplate, GenerateOptions, InferenceSession, Result,
    SessionFactory, Tokenizer,
};

use crate::engine::{Engine, FinishReason, Generation};
use crate::reply::{ReplyFilter, PHI3_JA_SYSTEM_PROMPT};

/// One assistant reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Decoded reply with special tokens dropped, passed through the
    /// runtime's [`ReplyFilter`].
    pub text: String,
    pub finish_reason: FinishReason,
    pub tokens: Vec<u32>,
}

/// Text-level runtime.
///
/// Combines a session (via Engine) with a tokenizer and chat template. Each
/// Runtime instance serves one model.
pub struct Runtime<S, T, C> {
    engine: Engine<S>,
    tokenizer: T,
    template: C,
    system_prompt: Option<String>,
    reply_filter: ReplyFilter,
}

impl<S, T, C> Runtime<S, T, C>
where
    S: InferenceSession,
    T: Tokenizer,
    C: ChatTemplate,
{
    /// Create a new runtime from a session, tokenizer and chat template.
    pub fn new(session: S, tokenizer: T, template: C) -> Self {
        Self {
            engine: Engine::new(session),
            tokenizer,
            template,
            system_prompt: None,
            reply_filter: ReplyFilter::default(),
        }
    }

    /// Create a session from loaded artifacts, then the runtime around it.
    ///
    /// # Errors
    /// Returns the factory's error if the session cannot be created.
    pub async fn from_artifacts<F>(
        factory: &F,
        graph: &[u8],
        external_weights: &[u8],
        tokenizer: T,
        template: C,
    ) -> Result<Self>
    where
        F: SessionFactory<Session = S>,
    {
        let session = factory.create(graph, external_weights).await?;
        info!(
            layers = session.config().num_layers,
            "inference session ready"
        );
        Ok(Self::new(session, tokenizer, template))
    }

    /// Prepend a system message to every conversation.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Post-process every chat reply with `filter`.
    #[must_use]
    pub fn with_reply_filter(mut self, filter: ReplyFilter) -> Self {
        self.reply_filter = filter;
        self
    }

    /// Short Japanese replies: the Phi-3 Japanese system prompt plus
    /// [`ReplyFilter::phi3_ja`].
    #[must_use]
    pub fn japanese_assistant(self) -> Self {
        self.with_system_prompt(PHI3_JA_SYSTEM_PROMPT)
            .with_reply_filter(ReplyFilter::phi3_ja())
    }

    /// Get a reference to the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    /// Get a reference to the tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    #[must_use]
    pub fn template(&self) -> &C {
        &self.template
    }

    /// Answer `user_message` given the prior turns in `history`.
    ///
    /// The prompt is the system prompt (if any), then `history`, then the new
    /// user turn, rendered by the chat template. Only the generated tokens
    /// are decoded, and the text then goes through the reply filter.
    ///
    /// # Errors
    /// Returns an error if tokenization or generation fails, or
    /// `Cancelled` if `cancel` fires.
    pub async fn chat(
        &self,
        history: &[ChatMessage],
        user_message: &str,
        options: &GenerateOptions,
        cancel: &CancelToken,
    ) -> Result<ChatReply> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(user_message));

        let prompt = self.template.apply(&messages);
        // The template already carries every marker the model expects.
        let input_ids = self.tokenizer.encode(&prompt, false)?;
        let generation = self.run(&input_ids, options, cancel).await?;
        let text = self.tokenizer.decode(&generation.tokens)?;

        Ok(ChatReply {
            text: self.reply_filter.apply(&text),
            finish_reason: generation.finish_reason,
            tokens: generation.tokens,
        })
    }

    /// Continue raw `prompt` text, without a chat template.
    ///
    /// # Returns
    /// The generated text only (not including the prompt).
    ///
    /// # Errors
    /// Returns an error if tokenization or generation fails.
    pub async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
        cancel: &CancelToken,
    ) -> Result<String> {
        let input_ids = self.tokenizer.encode(prompt, true)?;
        let generation = self.run(&input_ids, options, cancel).await?;
        self.tokenizer.decode(&generation.tokens)
    }

    async fn run(
        &self,
        input_ids: &[u32],
        options: &GenerateOptions,
        cancel: &CancelToken,
    ) -> Result<Generation> {
        let options = self.fill_eos(options);
        self.engine
            .generate(input_ids, &options, &self.tokenizer, cancel)
            .await
    }

    /// Clone options with the EOS set filled from the tokenizer if empty.
    fn fill_eos(&self, options: &GenerateOptions) -> GenerateOptions {
        let mut options = options.clone();
        if options.eos_token_ids.is_empty() {
            options.eos_token_ids = self.tokenizer.eos_token_ids();
        }
        options
    }
}
