//! Chat templates for converting turn history to model prompts
//!
//! The [`ChatTemplate`] trait converts a sequence of [`ChatMessage`]s into a
//! prompt string carrying the model's turn markers. The runtime encodes the
//! result with the tokenizer.

/// One conversational turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Role of the message sender (`"system"`, `"user"`, `"assistant"`).
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// Converts turn history into a prompt string for the model.
///
/// Implementations must end the prompt with the assistant's opening marker
/// so that generation continues as the assistant.
pub trait ChatTemplate: Send + Sync {
    /// Apply the template to a list of messages, producing a prompt string.
    fn apply(&self, messages: &[ChatMessage]) -> String;
}

impl ChatTemplate for Box<dyn ChatTemplate> {
    fn apply(&self, messages: &[ChatMessage]) -> String {
        (**self).apply(messages)
    }
}

/// A raw template that concatenates message contents without special tokens.
///
/// Useful for base (non-instruct) models and testing.
pub struct RawTemplate;

impl ChatTemplate for RawTemplate {
    fn apply(&self, messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Phi-3 instruct chat template.
///
/// Format:
/// ```text
/// <|system|>
/// {content}<|end|>
/// <|user|>
/// {content}<|end|>
/// <|assistant|>
/// ```
pub struct Phi3Template;

impl ChatTemplate for Phi3Template {
    fn apply(&self, messages: &[ChatMessage]) -> String {
        let mut prompt = String::new();
        for msg in messages {
            prompt.push_str("<|");
            prompt.push_str(&msg.role);
            prompt.push_str("|>\n");
            prompt.push_str(&msg.content);
            prompt.push_str("<|end|>\n");
        }
        prompt.push_str("<|assistant|>\n");
        prompt
    }
}
