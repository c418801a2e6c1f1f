//! Post-processing of decoded assistant text
//!
//! Small instruction-tuned models tend to echo their training format: numbered
//! `指示N:` labels and follow-up "instructions" after a blank line. A
//! [`ReplyFilter`] removes that noise and can cut the reply down to its first
//! sentence.

/// System prompt for short Japanese replies from Phi-3 mini.
pub const PHI3_JA_SYSTEM_PROMPT: &str = "You are a friendly Japanese chat assistant. \
Always reply in Japanese only. \
Answer briefly (1–2 sentences). \
Do NOT explain your task or output patterns like『指示1』『指示2』.";

/// Returned when filtering leaves nothing.
pub const PHI3_JA_FALLBACK_REPLY: &str = "申し訳ありませんが、応答の生成に失敗しました。";

const LABEL: &str = "指示";
const TRAILING_LABEL: &str = "\n\n指示";

/// Cleans decoded reply text.
///
/// The default filter only trims surrounding whitespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyFilter {
    strip_instruction_labels: bool,
    first_sentence_only: bool,
    fallback: Option<String>,
}

impl ReplyFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step enabled, with [`PHI3_JA_FALLBACK_REPLY`] as the fallback.
    #[must_use]
    pub fn phi3_ja() -> Self {
        Self::new()
            .strip_instruction_labels()
            .first_sentence_only()
            .with_fallback(PHI3_JA_FALLBACK_REPLY)
    }

    /// Drop `指示N:` / `指示N：` labels, and everything from a blank line
    /// followed by `指示N` onwards.
    #[must_use]
    pub fn strip_instruction_labels(mut self) -> Self {
        self.strip_instruction_labels = true;
        self
    }

    /// Keep only the first non-blank segment split on `。` or a newline.
    #[must_use]
    pub fn first_sentence_only(mut self) -> Self {
        self.first_sentence_only = true;
        self
    }

    /// Text to return instead of an empty reply.
    #[must_use]
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(text.into());
        self
    }

    /// Apply the enabled steps, in order, then trim.
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        let mut text = text.to_string();
        if self.strip_instruction_labels {
            text = strip_labels(&text);
            text.truncate(trailing_instructions_start(&text));
        }
        let mut reply = if self.first_sentence_only {
            first_sentence(&text).trim().to_string()
        } else {
            text.trim().to_string()
        };
        if reply.is_empty() {
            if let Some(fallback) = &self.fallback {
                reply.clone_from(fallback);
            }
        }
        reply
    }
}

/// Length of the ASCII digit run at the start of `s`.
fn leading_digits(s: &str) -> usize {
    s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len()
}

/// Remove every `指示<digits>` immediately followed by `:` or `：`.
fn strip_labels(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(LABEL) {
        let after = &rest[pos + LABEL.len()..];
        let digits = leading_digits(after);
        let colon = after[digits..]
            .chars()
            .next()
            .filter(|c| matches!(c, ':' | '：'));
        match colon {
            Some(c) if digits > 0 => {
                out.push_str(&rest[..pos]);
                rest = &after[digits + c.len_utf8()..];
            }
            _ => {
                out.push_str(&rest[..pos + LABEL.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset of the first `\n\n指示<digits>`, or `text.len()`.
fn trailing_instructions_start(text: &str) -> usize {
    let mut from = 0;
    while let Some(pos) = text[from..].find(TRAILING_LABEL) {
        let start = from + pos;
        let after = start + TRAILING_LABEL.len();
        if leading_digits(&text[after..]) > 0 {
            return start;
        }
        from = after;
    }
    text.len()
}

/// First segment with visible content, or the whole text if there is none.
fn first_sentence(text: &str) -> &str {
    text.split(['。', '\n'])
        .find(|s| !s.trim().is_empty())
        .unwrap_or(text)
}
