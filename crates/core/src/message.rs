//! Message model and the reply protocol.
//!
//! A conversation is an ordered `Vec<Message>` held by the caller. Every layer
//! preserves that order verbatim; the library never owns history.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

use crate::content::{Content, InvokeContent, JsonContent};
use crate::prompt::Prompt;

/// A single turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Message {
    /// System-level behavioral constraint ("act as ...")
    Stratum(String),

    /// Bare user turn
    Text(String),

    /// Structured user turn
    Prompt(Prompt),

    /// Model turn
    Reply(Reply),

    /// Results of external commands requested by a preceding reply
    Answer(Answer),
}

impl Message {
    /// System-level instruction turn.
    pub fn stratum(text: impl Into<String>) -> Self {
        Self::Stratum(text.into())
    }

    /// Bare user turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stratum(text) | Self::Text(text) => f.write_str(text),
            Self::Prompt(prompt) => prompt.fmt(f),
            Self::Reply(reply) => reply.fmt(f),
            Self::Answer(answer) => answer.fmt(f),
        }
    }
}

impl From<Prompt> for Message {
    fn from(prompt: Prompt) -> Self {
        Self::Prompt(prompt)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Self::Reply(reply)
    }
}

impl From<Answer> for Message {
    fn from(answer: Answer) -> Self {
        Self::Answer(answer)
    }
}

/// Outcome classifier of a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Complete answer
    #[default]
    Return,

    /// Answer truncated by the token quota or a stop sequence
    Incomplete,

    /// The model requests execution of external commands
    Invoke,

    /// The backend aborted the exchange
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Return => "return",
            Self::Incomplete => "incomplete",
            Self::Invoke => "invoke",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub reply_tokens: u64,
}

impl Usage {
    /// Counters for a single call.
    pub fn new(input_tokens: u64, reply_tokens: u64) -> Self {
        Self {
            input_tokens,
            reply_tokens,
        }
    }

    /// Input and reply tokens together.
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.reply_tokens)
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            reply_tokens: self.reply_tokens.saturating_add(rhs.reply_tokens),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

/// The model turn, as produced by a decoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub stage: Stage,

    /// Tokens consumed by the single call that produced this reply
    #[serde(default)]
    pub usage: Usage,

    #[serde(default)]
    pub content: Vec<Content>,
}

impl Reply {
    /// A completed reply carrying a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            stage: Stage::Return,
            usage: Usage::default(),
            content: vec![Content::text(text)],
        }
    }

    /// Attach the usage of the call that produced the reply.
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// Every tool invocation requested by the reply, in order.
    pub fn invocations(&self) -> impl Iterator<Item = &InvokeContent> {
        self.content.iter().filter_map(Content::as_invoke)
    }

    /// Run the requested commands and pack their results as an [`Answer`].
    ///
    /// `executor` receives the command name and its JSON arguments. It is
    /// called once per invocation, in order; the first failure is returned
    /// unchanged. For any stage other than [`Stage::Invoke`] this is a no-op
    /// yielding an empty answer.
    pub fn invoke<F, E>(&self, mut executor: F) -> std::result::Result<Answer, E>
    where
        F: FnMut(&str, &serde_json::Value) -> std::result::Result<serde_json::Value, E>,
    {
        if self.stage != Stage::Invoke {
            return Ok(Answer::default());
        }

        let mut answer = Answer::default();
        for invoke in self.invocations() {
            let value = executor(&invoke.name, &invoke.args.value)?;
            answer.yielded.push(JsonContent {
                id: invoke.args.id.clone(),
                source: invoke.name.clone(),
                value,
            });
        }

        Ok(answer)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for text in self.content.iter().filter_map(Content::as_text) {
            f.write_str(text)?;
        }
        Ok(())
    }
}

/// Results of external commands, keyed by the originating invocation id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub yielded: Vec<JsonContent>,
}

impl Answer {
    /// Whether no command result was collected.
    pub fn is_empty(&self) -> bool {
        self.yielded.is_empty()
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, json) in self.yielded.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}: {}", json.source, json.value)?;
        }
        Ok(())
    }
}
