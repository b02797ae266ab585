//! Content blocks carried by replies and tool answers.
//!
//! Content is a closed set of immutable values. Every block renders to a
//! deterministic text form; for [`Content::Text`] that rendering is the literal
//! payload.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single block of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text
    Text { text: String },

    /// Structured JSON payload
    Json(JsonContent),

    /// Numeric embedding vector
    Vector { floats: Vec<f32> },

    /// The model asks the caller to run an external command
    Invoke(InvokeContent),
}

impl Content {
    /// Create a plain text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an embedding vector block.
    pub fn vector(floats: Vec<f32>) -> Self {
        Self::Vector { floats }
    }

    /// Create a JSON block.
    pub fn json(
        id: impl Into<String>,
        source: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Self::Json(JsonContent::new(id, source, value))
    }

    /// Create a tool invocation block.
    pub fn invoke(name: impl Into<String>, args: JsonContent) -> Self {
        Self::Invoke(InvokeContent::new(name, args))
    }

    /// The text payload, if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// The embedding, if this is a vector block.
    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Self::Vector { floats } => Some(floats),
            _ => None,
        }
    }

    /// The invocation, if the model asked for a command.
    pub fn as_invoke(&self) -> Option<&InvokeContent> {
        match self {
            Self::Invoke(invoke) => Some(invoke),
            _ => None,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text { text } => f.write_str(text),
            Self::Json(json) => json.fmt(f),
            Self::Vector { floats } => {
                f.write_str("[")?;
                for (i, x) in floats.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{x}")?;
                }
                f.write_str("]")
            }
            Self::Invoke(invoke) => invoke.fmt(f),
        }
    }
}

/// A JSON object with its provenance.
///
/// `id` correlates a tool invocation with the answer produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonContent {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,

    #[serde(default)]
    pub value: serde_json::Value,
}

impl JsonContent {
    /// Create a JSON payload with its id and source.
    pub fn new(id: impl Into<String>, source: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            value,
        }
    }
}

impl fmt::Display for JsonContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A request from the model to execute a named command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeContent {
    /// Command name, as registered through [`Opt::Registry`](crate::Opt::Registry)
    pub name: String,

    /// Arguments; `args.id` is the invocation id assigned by the backend
    pub args: JsonContent,

    /// The vendor's own representation of the request, replayed verbatim by
    /// encoders that need it when the reply is sent back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,
}

impl InvokeContent {
    /// Create an invocation of `name` without a vendor message.
    pub fn new(name: impl Into<String>, args: JsonContent) -> Self {
        Self {
            name: name.into(),
            args,
            message: None,
        }
    }

    /// Attach the vendor's raw message.
    pub fn with_message(mut self, message: serde_json::Value) -> Self {
        self.message = Some(message);
        self
    }
}

impl fmt::Display for InvokeContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invoke @{}", self.name)
    }
}
