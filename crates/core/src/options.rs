//! Inference options.
//!
//! Options travel with every `prompt()` call as a slice of [`Opt`]. The
//! pipeline folds them into an [`Inferrer`] before handing it to the encoder:
//! later keys overwrite earlier ones, and options an encoder has no use for
//! are simply ignored.

use serde::{Deserialize, Serialize};

/// An external command the model may ask the caller to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Name the model uses to request the command
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub about: String,

    /// JSON Schema of the arguments
    #[serde(default)]
    pub schema: serde_json::Value,
}

impl Command {
    /// Describe a command and its argument schema.
    pub fn new(name: impl Into<String>, about: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            schema,
        }
    }
}

/// A single per-call option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "opt", content = "value", rename_all = "snake_case")]
pub enum Opt {
    Temperature(f64),
    TopP(f64),
    TopK(f64),
    MaxTokens(u32),
    StopSequences(Vec<String>),
    Registry(Vec<Command>),

    /// Router selector; ignored by everything else
    Route(String),
}

/// Inference parameters accumulated from a list of options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inferrer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<Command>,
}

impl Inferrer {
    /// Fold options left to right.
    pub fn from_opts(opts: &[Opt]) -> Self {
        let mut inferrer = Self::default();
        for opt in opts {
            inferrer.apply(opt);
        }
        inferrer
    }

    /// Apply one option, overwriting any previous value of the same key.
    pub fn apply(&mut self, opt: &Opt) {
        match opt {
            Opt::Temperature(t) => self.temperature = Some(*t),
            Opt::TopP(p) => self.top_p = Some(*p),
            Opt::TopK(k) => self.top_k = Some(*k),
            Opt::MaxTokens(n) => self.max_tokens = Some(*n),
            Opt::StopSequences(seq) => self.stop_sequences = seq.clone(),
            Opt::Registry(commands) => self.commands = commands.clone(),
            Opt::Route(_) => {}
        }
    }
}
