//! # Chatter Core
//!
//! Domain types and traits for talking to large language models through one
//! vendor-neutral contract. This crate holds no vendor code: it defines the
//! message model, the structured prompt, the reply protocol, inference options,
//! the execution context and the [`Chatter`] trait that everything else
//! implements against.
//!
//! ## Design Philosophy
//!
//! Every seam is a trait here. Implementations live in their respective
//! crates:
//! - the generic encode/invoke/decode pipeline and the decorators live in
//!   `chatter-providers`
//! - vendor wire formats plug in through [`Encoder`], [`Service`] and
//!   [`Decoder`]

pub mod content;
pub mod context;
pub mod error;
pub mod message;
pub mod options;
pub mod prompt;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use content::{Content, InvokeContent, JsonContent};
pub use context::{CancelHandle, Context};
pub use error::{BoxError, ChatterError, ContextError, QuotaLimit, Result};
pub use message::{Answer, Message, Reply, Stage, Usage};
pub use options::{Command, Inferrer, Opt};
pub use prompt::{Prompt, Section, SectionKind, Snippet};
pub use provider::{Chatter, Decoder, Encoder, EncoderFactory, Service};
