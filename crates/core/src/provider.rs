//! The Chatter contract and the collaborator traits of the provider pipeline.
//!
//! `Chatter` is the single call contract every consumer sees. The generic
//! pipeline and every decorator implement it, so they stack in any order.
//!
//! The pipeline itself is written once against three narrow collaborators
//! that a vendor integration supplies:
//! - [`Encoder`]: folds options and messages into a vendor request value
//! - [`Service`]: performs the network call
//! - [`Decoder`]: turns the vendor response value into a [`Reply`]

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{BoxError, ChatterError};
use crate::message::{Answer, Message, Reply, Usage};
use crate::options::{Inferrer, Opt};
use crate::prompt::Prompt;

/// Sends a conversation to a model and returns its reply.
///
/// Implementations must be safe to call concurrently from many tasks.
#[async_trait]
pub trait Chatter: Send + Sync {
    /// Session usage of the component that performs the network call.
    fn usage(&self) -> Usage;

    /// Send `messages` (the full, caller-held history) with per-call options.
    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError>;
}

#[async_trait]
impl<T: Chatter + ?Sized> Chatter for Arc<T> {
    fn usage(&self) -> Usage {
        (**self).usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        (**self).prompt(ctx, messages, opts).await
    }
}

#[async_trait]
impl<T: Chatter + ?Sized> Chatter for Box<T> {
    fn usage(&self) -> Usage {
        (**self).usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        (**self).prompt(ctx, messages, opts).await
    }
}

/// Builds one vendor request. A fresh encoder is created for every call.
///
/// Hooks are called in message order. A hook failure aborts the call as a bad
/// request before anything is sent.
pub trait Encoder: Send {
    type Request: Send;

    /// Receive the inference parameters of the call. Parameters the vendor
    /// has no equivalent for are ignored.
    fn apply_options(&mut self, inferrer: &Inferrer);

    fn as_stratum(&mut self, text: &str) -> Result<(), BoxError>;
    fn as_text(&mut self, text: &str) -> Result<(), BoxError>;
    fn as_prompt(&mut self, prompt: &Prompt) -> Result<(), BoxError>;
    fn as_answer(&mut self, answer: &Answer) -> Result<(), BoxError>;
    fn as_reply(&mut self, reply: &Reply) -> Result<(), BoxError>;

    fn build(self) -> Self::Request;
}

/// Creates encoders. Any `Fn() -> Result<E, BoxError>` closure is a factory.
pub trait EncoderFactory: Send + Sync {
    type Encoder: Encoder;

    fn create(&self) -> Result<Self::Encoder, BoxError>;
}

impl<E, F> EncoderFactory for F
where
    E: Encoder,
    F: Fn() -> Result<E, BoxError> + Send + Sync,
{
    type Encoder = E;

    fn create(&self) -> Result<E, BoxError> {
        self()
    }
}

/// Performs the network call for an already-built request.
#[async_trait]
pub trait Service: Send + Sync {
    type Request: Send;
    type Response: Send;

    async fn invoke(&self, ctx: &Context, request: Self::Request) -> Result<Self::Response, BoxError>;
}

/// Turns a vendor response into a [`Reply`], usage included.
pub trait Decoder: Send + Sync {
    type Response;

    fn decode(&self, response: Self::Response) -> Result<Reply, BoxError>;
}
