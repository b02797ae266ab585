//! Generic provider pipeline: encode, invoke, decode.
//!
//! `Provider` adapts any vendor protocol to the [`Chatter`] contract. The
//! vendor supplies an encoder factory, a service and a decoder; the pipeline
//! logic below is written once and instantiated per vendor.
//!
//! Every call is stateless with respect to history. The only state kept
//! across calls is the running session usage, updated after a successful
//! decode and never on failure.

use async_trait::async_trait;
use chatter_core::{
    Chatter, ChatterError, Context, Decoder, Encoder, EncoderFactory, Inferrer, Message, Opt,
    Reply, Service, Usage,
};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// The request type produced by a factory's encoders.
pub type RequestOf<F> = <<F as EncoderFactory>::Encoder as Encoder>::Request;

/// A chatter built from an encoder factory, a service and a decoder.
pub struct Provider<F, S, D> {
    factory: F,
    service: S,
    decoder: D,
    usage: Mutex<Usage>,
}

impl<F, S, D> Provider<F, S, D>
where
    F: EncoderFactory,
    S: Service<Request = RequestOf<F>>,
    D: Decoder<Response = S::Response>,
{
    /// Assemble a provider with zero usage.
    pub fn new(factory: F, service: S, decoder: D) -> Self {
        Self {
            factory,
            service,
            decoder,
            usage: Mutex::new(Usage::default()),
        }
    }

    /// Zero the session usage.
    pub fn reset_usage(&self) {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) = Usage::default();
    }

    /// Build the vendor request for `messages`. Nothing is sent.
    pub fn encode(&self, messages: &[Message], opts: &[Opt]) -> Result<RequestOf<F>, ChatterError> {
        if messages.is_empty() {
            return Err(ChatterError::EmptyPrompt);
        }

        let mut encoder = self.factory.create().map_err(ChatterError::bad_request)?;
        encoder.apply_options(&Inferrer::from_opts(opts));

        for message in messages {
            let folded = match message {
                Message::Stratum(text) => encoder.as_stratum(text),
                Message::Text(text) => encoder.as_text(text),
                Message::Prompt(prompt) => encoder.as_prompt(prompt),
                Message::Answer(answer) => encoder.as_answer(answer),
                Message::Reply(reply) => encoder.as_reply(reply),
            };
            folded.map_err(ChatterError::bad_request)?;
        }

        Ok(encoder.build())
    }
}

#[async_trait]
impl<F, S, D> Chatter for Provider<F, S, D>
where
    F: EncoderFactory,
    S: Service<Request = RequestOf<F>>,
    D: Decoder<Response = S::Response>,
{
    fn usage(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        let request = self.encode(messages, opts)?;

        let response = self
            .service
            .invoke(ctx, request)
            .await
            .map_err(ChatterError::service_io)?;

        let reply = self.decoder.decode(response).map_err(ChatterError::service_io)?;

        let session = {
            let mut usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
            *usage += reply.usage;
            *usage
        };

        debug!(
            stage = %reply.stage,
            input_tokens = reply.usage.input_tokens,
            reply_tokens = reply.usage.reply_tokens,
            session_tokens = session.total(),
            "Provider: call completed"
        );

        Ok(reply)
    }
}
