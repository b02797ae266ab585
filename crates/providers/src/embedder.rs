//! Text embeddings over any chatter whose backend answers with vectors.

use chatter_core::{Chatter, ChatterError, Content, Context, Message, Usage};
use std::sync::Arc;

/// An embedding vector together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub text: String,
    pub vector: Vec<f32>,
    pub used_tokens: u64,
}

/// Turns text into embedding vectors.
pub struct Embedder {
    inner: Arc<dyn Chatter>,
}

impl Embedder {
    /// Embed through `inner`, which must answer with vector content.
    pub fn new(inner: Arc<dyn Chatter>) -> Self {
        Self { inner }
    }

    /// Usage of the wrapped chatter.
    pub fn usage(&self) -> Usage {
        self.inner.usage()
    }

    /// Embed `text`, returning the first vector in the reply.
    pub async fn embedding(&self, ctx: &Context, text: &str) -> Result<Embedding, ChatterError> {
        let reply = self.inner.prompt(ctx, &[Message::text(text)], &[]).await?;

        let vector = reply
            .content
            .iter()
            .find_map(Content::as_vector)
            .ok_or_else(|| ChatterError::UnexpectedReply("no vector found".into()))?;

        Ok(Embedding {
            text: text.to_string(),
            vector: vector.to_vec(),
            used_tokens: reply.usage.total(),
        })
    }
}
