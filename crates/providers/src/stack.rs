//! Build a decorator stack from configuration.

use async_trait::async_trait;
use chatter_config::StackConfig;
use chatter_core::{Chatter, ChatterError, Context, Message, Opt, Reply, Usage};
use std::sync::Arc;
use tracing::info;

use crate::limiter::Limiter;
use crate::quota::Quota;

/// Sends a fixed set of options ahead of the caller's own. Later options win,
/// so per-call options override the preset.
pub struct Preset {
    inner: Arc<dyn Chatter>,
    opts: Vec<Opt>,
}

impl Preset {
    /// Send `opts` ahead of every call to `inner`.
    pub fn new(opts: Vec<Opt>, inner: Arc<dyn Chatter>) -> Self {
        Self { inner, opts }
    }

    /// The preset options.
    pub fn opts(&self) -> &[Opt] {
        &self.opts
    }
}

#[async_trait]
impl Chatter for Preset {
    fn usage(&self) -> Usage {
        self.inner.usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        let mut merged = Vec::with_capacity(self.opts.len() + opts.len());
        merged.extend_from_slice(&self.opts);
        merged.extend_from_slice(opts);
        self.inner.prompt(ctx, messages, &merged).await
    }
}

/// Wrap `inner` as configured, innermost first: limiter, quota, preset
/// options. Quota rejections therefore never consume rate-limit credits.
pub fn build_from_config(config: &StackConfig, inner: Arc<dyn Chatter>) -> Arc<dyn Chatter> {
    let mut chatter = inner;

    if let Some(limiter) = &config.limiter {
        info!(
            requests_per_minute = limiter.requests_per_minute,
            tokens_per_minute = limiter.tokens_per_minute,
            "Stack: rate limiter enabled"
        );
        chatter = Arc::new(Limiter::new(
            limiter.requests_per_minute,
            limiter.tokens_per_minute,
            chatter,
        ));
    }

    if let Some(quota) = &config.quota {
        info!(
            max_epoch = quota.max_epoch,
            max_input_tokens = quota.max_input_tokens,
            max_reply_tokens = quota.max_reply_tokens,
            "Stack: quota enabled"
        );
        chatter = Arc::new(Quota::new(
            quota.max_epoch,
            Usage::new(quota.max_input_tokens, quota.max_reply_tokens),
            chatter,
        ));
    }

    let opts = config.options();
    if !opts.is_empty() {
        chatter = Arc::new(Preset::new(opts, chatter));
    }

    chatter
}
