//! Quota decorator: lifetime ceilings on call count and token usage.
//!
//! Ceilings are checked before the call. A call that would exceed one is
//! aborted without reaching the wrapped chatter and without touching any
//! counter. Zero disables a ceiling.

use async_trait::async_trait;
use chatter_core::{Chatter, ChatterError, Context, Message, Opt, QuotaLimit, Reply, Usage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Consumed {
    epoch: u64,
    usage: Usage,
}

/// Caps the number of calls and the tokens they may consume.
pub struct Quota {
    inner: Arc<dyn Chatter>,
    max_epoch: u64,
    max_usage: Usage,
    consumed: Mutex<Consumed>,
}

impl Quota {
    /// Limit `inner` to `max_epoch` calls and `max_usage` tokens. Zero disables a ceiling.
    pub fn new(max_epoch: u64, max_usage: Usage, inner: Arc<dyn Chatter>) -> Self {
        Self {
            inner,
            max_epoch,
            max_usage,
            consumed: Mutex::new(Consumed::default()),
        }
    }

    /// Zero the epoch and usage counters.
    pub fn reset_quota(&self) {
        *self.lock() = Consumed::default();
    }

    /// Calls admitted so far.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Usage charged against the quota so far.
    pub fn consumed(&self) -> Usage {
        self.lock().usage
    }

    fn lock(&self) -> MutexGuard<'_, Consumed> {
        self.consumed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check every ceiling and admit the call.
    fn admit(&self) -> Result<(), QuotaLimit> {
        let mut consumed = self.lock();

        if self.max_epoch > 0 && consumed.epoch >= self.max_epoch {
            return Err(QuotaLimit::Epoch(consumed.epoch));
        }
        if self.max_usage.input_tokens > 0 && consumed.usage.input_tokens >= self.max_usage.input_tokens {
            return Err(QuotaLimit::InputTokens(consumed.usage.input_tokens));
        }
        if self.max_usage.reply_tokens > 0 && consumed.usage.reply_tokens >= self.max_usage.reply_tokens {
            return Err(QuotaLimit::ReplyTokens(consumed.usage.reply_tokens));
        }

        consumed.epoch += 1;
        Ok(())
    }
}

#[async_trait]
impl Chatter for Quota {
    fn usage(&self) -> Usage {
        self.inner.usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        if let Err(limit) = self.admit() {
            warn!(limit = %limit, "Quota: call aborted");
            return Err(ChatterError::QuotaExceeded(limit));
        }

        let reply = self.inner.prompt(ctx, messages, opts).await?;
        self.lock().usage += reply.usage;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts calls; optionally fails every call.
    struct MockChatter {
        usage: Usage,
        fail: bool,
        calls: Mutex<usize>,
    }

    impl MockChatter {
        fn new(usage: Usage) -> Arc<Self> {
            Arc::new(Self {
                usage,
                fail: false,
                calls: Mutex::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                usage: Usage::default(),
                fail: true,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Chatter for MockChatter {
        fn usage(&self) -> Usage {
            Usage::new(
                self.usage.input_tokens * self.calls() as u64,
                self.usage.reply_tokens * self.calls() as u64,
            )
        }

        async fn prompt(
            &self,
            _ctx: &Context,
            _messages: &[Message],
            _opts: &[Opt],
        ) -> std::result::Result<Reply, ChatterError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(ChatterError::service_io("timeout"));
            }
            Ok(Reply::text("ok").with_usage(self.usage))
        }
    }

    async fn call(quota: &Quota) -> Result<Reply, ChatterError> {
        quota
            .prompt(&Context::background(), &[Message::text("go")], &[])
            .await
    }

    #[tokio::test]
    async fn epoch_ceiling_blocks_next_call() {
        let llm = MockChatter::new(Usage::new(1, 1));
        let quota = Quota::new(3, Usage::default(), llm.clone());

        for _ in 0..3 {
            call(&quota).await.unwrap();
        }
        let err = call(&quota).await.unwrap_err();

        assert_eq!(err, ChatterError::QuotaExceeded(QuotaLimit::Epoch(3)));
        assert_eq!(llm.calls(), 3);
        assert_eq!(quota.epoch(), 3);
    }

    #[tokio::test]
    async fn token_ceilings_are_checked_before_the_call() {
        let llm = MockChatter::new(Usage::new(40, 100));
        let quota = Quota::new(0, Usage::new(0, 150), llm.clone());

        call(&quota).await.unwrap();
        call(&quota).await.unwrap();
        let err = call(&quota).await.unwrap_err();

        assert_eq!(err, ChatterError::QuotaExceeded(QuotaLimit::ReplyTokens(200)));
        assert_eq!(llm.calls(), 2);
        assert_eq!(quota.consumed(), Usage::new(80, 200));
        // rejected calls do not advance the epoch
        assert_eq!(quota.epoch(), 2);
    }

    #[tokio::test]
    async fn input_token_ceiling() {
        let llm = MockChatter::new(Usage::new(50, 1));
        let quota = Quota::new(0, Usage::new(50, 0), llm.clone());

        call(&quota).await.unwrap();
        let err = call(&quota).await.unwrap_err();

        assert_eq!(err, ChatterError::QuotaExceeded(QuotaLimit::InputTokens(50)));
    }

    #[tokio::test]
    async fn reset_quota_allows_reuse() {
        let llm = MockChatter::new(Usage::new(1, 1));
        let quota = Quota::new(1, Usage::default(), llm.clone());

        call(&quota).await.unwrap();
        assert!(call(&quota).await.is_err());

        quota.reset_quota();
        assert_eq!(quota.consumed(), Usage::default());
        call(&quota).await.unwrap();
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn inner_errors_pass_through_unchanged() {
        let llm = MockChatter::failing();
        let quota = Quota::new(5, Usage::default(), llm.clone());

        let err = call(&quota).await.unwrap_err();

        assert_eq!(err, ChatterError::ServiceIo("timeout".into()));
        assert_eq!(quota.consumed(), Usage::default());
    }

    #[tokio::test]
    async fn usage_reads_the_wrapped_chatter() {
        let llm = MockChatter::new(Usage::new(2, 3));
        let quota = Quota::new(0, Usage::default(), llm.clone());

        call(&quota).await.unwrap();
        assert_eq!(quota.usage(), llm.usage());
    }
}
