//! Rate limiter decorator.
//!
//! Two token buckets sit in front of the wrapped chatter: one request per
//! call, and a token "debt" equal to the previous call's total usage. The
//! real cost of a call is only known once it returns, so each call pays for
//! its predecessor. The first call carries no debt.
//!
//! Both buckets refill continuously at `limit / 60` per second and hold at
//! most `limit` credits. A limit of zero disables the bucket.

use async_trait::async_trait;
use chatter_core::{Chatter, ChatterError, Context, ContextError, Message, Opt, Reply, Usage};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Bucket {
    per_second: f64,
    burst: f64,
    tokens: f64,
    updated: Instant,
}

impl Bucket {
    fn per_minute(limit: u32, now: Instant) -> Option<Self> {
        (limit > 0).then(|| Self {
            per_second: f64::from(limit) / 60.0,
            burst: f64::from(limit),
            tokens: f64::from(limit),
            updated: now,
        })
    }

    fn refill(&mut self, now: Instant) {
        if now <= self.updated {
            return;
        }
        let elapsed = now.duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.burst);
        self.updated = now;
    }

    /// Time until `n` credits are available. Assumes a fresh refill.
    fn wait_for(&self, n: f64) -> Duration {
        if self.tokens >= n {
            Duration::ZERO
        } else {
            Duration::from_secs_f64((n - self.tokens) / self.per_second)
        }
    }

    fn take(&mut self, n: f64) {
        self.tokens -= n;
    }

    fn give_back(&mut self, n: f64) {
        self.tokens = (self.tokens + n).min(self.burst);
    }
}

#[derive(Debug)]
struct LimiterState {
    requests: Option<Bucket>,
    tokens: Option<Bucket>,
    debt: u64,
}

/// A reservation taken before a call.
struct Reservation {
    wait: Duration,
    debt: f64,
}

/// Throttles calls by requests and tokens per minute.
pub struct Limiter {
    inner: Arc<dyn Chatter>,
    state: Mutex<LimiterState>,
}

impl Limiter {
    /// Limit `inner` to the given rates. Zero disables a limit.
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32, inner: Arc<dyn Chatter>) -> Self {
        let now = Instant::now();
        Self {
            inner,
            state: Mutex::new(LimiterState {
                requests: Bucket::per_minute(requests_per_minute, now),
                tokens: Bucket::per_minute(tokens_per_minute, now),
                debt: 0,
            }),
        }
    }

    /// Token debt the next call will pay.
    pub fn debt(&self) -> u64 {
        self.lock().debt
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve one request and the current debt, failing fast when the wait
    /// would outlive the context deadline.
    fn reserve(&self, ctx: &Context) -> Result<Reservation, ContextError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        let now = Instant::now();
        let mut state = self.lock();
        let mut wait = Duration::ZERO;

        // debt beyond the burst could never be paid
        let debt = match &state.tokens {
            Some(bucket) => (state.debt as f64).min(bucket.burst),
            None => 0.0,
        };

        if let Some(bucket) = state.requests.as_mut() {
            bucket.refill(now);
            wait = wait.max(bucket.wait_for(1.0));
        }
        if let Some(bucket) = state.tokens.as_mut() {
            bucket.refill(now);
            wait = wait.max(bucket.wait_for(debt));
        }

        if ctx.deadline().is_some_and(|deadline| now + wait > deadline) {
            return Err(ContextError::DeadlineExceeded);
        }

        if let Some(bucket) = state.requests.as_mut() {
            bucket.take(1.0);
        }
        if let Some(bucket) = state.tokens.as_mut() {
            bucket.take(debt);
        }

        Ok(Reservation { wait, debt })
    }

    fn release(&self, reservation: &Reservation) {
        let mut state = self.lock();
        if let Some(bucket) = state.requests.as_mut() {
            bucket.give_back(1.0);
        }
        if let Some(bucket) = state.tokens.as_mut() {
            bucket.give_back(reservation.debt);
        }
    }

    async fn wait(&self, ctx: &Context) -> Result<(), ContextError> {
        let reservation = self.reserve(ctx)?;
        if reservation.wait.is_zero() {
            return Ok(());
        }

        if let Err(e) = ctx.sleep(reservation.wait).await {
            self.release(&reservation);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl Chatter for Limiter {
    fn usage(&self) -> Usage {
        self.inner.usage()
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        self.wait(ctx).await?;

        let reply = self.inner.prompt(ctx, messages, opts).await?;

        let budget = {
            let mut state = self.lock();
            state.debt = reply.usage.total();
            state.tokens.as_ref().map(|bucket| bucket.tokens)
        };

        let session = self.inner.usage();
        debug!(
            budget = ?budget,
            debt = reply.usage.total(),
            session_input_tokens = session.input_tokens,
            session_reply_tokens = session.reply_tokens,
            input_tokens = reply.usage.input_tokens,
            reply_tokens = reply.usage.reply_tokens,
            "Limiter: call completed"
        );

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replies with a fixed reply-token usage and counts calls.
    struct MockChatter {
        reply_tokens: u64,
        calls: Mutex<usize>,
    }

    impl MockChatter {
        fn new(reply_tokens: u64) -> Arc<Self> {
            Arc::new(Self {
                reply_tokens,
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
            Usage::new(0, self.reply_tokens * self.calls() as u64)
        }

        async fn prompt(
            &self,
            _ctx: &Context,
            _messages: &[Message],
            _opts: &[Opt],
        ) -> std::result::Result<Reply, ChatterError> {
            *self.calls.lock().unwrap() += 1;
            Ok(Reply::text("").with_usage(Usage::new(0, self.reply_tokens)))
        }
    }

    async fn call(limiter: &Limiter, timeout: Duration) -> Result<Reply, ChatterError> {
        let ctx = Context::background().with_timeout(timeout);
        limiter
            .prompt(&ctx, &[Message::text("Make me a test.")], &[])
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn requests_per_minute_is_enforced() {
        let llm = MockChatter::new(1000);
        let limiter = Limiter::new(8, 100_000, llm.clone());

        for _ in 0..8 {
            call(&limiter, Duration::from_millis(100)).await.unwrap();
        }

        let err = call(&limiter, Duration::from_millis(100)).await.unwrap_err();
        assert_eq!(
            err,
            ChatterError::RateLimitWaitCancelled(ContextError::DeadlineExceeded)
        );
        assert_eq!(llm.calls(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_per_minute_charges_previous_usage() {
        let llm = MockChatter::new(1000);
        let limiter = Limiter::new(100_000, 8 * 1000, llm.clone());

        // the first call carries no debt, so one extra call fits
        for _ in 0..9 {
            call(&limiter, Duration::from_millis(100)).await.unwrap();
        }
        assert_eq!(limiter.debt(), 1000);

        let err = call(&limiter, Duration::from_millis(100)).await.unwrap_err();
        assert!(matches!(err, ChatterError::RateLimitWaitCancelled(_)));
        assert_eq!(llm.calls(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_refill_within_deadline() {
        let llm = MockChatter::new(10);
        let limiter = Limiter::new(1, 0, llm.clone());

        call(&limiter, Duration::from_secs(1)).await.unwrap();

        let start = Instant::now();
        call(&limiter, Duration::from_secs(120)).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_the_reservation() {
        let llm = MockChatter::new(10);
        let limiter = Arc::new(Limiter::new(1, 0, llm.clone()));

        call(&limiter, Duration::from_secs(1)).await.unwrap();

        let (ctx, handle) = Context::background().with_cancel();
        let waiter = tokio::spawn({
            let limiter = limiter.clone();
            async move { limiter.prompt(&ctx, &[Message::text("wait")], &[]).await }
        });
        tokio::task::yield_now().await;
        handle.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, ChatterError::RateLimitWaitCancelled(ContextError::Cancelled));
        assert_eq!(llm.calls(), 1);

        // a leaked reservation would push the next slot to 120s
        call(&limiter, Duration::from_secs(61)).await.unwrap();
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limits_are_unlimited() {
        let llm = MockChatter::new(1_000_000);
        let limiter = Limiter::new(0, 0, llm.clone());

        for _ in 0..100 {
            call(&limiter, Duration::from_millis(1)).await.unwrap();
        }
        assert_eq!(limiter.usage(), Usage::new(0, 100_000_000));
    }

    #[tokio::test]
    async fn cancelled_context_fails_without_call() {
        let llm = MockChatter::new(1);
        let limiter = Limiter::new(10, 10, llm.clone());
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let err = limiter.prompt(&ctx, &[Message::text("x")], &[]).await.unwrap_err();

        assert_eq!(err, ChatterError::RateLimitWaitCancelled(ContextError::Cancelled));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_calls_share_one_budget() {
        let llm = MockChatter::new(7);
        let limiter = Arc::new(Limiter::new(64, 1_000_000, llm.clone()));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { call(&limiter, Duration::from_millis(10)).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(llm.calls(), 64);
        assert_eq!(limiter.debt(), 7);
        assert_eq!(limiter.usage(), Usage::new(0, 64 * 7));

        // every request credit was taken exactly once
        let err = call(&limiter, Duration::from_millis(10)).await.unwrap_err();
        assert_eq!(
            err,
            ChatterError::RateLimitWaitCancelled(ContextError::DeadlineExceeded)
        );
        assert_eq!(llm.calls(), 64);
    }
}
