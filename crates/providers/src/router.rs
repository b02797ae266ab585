//! Router: selects a chatter from a named pool per call.
//!
//! The caller picks a pool member with `Opt::Route(name)`. An absent or
//! unknown name resolves to the fallback, never to an error. No balancing or
//! health checking is done; selection is purely by name.

use async_trait::async_trait;
use chatter_core::{Chatter, ChatterError, Context, Message, Opt, Reply, Usage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Name under which the fallback is reported in logs.
const FALLBACK: &str = "fallback";

/// Dispatches each call to a named chatter or the fallback.
pub struct Router {
    routes: HashMap<String, Arc<dyn Chatter>>,
    fallback: Arc<dyn Chatter>,
    usage: Mutex<Usage>,
}

impl Router {
    /// Create a router with an empty pool.
    pub fn new(fallback: Arc<dyn Chatter>) -> Self {
        Self {
            routes: HashMap::new(),
            fallback,
            usage: Mutex::new(Usage::default()),
        }
    }

    /// Register a pool member, replacing any member of the same name.
    pub fn register(&mut self, name: impl Into<String>, chatter: Arc<dyn Chatter>) {
        self.routes.insert(name.into(), chatter);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_route(mut self, name: impl Into<String>, chatter: Arc<dyn Chatter>) -> Self {
        self.register(name, chatter);
        self
    }

    /// Look up a route by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Chatter>> {
        self.routes.get(name).cloned()
    }

    /// List all registered route names.
    pub fn list(&self) -> Vec<&str> {
        self.routes.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve the chatter for `opts`: the last route naming a pool member
    /// wins, anything else falls back.
    pub fn resolve(&self, opts: &[Opt]) -> (&str, &Arc<dyn Chatter>) {
        opts.iter()
            .rev()
            .find_map(|opt| match opt {
                Opt::Route(name) => self.routes.get_key_value(name.as_str()),
                _ => None,
            })
            .map(|(name, chatter)| (name.as_str(), chatter))
            .unwrap_or((FALLBACK, &self.fallback))
    }

    /// Zero the router's running usage.
    pub fn reset_usage(&self) {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) = Usage::default();
    }
}

#[async_trait]
impl Chatter for Router {
    fn usage(&self) -> Usage {
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn prompt(
        &self,
        ctx: &Context,
        messages: &[Message],
        opts: &[Opt],
    ) -> std::result::Result<Reply, ChatterError> {
        let (route, chatter) = self.resolve(opts);
        debug!(route = %route, "Router: selected route");

        let reply = chatter.prompt(ctx, messages, opts).await?;
        *self.usage.lock().unwrap_or_else(PoisonError::into_inner) += reply.usage;

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replies with its own name.
    struct Named {
        name: &'static str,
        calls: Mutex<usize>,
    }

    impl Named {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Chatter for Named {
        fn usage(&self) -> Usage {
            Usage::default()
        }

        async fn prompt(
            &self,
            _ctx: &Context,
            _messages: &[Message],
            _opts: &[Opt],
        ) -> std::result::Result<Reply, ChatterError> {
            *self.calls.lock().unwrap() += 1;
            Ok(Reply::text(self.name).with_usage(Usage::new(1, 2)))
        }
    }

    fn router() -> (Router, Arc<Named>, Arc<Named>, Arc<Named>) {
        let fast = Named::new("fast");
        let smart = Named::new("smart");
        let fallback = Named::new("fallback");
        let router = Router::new(fallback.clone())
            .with_route("fast", fast.clone())
            .with_route("smart", smart.clone());
        (router, fast, smart, fallback)
    }

    async fn ask(router: &Router, opts: &[Opt]) -> String {
        router
            .prompt(&Context::background(), &[Message::text("hi")], opts)
            .await
            .unwrap()
            .to_string()
    }

    #[test]
    fn router_register_and_lookup() {
        let (router, _, _, _) = router();
        assert!(router.get("fast").is_some());
        assert!(router.get("nonexistent").is_none());

        let mut names = router.list();
        names.sort();
        assert_eq!(names, vec!["fast", "smart"]);
    }

    #[tokio::test]
    async fn route_option_selects_member() {
        let (router, fast, smart, fallback) = router();

        assert_eq!(ask(&router, &[Opt::Route("smart".into())]).await, "smart");
        assert_eq!(smart.calls(), 1);
        assert_eq!(fast.calls(), 0);
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn absent_or_unknown_route_uses_fallback() {
        let (router, _, _, fallback) = router();

        assert_eq!(ask(&router, &[]).await, "fallback");
        assert_eq!(ask(&router, &[Opt::Route("nonexistent".into())]).await, "fallback");
        assert_eq!(fallback.calls(), 2);
    }

    #[tokio::test]
    async fn last_known_route_wins() {
        let (router, _, _, _) = router();
        let opts = [
            Opt::Route("fast".into()),
            Opt::Route("smart".into()),
            Opt::Route("nonexistent".into()),
        ];
        assert_eq!(ask(&router, &opts).await, "smart");
    }

    #[tokio::test]
    async fn usage_accumulates_across_routes() {
        let (router, _, _, _) = router();

        ask(&router, &[Opt::Route("fast".into())]).await;
        ask(&router, &[]).await;
        assert_eq!(router.usage(), Usage::new(2, 4));

        router.reset_usage();
        assert_eq!(router.usage(), Usage::default());
    }
}
