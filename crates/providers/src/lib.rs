//! Chatter implementations: the generic provider pipeline and the decorators
//! that wrap any `chatter_core::Chatter`.
//!
//! Decorators hold an `Arc<dyn Chatter>` and implement `Chatter` themselves,
//! so they stack in any order. `build_from_config` assembles the usual stack
//! from a `StackConfig`.

pub mod cache;
pub mod embedder;
pub mod limiter;
pub mod logger;
pub mod pipeline;
pub mod quota;
pub mod router;
pub mod stack;

pub use cache::{Cache, InMemoryStore, KeyValueStore};
pub use embedder::{Embedder, Embedding};
pub use limiter::Limiter;
pub use logger::{Logger, TranscriptFormat};
pub use pipeline::Provider;
pub use quota::Quota;
pub use router::Router;
pub use stack::{Preset, build_from_config};
