//! AI fallback layer (spec §4.3/§4.4): a single HTTP call to a local LLM
//! endpoint, guarded by a circuit breaker, a parse cache, single-flight
//! de-duplication, and a background retry queue.

pub mod cache;
pub mod circuit_breaker;
pub mod integrator;
pub mod keepalive;
pub mod matcher;
pub mod queue;
pub mod status;

pub use cache::{normalize_cache_key, ParseCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use integrator::{AiIntegrator, EnhancementOutcome};
pub use keepalive::KeepaliveProber;
pub use matcher::{AiMatcher, AiResult, MatcherError};
pub use queue::{EnhancementQueue, QueueConfig};
pub use status::{AiStatus, AiStatusSnapshot};
