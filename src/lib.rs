//! # Emissary — request-execution core for an async HTTP client
//!
//! Emissary decides, for every outgoing request, which transformations,
//! checks, and policies apply before a byte reaches the wire and after a
//! response arrives. It provides:
//!
//! - **Interceptor chains**: ordered, short-circuitable client-level hooks
//!   wrapping the whole request lifecycle
//! - **Transport-boundary filters**: fail-fast pre-write and post-header
//!   hooks that cannot skip transport
//! - **Retry and redirect policies**: predicate + backoff retry decisioning
//!   and bounded, standards-following redirect handling
//! - **Host resolution**: pluggable async resolvers composed with
//!   load-balancing strategies
//! - **Traffic rules**: a hot-reloadable rule engine matching requests and
//!   rewriting or terminating them before transport
//!
//! ## Usage example
//!
//! ```rust,no_run
//! use emissary::{Request, RequestExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let executor = RequestExecutor::builder().build()?;
//!     let response = executor
//!         .execute(Request::get("http://example.com/".parse()?))
//!         .await?;
//!     println!("{}", response.status());
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod codec;
pub mod error;
pub mod executor;
pub mod message;
pub mod metrics;
pub mod resolver;
pub mod retry;
pub mod rules;
pub mod transport;

// Re-export commonly used types
pub use chain::{
    FilterChain, Interceptor, InvocationChain, Next, RequestFilter, ResponseFilter, TerminalStage,
};
pub use codec::{BodyCodec, CodecRegistry, JsonCodec};
pub use error::{EmissaryError, EmissaryResult};
pub use executor::{CancelToken, ExecutorConfig, RequestExecutor, RequestExecutorBuilder};
pub use message::{AttributeKey, Attributes, Body, Request, Response};
pub use resolver::{
    AddressSelector, HostResolver, LoadBalancer, RandomBalancer, RoundRobinBalancer,
    SystemResolver,
};
pub use retry::{BackoffConfig, BackoffStrategy, DefaultRetryPolicy, RetryPolicy, RetryState};
pub use rules::{
    MatchMechanism, MatchResult, RuleConfig, RuleEngine, RuleRegistry, RuleSet, RuleSource,
    StringMatcher,
};
pub use transport::{HyperTransmitter, Transmitter};
