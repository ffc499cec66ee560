//! Interceptor composition: the client-level invocation chain.
//!
//! The chain is built once per client configuration and is safe for
//! unlimited concurrent use; all per-call state travels with the request.

mod filters;

pub use filters::{FilterChain, RequestFilter, ResponseFilter};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EmissaryResult;
use crate::message::{Request, Response};

/// Client-level hook wrapping the whole request lifecycle.
///
/// Calling `next.proceed(request)` continues the chain; returning without
/// proceeding short-circuits it, so neither the remaining interceptors nor
/// the transmitter run.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Position in the chain; lower runs earlier, equal orders keep
    /// registration order
    fn order(&self) -> i32 {
        0
    }

    async fn handle(&self, request: Request, next: Next) -> EmissaryResult<Response>;
}

/// Terminal stage invoked when the last interceptor proceeds. The executor's
/// attempt driver implements this.
#[async_trait]
pub trait TerminalStage: Send + Sync {
    async fn send(&self, request: Request) -> EmissaryResult<Response>;
}

/// The composed, ordered sequence of interceptors plus the terminal stage
pub struct InvocationChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    terminal: Arc<dyn TerminalStage>,
}

impl InvocationChain {
    /// Build the chain. Interceptors are stable-sorted ascending by
    /// `order()`, so invoking the head executes them in ascending order with
    /// registration order breaking ties.
    pub fn new(
        mut interceptors: Vec<Arc<dyn Interceptor>>,
        terminal: Arc<dyn TerminalStage>,
    ) -> Self {
        interceptors.sort_by_key(|interceptor| interceptor.order());
        Self {
            interceptors: interceptors.into(),
            terminal,
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run one request through the chain. Failures from any link propagate
    /// directly; nothing is swallowed or retried at this layer.
    pub async fn run(&self, request: Request) -> EmissaryResult<Response> {
        let next = Next {
            interceptors: Arc::clone(&self.interceptors),
            terminal: Arc::clone(&self.terminal),
            index: 0,
        };
        next.proceed(request).await
    }
}

/// Cursor over the remaining chain links.
///
/// `proceed` consumes the cursor, so an interceptor cannot invoke its
/// downstream more than once; a second call simply does not compile.
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    terminal: Arc<dyn TerminalStage>,
    index: usize,
}

impl Next {
    pub async fn proceed(self, request: Request) -> EmissaryResult<Response> {
        match self.interceptors.get(self.index) {
            Some(interceptor) => {
                let interceptor = Arc::clone(interceptor);
                let next = Next {
                    interceptors: self.interceptors,
                    terminal: self.terminal,
                    index: self.index + 1,
                };
                debug!(interceptor = interceptor.name(), "Invoking interceptor");
                interceptor.handle(request, next).await
            }
            None => self.terminal.send(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmissaryError;
    use std::sync::Mutex;

    struct EchoTerminal;

    #[async_trait]
    impl TerminalStage for EchoTerminal {
        async fn send(&self, _request: Request) -> EmissaryResult<Response> {
            Response::builder().status(200).build()
        }
    }

    struct Recording {
        order: i32,
        label: String,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Recording {
        fn name(&self) -> &str {
            &self.label
        }

        fn order(&self) -> i32 {
            self.order
        }

        async fn handle(&self, request: Request, next: Next) -> EmissaryResult<Response> {
            self.log.lock().unwrap().push(self.label.clone());
            next.proceed(request).await
        }
    }

    fn recording(order: i32, label: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
        Arc::new(Recording {
            order,
            label: label.to_string(),
            log: Arc::clone(log),
        })
    }

    fn request() -> Request {
        Request::get("http://example.com/".parse().unwrap())
    }

    #[tokio::test]
    async fn test_interceptors_run_in_ascending_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InvocationChain::new(
            vec![
                recording(5, "5", &log),
                recording(-100, "-100", &log),
                recording(0, "0", &log),
                recording(100, "100", &log),
                recording(-5, "-5", &log),
            ],
            Arc::new(EchoTerminal),
        );

        chain.run(request()).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["-100", "-5", "0", "5", "100"]
        );
    }

    #[tokio::test]
    async fn test_equal_orders_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InvocationChain::new(
            vec![
                recording(0, "first", &log),
                recording(0, "second", &log),
                recording(0, "third", &log),
            ],
            Arc::new(EchoTerminal),
        );

        chain.run(request()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_downstream_and_terminal() {
        struct ShortCircuit {
            log: Arc<Mutex<Vec<String>>>,
        }

        #[async_trait]
        impl Interceptor for ShortCircuit {
            fn name(&self) -> &str {
                "short-circuit"
            }

            fn order(&self) -> i32 {
                0
            }

            async fn handle(&self, _request: Request, _next: Next) -> EmissaryResult<Response> {
                self.log.lock().unwrap().push("short-circuit".to_string());
                Response::builder().status(418).build()
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InvocationChain::new(
            vec![
                Arc::new(ShortCircuit {
                    log: Arc::clone(&log),
                }),
                recording(1, "after", &log),
            ],
            Arc::new(EchoTerminal),
        );

        let resp = chain.run(request()).await.unwrap();
        assert_eq!(resp.status().as_u16(), 418);
        assert_eq!(*log.lock().unwrap(), vec!["short-circuit"]);
    }

    #[tokio::test]
    async fn test_interceptor_failure_stops_the_chain() {
        struct Failing;

        #[async_trait]
        impl Interceptor for Failing {
            fn name(&self) -> &str {
                "failing"
            }

            async fn handle(&self, _request: Request, _next: Next) -> EmissaryResult<Response> {
                Err(EmissaryError::internal("interceptor exploded"))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InvocationChain::new(
            vec![Arc::new(Failing), recording(1, "after", &log)],
            Arc::new(EchoTerminal),
        );

        let err = chain.run(request()).await.unwrap_err();
        assert!(matches!(err, EmissaryError::Internal { .. }));
        assert!(log.lock().unwrap().is_empty());
    }
}
