use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::EmissaryResult;
use crate::message::{Request, Response};

/// Transport-boundary hook that runs before the request is written.
///
/// Filters observe or veto around the transport; unlike interceptors they
/// cannot skip it.
#[async_trait]
pub trait RequestFilter: Send + Sync {
    fn name(&self) -> &str;

    /// Position in the filter chain; lower runs earlier, equal orders keep
    /// registration order
    fn order(&self) -> i32 {
        0
    }

    async fn on_request(&self, request: &mut Request) -> EmissaryResult<()>;
}

/// Transport-boundary hook that runs once response headers are available.
/// A failure discards the response and becomes the attempt's outcome.
#[async_trait]
pub trait ResponseFilter: Send + Sync {
    fn name(&self) -> &str;

    fn order(&self) -> i32 {
        0
    }

    async fn on_response(&self, response: &Response) -> EmissaryResult<()>;
}

/// The two independently ordered, fail-fast filter chains at the transport
/// boundary
pub struct FilterChain {
    request_filters: Vec<Arc<dyn RequestFilter>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
}

impl FilterChain {
    pub fn new(
        mut request_filters: Vec<Arc<dyn RequestFilter>>,
        mut response_filters: Vec<Arc<dyn ResponseFilter>>,
    ) -> Self {
        request_filters.sort_by_key(|filter| filter.order());
        response_filters.sort_by_key(|filter| filter.order());
        Self {
            request_filters,
            response_filters,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.request_filters.is_empty() && self.response_filters.is_empty()
    }

    /// Run the request filters in order. The first failure aborts the
    /// attempt before anything reaches the wire.
    pub async fn apply_request(&self, request: &mut Request) -> EmissaryResult<()> {
        for filter in &self.request_filters {
            debug!(filter = filter.name(), "Applying request filter");
            if let Err(e) = filter.on_request(request).await {
                warn!(filter = filter.name(), error = %e, "Request filter vetoed the attempt");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run the response filters in order. The first failure discards the
    /// response and becomes the attempt's outcome.
    pub async fn apply_response(&self, response: &Response) -> EmissaryResult<()> {
        for filter in &self.response_filters {
            debug!(filter = filter.name(), "Applying response filter");
            if let Err(e) = filter.on_response(response).await {
                warn!(filter = filter.name(), error = %e, "Response filter rejected the response");
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmissaryError;
    use std::sync::Mutex;

    struct Tagging {
        order: i32,
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl RequestFilter for Tagging {
        fn name(&self) -> &str {
            self.tag
        }

        fn order(&self) -> i32 {
            self.order
        }

        async fn on_request(&self, request: &mut Request) -> EmissaryResult<()> {
            self.log.lock().unwrap().push(self.tag);
            request.add_header("x-filter", self.tag)
        }
    }

    struct Vetoing;

    #[async_trait]
    impl RequestFilter for Vetoing {
        fn name(&self) -> &str {
            "veto"
        }

        fn order(&self) -> i32 {
            0
        }

        async fn on_request(&self, _request: &mut Request) -> EmissaryResult<()> {
            Err(EmissaryError::transport("payload rejected"))
        }
    }

    fn request() -> Request {
        Request::get("http://example.com/".parse().unwrap())
    }

    #[tokio::test]
    async fn test_request_filters_run_in_order_and_mutate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(
            vec![
                Arc::new(Tagging {
                    order: 10,
                    tag: "late",
                    log: Arc::clone(&log),
                }),
                Arc::new(Tagging {
                    order: -10,
                    tag: "early",
                    log: Arc::clone(&log),
                }),
            ],
            Vec::new(),
        );

        let mut req = request();
        chain.apply_request(&mut req).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["early", "late"]);
        let tags: Vec<_> = req
            .headers()
            .get_all("x-filter")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_request_filter_veto_is_fail_fast() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = FilterChain::new(
            vec![
                Arc::new(Vetoing),
                Arc::new(Tagging {
                    order: 1,
                    tag: "never",
                    log: Arc::clone(&log),
                }),
            ],
            Vec::new(),
        );

        let mut req = request();
        let err = chain.apply_request(&mut req).await.unwrap_err();
        assert!(matches!(err, EmissaryError::Transport { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_response_filter_rejection() {
        struct RejectServerError;

        #[async_trait]
        impl ResponseFilter for RejectServerError {
            fn name(&self) -> &str {
                "reject-5xx"
            }

            async fn on_response(&self, response: &Response) -> EmissaryResult<()> {
                if response.status().is_server_error() {
                    Err(EmissaryError::transport("upstream returned 5xx"))
                } else {
                    Ok(())
                }
            }
        }

        let chain = FilterChain::new(Vec::new(), vec![Arc::new(RejectServerError)]);

        let ok = Response::builder().status(204).build().unwrap();
        assert!(chain.apply_response(&ok).await.is_ok());

        let bad = Response::builder().status(502).build().unwrap();
        assert!(chain.apply_response(&bad).await.is_err());
    }
}
