//! Request execution: the façade that builds the invocation chain once per
//! client configuration and drives retries, redirects, resolution, and the
//! transport-boundary filters per request.

mod config;
mod redirect;

pub use config::ExecutorConfig;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::chain::{
    FilterChain, Interceptor, InvocationChain, RequestFilter, ResponseFilter, TerminalStage,
};
use crate::codec::CodecRegistry;
use crate::error::{EmissaryError, EmissaryResult};
use crate::message::{AttributeKey, Request, Response};
use crate::metrics::{ExecutorMetrics, ExecutorMetricsSnapshot, ResolverMetricsSnapshot};
use crate::resolver::{
    AddressSelector, HostResolver, LoadBalancer, RandomBalancer, SystemResolver,
};
use crate::retry::{DefaultRetryPolicy, RetryPolicy, RetryState};
use crate::rules::{
    RuleConfig, RuleEngine, RuleInterceptor, RuleRegistry, RuleSet, RuleSource, StaticRuleSource,
};
use crate::transport::{HyperTransmitter, Transmitter};

/// Address chosen by the resolver and balancer for the current attempt;
/// address-aware transmitters read it from the attribute bag
pub const RESOLVED_ADDRESS: AttributeKey<SocketAddr> =
    AttributeKey::new("emissary.resolved_address");

/// Correlation id assigned by the executor, one per logical request
pub const REQUEST_ID: AttributeKey<String> = AttributeKey::new("emissary.request_id");

/// Cooperative cancellation flag; attach one to a request to stop the
/// executor from scheduling further retry or redirect attempts
pub const CANCEL_TOKEN: AttributeKey<CancelToken> = AttributeKey::new("emissary.cancel_token");

/// Cancellation flag shared between the caller and the executor.
///
/// Cancelling does not abort an attempt already in flight; it prevents the
/// executor from spawning I/O nobody awaits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Builder for [`RequestExecutor`]. Everything is validated here, so
/// configuration problems fail at construction and never at request time.
pub struct RequestExecutorBuilder {
    config: ExecutorConfig,
    interceptors: Vec<Arc<dyn Interceptor>>,
    request_filters: Vec<Arc<dyn RequestFilter>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
    retry_policy: Option<Arc<dyn RetryPolicy>>,
    resolver: Option<Arc<dyn HostResolver>>,
    balancer: Option<Arc<dyn LoadBalancer>>,
    registry: RuleRegistry,
    rule_source: Option<Box<dyn RuleSource>>,
    codecs: CodecRegistry,
    transmitter: Option<Arc<dyn Transmitter>>,
}

impl RequestExecutorBuilder {
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
            interceptors: Vec::new(),
            request_filters: Vec::new(),
            response_filters: Vec::new(),
            retry_policy: None,
            resolver: None,
            balancer: None,
            registry: RuleRegistry::with_builtins(),
            rule_source: None,
            codecs: CodecRegistry::with_defaults(),
            transmitter: None,
        }
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a client-level interceptor; ordering follows `order()` with
    /// registration order breaking ties
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn request_filter(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.request_filters.push(filter);
        self
    }

    pub fn response_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.response_filters.push(filter);
        self
    }

    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn balancer(mut self, balancer: Arc<dyn LoadBalancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    /// Replace the condition/action factory registry used to compile rules
    pub fn rule_registry(mut self, registry: RuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Attach the rule source; its current rules become the initial snapshot
    /// and its change pushes drive hot reloads
    pub fn rule_source(mut self, source: Box<dyn RuleSource>) -> Self {
        self.rule_source = Some(source);
        self
    }

    /// Attach a fixed rule list (no hot reload)
    pub fn rules(self, rules: Vec<RuleConfig>) -> Self {
        self.rule_source(Box::new(StaticRuleSource::new(rules)))
    }

    pub fn codec_registry(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn transmitter(mut self, transmitter: Arc<dyn Transmitter>) -> Self {
        self.transmitter = Some(transmitter);
        self
    }

    pub fn build(self) -> EmissaryResult<RequestExecutor> {
        self.config.validate()?;

        let metrics = Arc::new(ExecutorMetrics::new());
        let registry = Arc::new(self.registry);

        let mut rule_source = self.rule_source;
        let initial_rules = match rule_source.as_ref() {
            Some(source) => RuleSet::from_configs(&source.current_rules()?, &registry),
            None => RuleSet::empty(),
        };
        let rule_engine = Arc::new(RuleEngine::new(initial_rules));

        if let Some(source) = rule_source.as_mut() {
            let engine = Arc::clone(&rule_engine);
            let registry = Arc::clone(&registry);
            source.subscribe(Arc::new(move |configs: Vec<RuleConfig>| {
                engine.install(RuleSet::from_configs(&configs, &registry));
            }))?;
        }

        let transmitter = self
            .transmitter
            .unwrap_or_else(|| Arc::new(HyperTransmitter::new(&self.config)));
        let selector = AddressSelector::new(
            self.resolver
                .unwrap_or_else(|| Arc::new(SystemResolver::new())),
            self.balancer
                .unwrap_or_else(|| Arc::new(RandomBalancer::new())),
        );

        let driver = Arc::new(AttemptDriver {
            config: self.config,
            filters: FilterChain::new(self.request_filters, self.response_filters),
            retry_policy: self
                .retry_policy
                .unwrap_or_else(|| Arc::new(DefaultRetryPolicy::new())),
            selector,
            codecs: self.codecs,
            transmitter,
            metrics: Arc::clone(&metrics),
        });

        // The rule interceptor is the mandatory first link; user
        // interceptors sort in behind it
        let mut interceptors: Vec<Arc<dyn Interceptor>> =
            Vec::with_capacity(self.interceptors.len() + 1);
        interceptors.push(Arc::new(RuleInterceptor::new(Arc::clone(&rule_engine))));
        interceptors.extend(self.interceptors);

        let chain = InvocationChain::new(interceptors, Arc::clone(&driver) as Arc<dyn TerminalStage>);

        Ok(RequestExecutor {
            chain,
            driver,
            metrics,
            rule_engine,
            _rule_source: rule_source,
        })
    }
}

impl Default for RequestExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The execution façade. Built once per client configuration; `execute`
/// drives one request through the invocation chain and resolves its future
/// exactly once.
pub struct RequestExecutor {
    chain: InvocationChain,
    driver: Arc<AttemptDriver>,
    metrics: Arc<ExecutorMetrics>,
    rule_engine: Arc<RuleEngine>,
    // Keeps the rule source (and its file watcher) alive with the executor
    _rule_source: Option<Box<dyn RuleSource>>,
}

impl RequestExecutor {
    pub fn builder() -> RequestExecutorBuilder {
        RequestExecutorBuilder::new()
    }

    /// Execute one request. Completes exactly once, with a response or a
    /// single terminal failure carrying the last cause and attempt context.
    pub async fn execute(&self, mut request: Request) -> EmissaryResult<Response> {
        let request_id = uuid::Uuid::new_v4().to_string();
        request
            .attributes_mut()
            .set(REQUEST_ID, request_id.clone());

        self.metrics.record_started();
        debug!(
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
            "Executing request"
        );

        match self.chain.run(request).await {
            Ok(response) => {
                self.metrics.record_succeeded();
                debug!(request_id = %request_id, status = %response.status(), "Request completed");
                Ok(response)
            }
            Err(e) => {
                self.metrics.record_failed();
                warn!(request_id = %request_id, error = %e, "Request failed");
                Err(e)
            }
        }
    }

    pub fn metrics(&self) -> ExecutorMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn resolver_metrics(&self) -> ResolverMetricsSnapshot {
        self.driver.selector.metrics()
    }

    /// Rule engine handle, for introspection or manual snapshot installs
    pub fn rule_engine(&self) -> &Arc<RuleEngine> {
        &self.rule_engine
    }
}

/// Terminal stage of the invocation chain: materializes the wire form of
/// the request, then drives resolution, filters, transport, retries, and
/// redirects for one logical request.
struct AttemptDriver {
    config: ExecutorConfig,
    filters: FilterChain,
    retry_policy: Arc<dyn RetryPolicy>,
    selector: AddressSelector,
    codecs: CodecRegistry,
    transmitter: Arc<dyn Transmitter>,
    metrics: Arc<ExecutorMetrics>,
}

#[async_trait]
impl TerminalStage for AttemptDriver {
    async fn send(&self, mut request: Request) -> EmissaryResult<Response> {
        // Rule rewrites have settled by the time the chain reaches its
        // terminal, so codec selection may now read the headers
        self.codecs.encode_body(&mut request)?;
        request.materialize_params()?;
        if request.expect_continue() && !request.body().is_empty() {
            request.set_header("expect", "100-continue")?;
        }

        let cancel = request
            .attributes()
            .get(CANCEL_TOKEN)
            .map(|token| token.as_ref().clone());
        let max_redirects = request.max_redirects().unwrap_or(self.config.max_redirects);
        let max_retries = request.max_retries().unwrap_or(self.config.max_retries);

        let mut redirects = 0usize;
        let mut current = request;
        loop {
            let response = self
                .dispatch_with_retries(&current, max_retries, cancel.as_ref())
                .await?;

            if !response.is_redirect() {
                return Ok(response);
            }

            if redirects >= max_redirects {
                return Err(EmissaryError::redirect_limit(max_redirects));
            }
            if is_cancelled(cancel.as_ref()) {
                return Err(EmissaryError::cancelled("redirect"));
            }

            let Some(next) = redirect::derive_redirect(&current, &response)? else {
                return Ok(response);
            };

            redirects += 1;
            self.metrics.record_redirect();
            debug!(
                location = response.location().unwrap_or(""),
                hop = redirects,
                "Following redirect"
            );
            current = next;
        }
    }
}

impl AttemptDriver {
    /// One dispatch target's retry loop. The retry counter is scoped here,
    /// so it restarts at each redirect hop; the redirect counter lives in
    /// the caller and spans the whole logical request.
    async fn dispatch_with_retries(
        &self,
        request: &Request,
        max_retries: u32,
        cancel: Option<&CancelToken>,
    ) -> EmissaryResult<Response> {
        let max_attempts = max_retries.saturating_add(1);
        let started = Instant::now();
        let mut state = RetryState::new();

        loop {
            state.elapsed = started.elapsed();

            match self.attempt_once(request.clone()).await {
                Ok(response) => {
                    let flagged =
                        self.retry_policy
                            .can_retry(request, Some(&response), &state, None);
                    if !flagged || state.attempt >= max_attempts || is_cancelled(cancel) {
                        return Ok(response);
                    }

                    debug!(
                        attempt = state.attempt,
                        status = %response.status(),
                        "Response flagged retryable, will retry"
                    );
                    self.pace_retry(state.attempt).await;
                    state.last_error = None;
                    state.attempt += 1;
                }
                Err(e) => {
                    if !self.retry_policy.can_retry(request, None, &state, Some(&e)) {
                        return Err(e);
                    }
                    if state.attempt >= max_attempts {
                        return Err(EmissaryError::retry_exhausted(state.attempt, e.to_string()));
                    }
                    if is_cancelled(cancel) {
                        return Err(EmissaryError::cancelled("retry"));
                    }

                    warn!(
                        attempt = state.attempt,
                        max_attempts,
                        error = %e,
                        "Attempt failed, will retry"
                    );
                    self.pace_retry(state.attempt).await;
                    state.last_error = Some(e);
                    state.attempt += 1;
                }
            }
        }
    }

    async fn pace_retry(&self, attempt: u32) {
        self.metrics.record_retry();
        if let Some(delay) = self.retry_policy.interval(attempt) {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One attempt: resolve an address, run the pre-write filters, transmit
    /// under the per-attempt timeout, run the post-header filters
    async fn attempt_once(&self, mut request: Request) -> EmissaryResult<Response> {
        let host = request
            .host()
            .map(str::to_string)
            .ok_or_else(|| EmissaryError::config("request URI has no host"))?;
        let port = request.port();

        match self.selector.resolve(&host, port).await? {
            Some(address) => {
                request.attributes_mut().set(RESOLVED_ADDRESS, address);
            }
            None => {
                return Err(EmissaryError::resolution(host, "no addresses resolved"));
            }
        }

        self.filters.apply_request(&mut request).await?;

        let response = match self.config.attempt_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.transmitter.transmit(&request))
                .await
                .map_err(|_| EmissaryError::timeout(limit, "attempt"))??,
            None => self.transmitter.transmit(&request).await?,
        };

        self.filters.apply_response(&response).await?;
        Ok(response)
    }
}

fn is_cancelled(token: Option<&CancelToken>) -> bool {
    token.map(CancelToken::is_cancelled).unwrap_or(false)
}
