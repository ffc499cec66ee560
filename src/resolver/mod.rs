//! Hostname resolution composed with load-balanced address selection.

mod balancer;

pub use balancer::{LoadBalancer, RandomBalancer, RoundRobinBalancer};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::lookup_host;
use tracing::debug;
use trust_dns_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

use crate::error::{EmissaryError, EmissaryResult};
use crate::metrics::{ResolverMetrics, ResolverMetricsSnapshot};

/// Asynchronous hostname resolution. Implementations return the full
/// candidate set; they do not cache unless they opt in themselves.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_all(&self, host: &str, port: u16) -> EmissaryResult<Vec<SocketAddr>>;
}

/// Resolution through the platform's system resolver
#[derive(Debug, Default)]
pub struct SystemResolver;

impl SystemResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve_all(&self, host: &str, port: u16) -> EmissaryResult<Vec<SocketAddr>> {
        let addrs = lookup_host((host, port))
            .await
            .map_err(|e| EmissaryError::resolution(host, format!("lookup failed: {}", e)))?;
        Ok(addrs.collect())
    }
}

/// Configuration for the trust-dns resolver
#[derive(Debug, Clone)]
pub struct DnsResolverConfig {
    /// DNS servers to use for resolution
    pub nameservers: Vec<SocketAddr>,
    /// Resolution timeout
    pub timeout: Duration,
}

impl Default for DnsResolverConfig {
    fn default() -> Self {
        Self {
            nameservers: vec!["8.8.8.8:53".parse().unwrap(), "8.8.4.4:53".parse().unwrap()],
            timeout: Duration::from_secs(5),
        }
    }
}

/// Resolution through trust-dns with explicit nameservers, for callers that
/// must not depend on the platform resolver
pub struct TrustDnsResolver {
    resolver: TokioAsyncResolver,
}

impl TrustDnsResolver {
    pub fn new(config: DnsResolverConfig) -> Self {
        let resolver_config = ResolverConfig::from_parts(
            None,
            vec![],
            config
                .nameservers
                .iter()
                .map(|addr| NameServerConfig::new(*addr, Protocol::Udp))
                .collect::<Vec<_>>(),
        );

        let mut opts = ResolverOpts::default();
        opts.timeout = config.timeout;

        Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        }
    }

    pub fn new_default() -> Self {
        Self::new(DnsResolverConfig::default())
    }
}

#[async_trait]
impl HostResolver for TrustDnsResolver {
    async fn resolve_all(&self, host: &str, port: u16) -> EmissaryResult<Vec<SocketAddr>> {
        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| EmissaryError::resolution(host, format!("DNS lookup failed: {}", e)))?;
        Ok(lookup.iter().map(|ip| SocketAddr::new(ip, port)).collect())
    }
}

/// Resolver composed with a load-balancing strategy: one address out of the
/// resolved candidate set.
pub struct AddressSelector {
    resolver: Arc<dyn HostResolver>,
    balancer: Arc<dyn LoadBalancer>,
    metrics: ResolverMetrics,
}

impl AddressSelector {
    pub fn new(resolver: Arc<dyn HostResolver>, balancer: Arc<dyn LoadBalancer>) -> Self {
        Self {
            resolver,
            balancer,
            metrics: ResolverMetrics::new(),
        }
    }

    /// Resolve the host and pick one address.
    ///
    /// An empty candidate set yields `Ok(None)`: resolution failed, and the
    /// caller must not treat that as an attempt worth retrying.
    pub async fn resolve(&self, host: &str, port: u16) -> EmissaryResult<Option<SocketAddr>> {
        self.metrics.record_lookup();

        let candidates = match self.resolver.resolve_all(host, port).await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.metrics.record_failure();
                return Err(e);
            }
        };

        if candidates.is_empty() {
            self.metrics.record_empty();
            debug!(host, "Resolution produced no addresses");
            return Ok(None);
        }

        Ok(self.balancer.select(&candidates))
    }

    pub fn metrics(&self) -> ResolverMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(Vec<SocketAddr>);

    #[async_trait]
    impl HostResolver for FixedResolver {
        async fn resolve_all(&self, _host: &str, _port: u16) -> EmissaryResult<Vec<SocketAddr>> {
            Ok(self.0.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl HostResolver for FailingResolver {
        async fn resolve_all(&self, host: &str, _port: u16) -> EmissaryResult<Vec<SocketAddr>> {
            Err(EmissaryError::resolution(host, "servfail"))
        }
    }

    #[tokio::test]
    async fn test_system_resolver_localhost() {
        let _ = tokio::time::timeout(Duration::from_secs(5), async {
            let resolver = SystemResolver::new();
            let addrs = resolver.resolve_all("localhost", 8080).await.unwrap();
            assert!(!addrs.is_empty());
            assert!(addrs.iter().all(|a| a.port() == 8080));
        })
        .await
        .expect("test_system_resolver_localhost timed out");
    }

    #[tokio::test]
    async fn test_selector_empty_set_is_none() {
        let selector = AddressSelector::new(
            Arc::new(FixedResolver(vec![])),
            Arc::new(RoundRobinBalancer::new()),
        );

        let selected = selector.resolve("empty.example.com", 80).await.unwrap();
        assert!(selected.is_none());

        let metrics = selector.metrics();
        assert_eq!(metrics.lookups, 1);
        assert_eq!(metrics.empty_results, 1);
        assert_eq!(metrics.failures, 0);
    }

    #[tokio::test]
    async fn test_selector_picks_from_candidates() {
        let candidates: Vec<SocketAddr> =
            vec!["10.0.0.1:80".parse().unwrap(), "10.0.0.2:80".parse().unwrap()];
        let selector = AddressSelector::new(
            Arc::new(FixedResolver(candidates.clone())),
            Arc::new(RandomBalancer::new()),
        );

        let selected = selector.resolve("two.example.com", 80).await.unwrap().unwrap();
        assert!(candidates.contains(&selected));
    }

    #[tokio::test]
    async fn test_selector_propagates_failures() {
        let selector = AddressSelector::new(
            Arc::new(FailingResolver),
            Arc::new(RandomBalancer::new()),
        );

        let err = selector.resolve("broken.example.com", 80).await.unwrap_err();
        assert!(matches!(err, EmissaryError::Resolution { .. }));
        assert_eq!(selector.metrics().failures, 1);
    }
}
