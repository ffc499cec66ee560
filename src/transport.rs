//! Transport boundary: the opaque terminal transmitter.
//!
//! The execution core only needs "send this fully-built request and produce
//! a response"; connection acquisition, TLS, and framing live behind this
//! trait. A pooled hyper-based implementation ships as the default.

use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::Client;
use once_cell::sync::Lazy;

use crate::error::{EmissaryError, EmissaryResult};
use crate::executor::ExecutorConfig;
use crate::message::{Body, Request, Response};

/// Terminal transport stage: transmit one fully-built request
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn transmit(&self, request: &Request) -> EmissaryResult<Response>;
}

type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, hyper::Body>;

/// Process-wide pooled client for `HyperTransmitter::shared()`; a single
/// instance keeps connection reuse across executors
static SHARED_CLIENT: Lazy<HttpsClient> = Lazy::new(|| build_client(&ExecutorConfig::default()));

/// Default transmitter on hyper with rustls (both http and https upstreams)
pub struct HyperTransmitter {
    client: HttpsClient,
}

impl HyperTransmitter {
    /// Client with pool tunables taken from the executor configuration
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            client: build_client(config),
        }
    }

    /// Transmitter reusing the process-wide pooled client
    pub fn shared() -> Self {
        Self {
            client: SHARED_CLIENT.clone(),
        }
    }
}

fn build_client(config: &ExecutorConfig) -> HttpsClient {
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_nodelay(true);

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    Client::builder()
        .pool_idle_timeout(Duration::from_secs(
            config.pool_idle_timeout_secs.unwrap_or(90),
        ))
        .pool_max_idle_per_host(config.pool_max_idle_per_host.unwrap_or(32))
        .build::<_, hyper::Body>(https)
}

#[async_trait]
impl Transmitter for HyperTransmitter {
    async fn transmit(&self, request: &Request) -> EmissaryResult<Response> {
        let wire = build_wire_request(request)?;
        let response = self.client.request(wire).await?;
        buffer_response(response).await
    }
}

fn build_wire_request(request: &Request) -> EmissaryResult<hyper::Request<hyper::Body>> {
    let mut builder = hyper::Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone());

    for (name, value) in request.headers() {
        builder = builder.header(name, value);
    }

    let body = match request.body() {
        Body::Empty => hyper::Body::empty(),
        Body::Bytes(bytes) => hyper::Body::from(bytes.clone()),
        Body::Json(_) => {
            return Err(EmissaryError::internal(
                "deferred body reached the transport unencoded",
            ))
        }
    };

    builder.body(body).map_err(Into::into)
}

async fn buffer_response(response: hyper::Response<hyper::Body>) -> EmissaryResult<Response> {
    let (parts, body) = response.into_parts();
    let bytes = hyper::body::to_bytes(body).await?;
    Ok(Response::from_parts(
        parts.status,
        parts.version,
        parts.headers,
        hyper::HeaderMap::new(),
        bytes,
    ))
}
