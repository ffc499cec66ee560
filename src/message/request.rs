use std::str::FromStr;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Uri};

use super::attributes::Attributes;
use crate::error::{EmissaryError, EmissaryResult};

/// Body descriptor for an outgoing request.
///
/// `Json` is a deferred body: the codec registry encodes it right before the
/// first transmit attempt, after rule-engine rewrites have settled the
/// headers. All variants are cheap to clone, so retry attempts can replay
/// the body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Json(_) => false,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Bytes(Bytes::from(text))
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

/// Outgoing request, mutable until handed to the executor.
///
/// `RequestExecutor::execute` takes the request by value; once transmission
/// starts nothing else can touch it, which is how the freeze-on-transmit
/// contract is enforced.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: Vec<(String, String)>,
    body: Body,
    max_redirects: Option<usize>,
    max_retries: Option<u32>,
    expect_continue: bool,
    attributes: Attributes,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            params: Vec::new(),
            body: Body::Empty,
            max_redirects: None,
            max_retries: None,
            expect_continue: false,
            attributes: Attributes::new(),
        }
    }

    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    pub fn post(uri: Uri) -> Self {
        Self::new(Method::POST, uri)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn set_uri(&mut self, uri: Uri) {
        self.uri = uri;
    }

    /// Hostname component of the URI, if any
    pub fn host(&self) -> Option<&str> {
        self.uri.host()
    }

    /// Port of the URI, falling back to the scheme default
    pub fn port(&self) -> u16 {
        self.uri.port_u16().unwrap_or_else(|| {
            if self.uri.scheme_str() == Some("https") {
                443
            } else {
                80
            }
        })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set a header, replacing existing values
    pub fn set_header(&mut self, name: &str, value: &str) -> EmissaryResult<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Add a header, preserving existing values
    pub fn add_header(&mut self, name: &str, value: &str) -> EmissaryResult<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Remove all values of a header, reporting whether any existed
    pub fn remove_header(&mut self, name: &str) -> bool {
        match HeaderName::from_str(name) {
            Ok(name) => self.headers.remove(&name).is_some(),
            Err(_) => false,
        }
    }

    /// First value of a header, empty-lossy on non-UTF8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parameter multimap entries added on top of the URI query
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Add a parameter, preserving existing values under the same name
    pub fn add_param<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.params.push((name.into(), value.into()));
    }

    /// Set a parameter, replacing all existing values under the same name
    pub fn set_param<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let name = name.into();
        self.params.retain(|(n, _)| n != &name);
        self.params.push((name, value.into()));
    }

    /// Remove all values of a parameter, reporting whether any existed
    pub fn remove_param(&mut self, name: &str) -> bool {
        let before = self.params.len();
        self.params.retain(|(n, _)| n != name);
        self.params.len() != before
    }

    /// All query pairs visible to matchers: URI query first, then the
    /// parameter multimap in insertion order
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .uri
            .query()
            .map(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();
        pairs.extend(self.params.iter().cloned());
        pairs
    }

    /// Fold the parameter multimap into the URI query string.
    ///
    /// Called once by the executor when transmission starts; afterwards the
    /// multimap is empty and the URI carries the full query.
    pub fn materialize_params(&mut self) -> EmissaryResult<()> {
        if self.params.is_empty() {
            return Ok(());
        }

        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.params.drain(..) {
            serializer.append_pair(&name, &value);
        }
        let appended = serializer.finish();

        let merged = match self.uri.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, appended),
            _ => appended,
        };

        let path = self.uri.path().to_string();
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(
            format!("{}?{}", path, merged)
                .parse()
                .map_err(|e| EmissaryError::internal(format!("rebuilding query failed: {}", e)))?,
        );
        self.uri = Uri::from_parts(parts)
            .map_err(|e| EmissaryError::internal(format!("rebuilding URI failed: {}", e)))?;
        Ok(())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn set_body<B: Into<Body>>(&mut self, body: B) {
        self.body = body.into();
    }

    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn max_redirects(&self) -> Option<usize> {
        self.max_redirects
    }

    /// Per-request override for the redirect depth bound
    pub fn set_max_redirects(&mut self, limit: usize) {
        self.max_redirects = Some(limit);
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Per-request override for the retry budget
    pub fn set_max_retries(&mut self, budget: u32) {
        self.max_retries = Some(budget);
    }

    pub fn expect_continue(&self) -> bool {
        self.expect_continue
    }

    pub fn set_expect_continue(&mut self, enabled: bool) {
        self.expect_continue = enabled;
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }
}

fn parse_header(name: &str, value: &str) -> EmissaryResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_str(name)
        .map_err(|e| EmissaryError::config(format!("invalid header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| EmissaryError::config(format!("invalid header value for '{}': {}", name, e)))?;
    Ok((name, value))
}
