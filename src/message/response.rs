use std::str::FromStr;

use bytes::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use hyper::{StatusCode, Version};

use crate::error::{EmissaryError, EmissaryResult};

/// Completed response for one attempt. Immutable once built.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    trailers: HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    /// Assemble a response from already-typed parts; used by transmitters
    /// that buffer a wire response
    pub fn from_parts(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        trailers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            status,
            version,
            headers,
            trailers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// First value of a header, None on absence or non-UTF8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether this response is a redirect an executor should follow
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.headers.contains_key(LOCATION)
    }

    /// The Location header of a redirect response
    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
    }
}

/// Builder for responses, used by transmitters and synthetic-response
/// actions. Invalid parts are deferred and surface once at `build()`.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    trailers: HeaderMap,
    body: Bytes,
    error: Option<EmissaryError>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        match StatusCode::from_u16(status) {
            Ok(status) => self.status = status,
            Err(e) => self.set_error(EmissaryError::config(format!("invalid status: {}", e))),
        }
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => self.set_error(e),
        }
        self
    }

    pub fn trailer(mut self, name: &str, value: &str) -> Self {
        match parse_header(name, value) {
            Ok((name, value)) => {
                self.trailers.append(name, value);
            }
            Err(e) => self.set_error(e),
        }
        self
    }

    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> EmissaryResult<Response> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Response {
            status: self.status,
            version: self.version,
            headers: self.headers,
            trailers: self.trailers,
            body: self.body,
        })
    }

    fn set_error(&mut self, error: EmissaryError) {
        // First error wins
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

fn parse_header(name: &str, value: &str) -> EmissaryResult<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_str(name)
        .map_err(|e| EmissaryError::config(format!("invalid header name '{}': {}", name, e)))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| EmissaryError::config(format!("invalid header value for '{}': {}", name, e)))?;
    Ok((name, value))
}
