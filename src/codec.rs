//! Body codec selection keyed by content type.
//!
//! The registry is populated explicitly by the host application; the
//! executor consults it once per request, after rule-engine rewrites have
//! settled the headers.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{EmissaryError, EmissaryResult};
use crate::message::{Body, Request};

/// Encodes and decodes bodies for one content type
pub trait BodyCodec: Send + Sync {
    /// The essence content type this codec serves, e.g. `application/json`
    fn content_type(&self) -> &str;

    fn encode(&self, value: &serde_json::Value) -> EmissaryResult<Bytes>;

    fn decode(&self, bytes: &[u8]) -> EmissaryResult<serde_json::Value>;
}

/// JSON codec on serde_json, registered by default
#[derive(Debug, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &serde_json::Value) -> EmissaryResult<Bytes> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| EmissaryError::codec(self.content_type(), format!("encode: {}", e)))?;
        Ok(Bytes::from(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> EmissaryResult<serde_json::Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| EmissaryError::codec(self.content_type(), format!("decode: {}", e)))
    }
}

/// Registry mapping essence content types to codecs
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn BodyCodec>>,
}

impl CodecRegistry {
    /// Empty registry without the default codecs
    pub fn new() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registry with the built-in JSON codec
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonCodec));
        registry
    }

    pub fn register(&mut self, codec: Arc<dyn BodyCodec>) {
        self.codecs.insert(essence(codec.content_type()), codec);
    }

    /// Look up the codec for a declared or negotiated content type;
    /// parameters such as `charset` are ignored
    pub fn lookup(&self, content_type: &str) -> Option<Arc<dyn BodyCodec>> {
        self.codecs.get(&essence(content_type)).cloned()
    }

    /// Encode a deferred body in place.
    ///
    /// Reads the request's Content-Type header to select the codec, which is
    /// why the executor calls this only after the rule engine ran. Requests
    /// without a deferred body pass through untouched.
    pub fn encode_body(&self, request: &mut Request) -> EmissaryResult<()> {
        let value = match request.body() {
            Body::Json(value) => value.clone(),
            _ => return Ok(()),
        };

        let declared = request
            .header("content-type")
            .unwrap_or("application/json")
            .to_string();
        let codec = self
            .lookup(&declared)
            .ok_or_else(|| EmissaryError::codec(&declared, "no codec registered"))?;

        let bytes = codec.encode(&value)?;
        if request.header("content-type").is_none() {
            request.set_header("content-type", codec.content_type())?;
        }
        request.set_body(Body::Bytes(bytes));
        Ok(())
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
