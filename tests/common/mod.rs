//! Shared fixtures for integration tests: a resolver that never touches the
//! network and a scriptable, recording transmitter.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use emissary::{EmissaryResult, HostResolver, Request, Response, Transmitter};

/// Resolves every host to 127.0.0.1 on the requested port
pub struct FixedResolver;

#[async_trait]
impl HostResolver for FixedResolver {
    async fn resolve_all(&self, _host: &str, port: u16) -> EmissaryResult<Vec<SocketAddr>> {
        Ok(vec![SocketAddr::from(([127, 0, 0, 1], port))])
    }
}

/// Replays a scripted sequence of outcomes and records every request it was
/// handed; once the script runs dry it answers 200
pub struct ScriptedTransmitter {
    script: Mutex<VecDeque<EmissaryResult<Response>>>,
    seen: Mutex<Vec<Request>>,
    attempts: AtomicU32,
}

impl ScriptedTransmitter {
    pub fn new(script: Vec<EmissaryResult<Response>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
        })
    }

    pub fn always_ok() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Requests exactly as they reached the transport boundary
    pub fn seen(&self) -> Vec<Request> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transmitter for ScriptedTransmitter {
    async fn transmit(&self, request: &Request) -> EmissaryResult<Response> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.seen.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Response::builder().status(200).build())
    }
}

pub fn ok(status: u16) -> EmissaryResult<Response> {
    Response::builder().status(status).build()
}

pub fn redirect(status: u16, location: &str) -> EmissaryResult<Response> {
    Response::builder()
        .status(status)
        .header("location", location)
        .build()
}

pub fn request(uri: &str) -> Request {
    Request::get(uri.parse().unwrap())
}
