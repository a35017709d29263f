//! Pooled HTTP transport.
//!
//! # Design
//! This is the only module that touches `reqwest`. The engine sees three
//! things: a per-method call builder, a future that runs the call, and a
//! `TransportResult` or `TransportError` once it completes.
//!
//! `reqwest` pools connections per host but has no global connection cap,
//! so every call first takes a permit from a semaphore sized
//! `max_connections`. Global and per-host caps are equal, so that one gate
//! enforces both. `timeout` bounds the permit wait and the call together,
//! so a backlog behind the gate cannot hold a call past it. A proxy is a
//! client-level setting in `reqwest`; it is installed on the client and
//! therefore applies to every call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::Error;
use crate::http::HttpMethod;
use crate::request::Request;

/// What the server sent back.
#[derive(Debug, Clone)]
pub struct TransportResult {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Why a call produced no `TransportResult`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The configured timeout elapsed while connecting or awaiting the response.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built or sent (bad URL, bad header, protocol error).
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(String),

    /// The engine was disposed before the call completed.
    #[error("call abandoned: {0}")]
    Abandoned(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

type CallBuilder = fn(&Client, &str) -> RequestBuilder;

/// One call builder per method, indexed by `HttpMethod::index`.
#[derive(Clone, Copy)]
struct DispatchTable([CallBuilder; 4]);

impl DispatchTable {
    fn new() -> Self {
        // Same order as `HttpMethod::ALL`.
        Self([
            |client: &Client, url: &str| client.get(url),
            |client: &Client, url: &str| client.post(url),
            |client: &Client, url: &str| client.put(url),
            |client: &Client, url: &str| client.delete(url),
        ])
    }

    fn builder(&self, method: HttpMethod) -> CallBuilder {
        self.0[method.index()]
    }
}

#[derive(Clone)]
pub(crate) struct Transport {
    client: Client,
    gate: Arc<Semaphore>,
    calls: DispatchTable,
    timeout: Duration,
}

impl Transport {
    pub(crate) fn new(config: &Config) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .pool_max_idle_per_host(config.max_connections());

        builder = match config.proxy() {
            Some(proxy) => builder.proxy(
                reqwest::Proxy::all(proxy.url())
                    .map_err(|e| Error::Config(format!("invalid proxy {}: {e}", proxy.url())))?,
            ),
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self {
            client,
            gate: Arc::new(Semaphore::new(config.max_connections())),
            calls: DispatchTable::new(),
            timeout: config.timeout(),
        })
    }

    /// Build the call for `request` with its URL, headers and body attached.
    pub(crate) fn prepare(&self, request: &Request) -> RequestBuilder {
        let mut call = (self.calls.builder(request.method()))(&self.client, request.url());
        for (name, value) in request.headers() {
            call = call.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_bytes() {
            call = call.body(body.to_vec());
        }
        call
    }

    /// Run `call` once a connection permit is available, failing with
    /// `TransportError::Timeout` if both together exceed the timeout.
    pub(crate) fn submit(
        &self,
        call: RequestBuilder,
    ) -> impl Future<Output = Result<TransportResult, TransportError>> + Send + 'static {
        let gate = Arc::clone(&self.gate);
        let timeout = self.timeout;
        async move {
            tokio::time::timeout(timeout, send(gate, call))
                .await
                .unwrap_or(Err(TransportError::Timeout))
        }
    }

    /// Stop handing out connection permits; queued calls fail as abandoned.
    pub(crate) fn close(&self) {
        self.gate.close();
    }
}

async fn send(
    gate: Arc<Semaphore>,
    call: RequestBuilder,
) -> Result<TransportResult, TransportError> {
    let _permit = gate
        .acquire_owned()
        .await
        .map_err(|_| TransportError::Abandoned("connection gate closed".to_string()))?;

    let response = call.send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::Body(e.to_string()))?;

    Ok(TransportResult {
        status,
        headers,
        body: body.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table_covers_every_method() {
        let client = Client::new();
        let table = DispatchTable::new();
        for method in HttpMethod::ALL {
            let request = (table.builder(method))(&client, "http://localhost/")
                .build()
                .unwrap();
            assert_eq!(request.method().as_str(), method.as_str());
        }
    }

    #[test]
    fn ipv6_proxy_is_accepted() {
        let config = Config::builder().proxy("::1", 3128).build();
        assert!(Transport::new(&config).is_ok());
    }

    #[test]
    fn prepared_call_carries_headers_and_body() {
        let config = Config::builder()
            .proxy("127.0.0.1", 3128)
            .default_header("X-Client", "requests")
            .build();
        let transport = Transport::new(&config).unwrap();
        let engine = crate::Engine::new(config);
        let request = engine.put("http://localhost/items/1").body_text("payload");

        let call = transport.prepare(&request).build().unwrap();
        assert_eq!(call.method().as_str(), "PUT");
        assert_eq!(call.url().as_str(), "http://localhost/items/1");
        assert_eq!(call.headers()["x-client"], "requests");
        let body = call.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"payload");
    }
}
