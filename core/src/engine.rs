//! Dispatch engine.
//!
//! # Design
//! An `Engine` owns two fixed-size tokio runtimes. The I/O reactor runs every
//! transport call. The completion executor awaits those calls, builds the
//! `Response`, stamps latency and resolves the caller's future, so caller
//! code never runs on a reactor thread. Both are sized by `io_threads`.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Ready -> Disposing ->
//! Disposed`. Only `Ready` accepts work. Dropping the `Engine` disposes it,
//! so resources are released on every exit path without exit hooks.
//!
//! Requests and responses keep an `Arc<Shared>` for their id counter,
//! config and codec. They never keep the runtimes alive: those live in the
//! lifecycle slot and are taken out by `dispose`.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::codec::Codec;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::request::Request;
use crate::response::{Latency, Outcome, Response};
use crate::transport::{Transport, TransportError};
use crate::uri::IntoUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Initializing,
    Ready,
    Disposing,
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Disposing => "disposing",
            EngineState::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

struct Resources {
    io: Runtime,
    completion: Runtime,
    transport: Transport,
}

enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready(Resources),
    Disposing,
    Disposed,
}

impl Lifecycle {
    fn state(&self) -> EngineState {
        match self {
            Lifecycle::Uninitialized => EngineState::Uninitialized,
            Lifecycle::Initializing => EngineState::Initializing,
            Lifecycle::Ready(_) => EngineState::Ready,
            Lifecycle::Disposing => EngineState::Disposing,
            Lifecycle::Disposed => EngineState::Disposed,
        }
    }
}

pub(crate) struct Shared {
    config: Config,
    next_id: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn codec(&self) -> Result<&Arc<dyn Codec>> {
        self.config.codec().ok_or(Error::NoCodec)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(self: &Arc<Self>, method: HttpMethod, url: String) -> Request {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Request::new(Arc::clone(self), id, method, url)
    }

    pub(crate) fn process(&self, request: Request) -> Result<ResponseFuture> {
        let (io, completion, transport) = match &*self.lifecycle() {
            Lifecycle::Ready(resources) => (
                resources.io.handle().clone(),
                resources.completion.handle().clone(),
                resources.transport.clone(),
            ),
            other => return Err(Error::NotReady(other.state())),
        };

        let dispatch_start = Instant::now();
        let queueing = dispatch_start.saturating_duration_since(request.created_at());
        debug!(
            id = request.id(),
            method = %request.method(),
            url = request.url(),
            "dispatching request"
        );

        let call = transport.prepare(&request);
        let pending = io.spawn(transport.submit(call));

        let request = Arc::new(request);
        let origin = Arc::clone(&request);
        let (tx, rx) = oneshot::channel();
        completion.spawn(async move {
            let outcome = match pending.await {
                Ok(Ok(result)) => Outcome::from(result),
                Ok(Err(cause)) => Outcome::from(cause),
                Err(join) => Outcome::from(TransportError::Abandoned(join.to_string())),
            };
            let latency = Latency::new(queueing, dispatch_start.elapsed());
            match &outcome {
                Outcome::Success { status, .. } => {
                    debug!(id = origin.id(), status, %latency, "request completed")
                }
                Outcome::Failure { cause } => {
                    warn!(id = origin.id(), %cause, %latency, "request failed")
                }
            }
            // The caller may have dropped its future.
            let _ = tx.send(Response::new(origin, outcome, latency));
        });

        Ok(ResponseFuture {
            receiver: rx,
            request,
            queueing,
            dispatch_start,
        })
    }

    fn build_resources(&self) -> Result<Resources> {
        let config = &self.config;
        if config.io_threads() == 0 {
            return Err(Error::Config("io_threads must be greater than zero".into()));
        }
        if config.max_connections() == 0 {
            return Err(Error::Config(
                "max_connections must be greater than zero".into(),
            ));
        }
        if config.timeout().is_zero() {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }

        let transport = Transport::new(config)?;
        match config.proxy() {
            Some(proxy) => info!(host = %proxy.host, port = proxy.port, "proxy is configured"),
            None => info!("no proxy configured"),
        }

        let io = runtime("requests-io", config.io_threads())?;
        let completion = match runtime("requests-completion", config.io_threads()) {
            Ok(completion) => completion,
            Err(e) => {
                shutdown("io", io, config.timeout());
                return Err(e);
            }
        };

        Ok(Resources {
            io,
            completion,
            transport,
        })
    }
}

fn runtime(name: &'static str, threads: usize) -> Result<Runtime> {
    let counter = AtomicU64::new(0);
    Ok(Builder::new_multi_thread()
        .worker_threads(threads)
        .thread_name_fn(move || format!("{name}-{}", counter.fetch_add(1, Ordering::Relaxed)))
        .enable_all()
        .build()?)
}

/// Shut a runtime down without blocking inside an async context, where
/// tokio forbids it.
fn shutdown(name: &str, runtime: Runtime, grace: Duration) {
    if Handle::try_current().is_ok() {
        debug!(runtime = name, "shutting down in background");
        runtime.shutdown_background();
    } else {
        runtime.shutdown_timeout(grace);
    }
}

/// Asynchronous HTTP request engine.
///
/// Build requests with [`Engine::get`], [`Engine::post`], [`Engine::put`]
/// or [`Engine::delete`] and run them with [`Request::exec`].
pub struct Engine {
    shared: Arc<Shared>,
}

impl Engine {
    /// Create an engine in the `Uninitialized` state. The configuration is
    /// frozen from here on.
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                next_id: AtomicU64::new(0),
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
            }),
        }
    }

    /// Create and initialize an engine.
    pub fn start(config: Config) -> Result<Self> {
        let engine = Self::new(config);
        engine.initialize()?;
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn state(&self) -> EngineState {
        self.shared.lifecycle().state()
    }

    /// Start the I/O reactor, transport client and completion executor.
    ///
    /// On failure the engine stays `Uninitialized`.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lifecycle();
            match &*lifecycle {
                Lifecycle::Uninitialized => *lifecycle = Lifecycle::Initializing,
                other => return Err(Error::NotReady(other.state())),
            }
        }

        let config = &self.shared.config;
        info!("initializing engine");
        info!(timeout_ms = config.timeout().as_millis() as u64, "> timeout");
        info!(io_threads = config.io_threads(), "> io threads");
        info!(max_connections = config.max_connections(), "> max connections");

        match self.shared.build_resources() {
            Ok(resources) => {
                *self.shared.lifecycle() = Lifecycle::Ready(resources);
                info!("engine is initialized");
                Ok(())
            }
            Err(e) => {
                *self.shared.lifecycle() = Lifecycle::Uninitialized;
                error!(error = %e, "failed to initialize engine");
                Err(e)
            }
        }
    }

    /// Release the runtimes and the transport client.
    ///
    /// Safe to call more than once; only the first call on a `Ready`
    /// engine does anything beyond logging.
    pub fn dispose(&self) {
        let resources = {
            let mut lifecycle = self.shared.lifecycle();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Disposing) {
                Lifecycle::Ready(resources) => resources,
                Lifecycle::Uninitialized => {
                    *lifecycle = Lifecycle::Uninitialized;
                    warn!("engine is NOT initialized");
                    return;
                }
                other => {
                    debug!(state = %other.state(), "engine is not ready, nothing to dispose");
                    *lifecycle = other;
                    return;
                }
            }
        };

        info!("disposing engine");
        let grace = self.shared.config.timeout();
        let Resources {
            io,
            completion,
            transport,
        } = resources;
        shutdown("io", io, grace);
        transport.close();
        drop(transport);
        shutdown("completion", completion, grace);

        *self.shared.lifecycle() = Lifecycle::Disposed;
        info!("engine is disposed");
    }

    pub fn get(&self, url: impl IntoUrl) -> Request {
        self.shared.request(HttpMethod::Get, url.into_url())
    }

    pub fn post(&self, url: impl IntoUrl) -> Request {
        self.shared.request(HttpMethod::Post, url.into_url())
    }

    pub fn put(&self, url: impl IntoUrl) -> Request {
        self.shared.request(HttpMethod::Put, url.into_url())
    }

    pub fn delete(&self, url: impl IntoUrl) -> Request {
        self.shared.request(HttpMethod::Delete, url.into_url())
    }

    /// Dispatch `request` and return a future for its response.
    ///
    /// Never blocks. Transport failures resolve the future with a failed
    /// `Response`; only lifecycle misuse is reported here.
    pub fn process(&self, request: Request) -> Result<ResponseFuture> {
        self.shared.process(request)
    }

    /// Decode `input` with the configured codec.
    pub fn to_object<T: Any>(&self, input: &[u8]) -> Result<T> {
        Ok(self.shared.codec()?.decode::<T>(input)?)
    }

    /// Encode `value` with the configured codec.
    pub fn to_json<T: Any>(&self, value: &T) -> Result<String> {
        let bytes = self.shared.codec()?.encode(value)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("config", &self.shared.config)
            .finish()
    }
}

/// Resolves to the `Response` of one dispatched request.
///
/// Always resolves: if the engine is disposed before the call completes,
/// the response is a failure with `TransportError::Abandoned`.
pub struct ResponseFuture {
    receiver: oneshot::Receiver<Response>,
    request: Arc<Request>,
    queueing: Duration,
    dispatch_start: Instant,
}

impl ResponseFuture {
    pub fn request_id(&self) -> u64 {
        self.request.id()
    }

    /// Block the current thread until the response arrives.
    ///
    /// Must not be called from inside an async context; `.await` the future
    /// there instead.
    pub fn wait(self) -> Response {
        let ResponseFuture {
            receiver,
            request,
            queueing,
            dispatch_start,
        } = self;
        receiver
            .blocking_recv()
            .unwrap_or_else(|_| abandoned(request, queueing, dispatch_start))
    }
}

fn abandoned(request: Arc<Request>, queueing: Duration, dispatch_start: Instant) -> Response {
    let latency = Latency::new(queueing, dispatch_start.elapsed());
    let cause = TransportError::Abandoned("engine disposed before completion".to_string());
    Response::new(request, Outcome::from(cause), latency)
}

impl Future for ResponseFuture {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Response> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(response)) => Poll::Ready(response),
            Poll::Ready(Err(_)) => Poll::Ready(abandoned(
                Arc::clone(&this.request),
                this.queueing,
                this.dispatch_start,
            )),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("request_id", &self.request.id())
            .finish()
    }
}
