//! Asynchronous HTTP request engine.
//!
//! # Overview
//! Callers build a `Request` from an `Engine`, call `exec()`, and get back a
//! `ResponseFuture` that resolves to a `Response`: either what the server
//! sent or the transport error that prevented it, together with how long the
//! request queued and how long the network round-trip took.
//!
//! # Design
//! - `Engine` owns a pooled `reqwest` client, an I/O runtime that runs the
//!   calls and a completion runtime that builds responses. It is disposed on
//!   drop.
//! - Transport failures are data (`Outcome::Failure`), so one failing
//!   request never aborts a batch.
//! - Typed bodies go through the `Codec` trait; `JsonCodec` adapts
//!   serde_json and requires every type to be registered up front.
//! - Request ids come from a counter owned by each engine.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod transport;
pub mod uri;

pub use codec::{Codec, CodecError, JsonCodec, TypeKey};
pub use config::{Config, ConfigBuilder, Proxy};
pub use engine::{Engine, EngineState, ResponseFuture};
pub use error::{Error, Result};
pub use http::HttpMethod;
pub use request::Request;
pub use response::{Latency, Outcome, Response};
pub use transport::{TransportError, TransportResult};
pub use uri::{IntoUrl, UriBuilder};
