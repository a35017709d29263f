//! Error types for the request engine.
//!
//! # Design
//! Transport failures are not errors at this level: they are captured as
//! data inside a failed `Response` so a batch of requests can complete
//! independently. `Error` covers everything else the caller can get wrong:
//! configuration, lifecycle misuse, reading a failed response as if it
//! succeeded, and codec problems.

use crate::codec::CodecError;
use crate::engine::EngineState;

/// Errors returned by the engine, requests and responses.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The configuration was rejected while initializing the engine.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The I/O reactor or the completion executor could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// The pooled transport client could not be built.
    #[error("failed to build transport client: {0}")]
    Client(String),

    /// Work was submitted to an engine that is not `Ready`.
    #[error("engine is not ready (state: {0})")]
    NotReady(EngineState),

    /// A success-only accessor was called on a failed response.
    #[error("invalid response")]
    InvalidResponse,

    /// A typed body was requested but the engine has no codec.
    #[error("no codec configured")]
    NoCodec,

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, Error>;
