//! Completed request outcome.
//!
//! # Design
//! A `Response` is built exactly once, by the engine's completion executor,
//! and never changes afterwards. Its `Outcome` is either a success carrying
//! what the server sent or a failure carrying the transport error. Reading
//! status, headers or body from a failure returns `Error::InvalidResponse`
//! instead of a made-up default.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::http::HEADER_CONTENT_TYPE;
use crate::request::Request;
use crate::transport::{TransportError, TransportResult};

/// Time spent before and during the network round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Latency {
    queueing: Duration,
    network: Duration,
}

impl Latency {
    pub fn new(queueing: Duration, network: Duration) -> Self {
        Self { queueing, network }
    }

    /// From request construction to dispatch.
    pub fn queueing(&self) -> Duration {
        self.queueing
    }

    /// From dispatch to completion, successful or not.
    pub fn network(&self) -> Duration {
        self.network
    }

    pub fn total(&self) -> Duration {
        self.queueing + self.network
    }
}

impl fmt::Display for Latency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{queueing: {}ms, network: {}ms}}",
            self.queueing.as_millis(),
            self.network.as_millis()
        )
    }
}

#[derive(Debug)]
pub enum Outcome {
    Success {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Failure {
        cause: TransportError,
    },
}

impl From<TransportResult> for Outcome {
    fn from(result: TransportResult) -> Self {
        Outcome::Success {
            status: result.status,
            headers: result.headers,
            body: result.body,
        }
    }
}

impl From<TransportError> for Outcome {
    fn from(cause: TransportError) -> Self {
        Outcome::Failure { cause }
    }
}

pub struct Response {
    request: Arc<Request>,
    outcome: Outcome,
    latency: Latency,
    completed_on: Option<String>,
}

impl Response {
    pub(crate) fn new(request: Arc<Request>, outcome: Outcome, latency: Latency) -> Self {
        Self {
            request,
            outcome,
            latency,
            completed_on: std::thread::current().name().map(str::to_string),
        }
    }

    /// Name of the thread that built this response, if it had one.
    pub fn completed_on(&self) -> Option<&str> {
        self.completed_on.as_deref()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// The transport error behind a failed response.
    pub fn cause(&self) -> Option<&TransportError> {
        match &self.outcome {
            Outcome::Failure { cause } => Some(cause),
            Outcome::Success { .. } => None,
        }
    }

    pub fn latency(&self) -> Latency {
        self.latency
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn status_code(&self) -> Result<u16> {
        match &self.outcome {
            Outcome::Success { status, .. } => Ok(*status),
            Outcome::Failure { .. } => Err(Error::InvalidResponse),
        }
    }

    pub fn headers(&self) -> Result<&[(String, String)]> {
        match &self.outcome {
            Outcome::Success { headers, .. } => Ok(headers),
            Outcome::Failure { .. } => Err(Error::InvalidResponse),
        }
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Result<Option<&str>> {
        Ok(self
            .headers()?
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str()))
    }

    pub fn header_content_type(&self) -> Result<Option<&str>> {
        self.header(HEADER_CONTENT_TYPE)
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match &self.outcome {
            Outcome::Success { body, .. } => Ok(body),
            Outcome::Failure { .. } => Err(Error::InvalidResponse),
        }
    }

    /// Body as text; invalid UTF-8 is replaced rather than rejected.
    pub fn as_string(&self) -> Result<String> {
        Ok(String::from_utf8_lossy(self.as_bytes()?).into_owned())
    }

    /// Decode the body with the engine's codec.
    pub fn as_object<T: Any>(&self) -> Result<T> {
        let body = self.as_bytes()?;
        let codec = self.request.engine().codec()?;
        Ok(codec.decode::<T>(body)?)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("request_id", &self.request.id())
            .field("outcome", &self.outcome)
            .field("latency", &self.latency)
            .field("completed_on", &self.completed_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::codec::{CodecError, JsonCodec};
    use crate::{Config, Engine};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
    }

    fn engine() -> Engine {
        Engine::new(
            Config::builder()
                .codec(JsonCodec::new().with::<Item>())
                .build(),
        )
    }

    fn success(engine: &Engine, body: &str) -> Response {
        let request = Arc::new(engine.get("http://h/items/2"));
        let outcome = Outcome::from(TransportResult {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        });
        Response::new(
            request,
            outcome,
            Latency::new(Duration::from_millis(1), Duration::from_millis(5)),
        )
    }

    fn failure(engine: &Engine) -> Response {
        let request = Arc::new(engine.get("http://h/items/2"));
        Response::new(request, Outcome::from(TransportError::Timeout), Latency::default())
    }

    #[test]
    fn success_accessors() {
        let engine = engine();
        let response = success(&engine, r#"{"id":2}"#);
        assert!(response.is_success());
        assert_eq!(response.status_code().unwrap(), 200);
        assert_eq!(response.as_string().unwrap(), r#"{"id":2}"#);
        assert_eq!(response.as_bytes().unwrap(), br#"{"id":2}"#);
        assert!(response.cause().is_none());
    }

    #[test]
    fn header_lookup_ignores_case() {
        let engine = engine();
        let response = success(&engine, "{}");
        assert_eq!(
            response.header("Content-Type").unwrap(),
            Some("application/json")
        );
        assert_eq!(
            response.header_content_type().unwrap(),
            Some("application/json")
        );
        assert_eq!(response.header("X-Missing").unwrap(), None);
    }

    #[test]
    fn failure_accessors_are_invalid() {
        let engine = engine();
        let response = failure(&engine);
        assert!(!response.is_success());
        assert!(matches!(response.cause(), Some(TransportError::Timeout)));
        assert!(matches!(response.status_code(), Err(Error::InvalidResponse)));
        assert!(matches!(response.header("A"), Err(Error::InvalidResponse)));
        assert!(matches!(response.as_bytes(), Err(Error::InvalidResponse)));
        assert!(matches!(response.as_string(), Err(Error::InvalidResponse)));
        assert!(matches!(
            response.as_object::<Item>(),
            Err(Error::InvalidResponse)
        ));
    }

    #[test]
    fn as_object_decodes_registered_type() {
        let engine = engine();
        let item: Item = success(&engine, r#"{"id":2}"#).as_object().unwrap();
        assert_eq!(item, Item { id: 2 });
    }

    #[test]
    fn as_object_of_unregistered_type_fails() {
        let engine = engine();
        let err = success(&engine, "1").as_object::<u32>().unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::Unregistered { .. })));
    }

    #[test]
    fn as_object_without_codec_fails() {
        let engine = Engine::new(Config::default());
        let err = success(&engine, r#"{"id":2}"#).as_object::<Item>().unwrap_err();
        assert!(matches!(err, Error::NoCodec));
    }

    #[test]
    fn response_refers_back_to_request() {
        let engine = engine();
        let response = success(&engine, "{}");
        assert_eq!(response.request().url(), "http://h/items/2");
    }

    #[test]
    fn latency_display_and_total() {
        let latency = Latency::new(Duration::from_millis(3), Duration::from_millis(12));
        assert_eq!(latency.to_string(), "{queueing: 3ms, network: 12ms}");
        assert_eq!(latency.total(), Duration::from_millis(15));
    }
}
