//! Outgoing request description.
//!
//! # Design
//! A `Request` is created by one of the engine's factories, which fixes its
//! id, method, creation instant and default headers. The fluent setters
//! consume and return the request so a call reads as one chain ending in
//! `exec()`. `exec` takes the request by value: once handed to the engine
//! it can no longer be modified or dispatched again.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;

use crate::engine::{ResponseFuture, Shared};
use crate::error::Result;
use crate::http::{
    HttpMethod, APPLICATION_JSON, HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE,
    HEADER_USER_AGENT,
};

pub struct Request {
    engine: Arc<Shared>,
    id: u64,
    method: HttpMethod,
    url: String,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
    created_at: Instant,
    timestamp: SystemTime,
}

impl Request {
    pub(crate) fn new(engine: Arc<Shared>, id: u64, method: HttpMethod, url: String) -> Self {
        let headers = engine.config().default_headers().clone();
        Self {
            engine,
            id,
            method,
            url,
            headers,
            body: None,
            created_at: Instant::now(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Monotonic instant the request was built; queueing latency starts here.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Wall-clock time the request was built.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub(crate) fn engine(&self) -> &Arc<Shared> {
        &self.engine
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn body_text(self, body: &str) -> Self {
        self.body(body.as_bytes())
    }

    /// Encode `value` with the engine's codec and set the matching
    /// `Content-Type`.
    pub fn body_object<T: Any>(mut self, value: &T) -> Result<Self> {
        let codec = self.engine.codec()?;
        let content_type = codec.content_type().to_string();
        let body = codec.encode(value)?;
        self.headers.insert(HEADER_CONTENT_TYPE.to_string(), content_type);
        self.body = Some(body);
        Ok(self)
    }

    /// Replace every header, including the defaults.
    pub fn headers_replace(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header_content_type(self, value: impl Into<String>) -> Self {
        self.header(HEADER_CONTENT_TYPE, value)
    }

    pub fn header_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.header(HEADER_USER_AGENT, user_agent)
    }

    pub fn header_content_type_json(self) -> Self {
        self.header(HEADER_CONTENT_TYPE, APPLICATION_JSON)
    }

    pub fn header_accept_json(self) -> Self {
        self.header(HEADER_ACCEPT, APPLICATION_JSON)
    }

    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let credentials = BASE64_STANDARD.encode(format!("{username}:{password}"));
        self.header(HEADER_AUTHORIZATION, format!("Basic {credentials}"))
    }

    /// Hand the request to its engine.
    pub fn exec(self) -> Result<ResponseFuture> {
        let engine = Arc::clone(&self.engine);
        engine.process(self)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use crate::codec::{CodecError, JsonCodec};
    use crate::error::Error;
    use crate::{Config, Engine, EngineState, UriBuilder};

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct User {
        first_name: String,
    }

    fn engine() -> Engine {
        Engine::new(
            Config::builder()
                .default_header("X-Client", "requests")
                .codec(JsonCodec::new().with::<User>())
                .build(),
        )
    }

    #[test]
    fn factories_fix_method_and_url() {
        let engine = engine();
        assert_eq!(engine.get("http://h/a").method(), HttpMethod::Get);
        assert_eq!(engine.post("http://h/a").method(), HttpMethod::Post);
        assert_eq!(engine.put("http://h/a").method(), HttpMethod::Put);
        let req = engine.delete(UriBuilder::new().host("h").path("/a"));
        assert_eq!(req.method(), HttpMethod::Delete);
        assert_eq!(req.url(), "http://h/a");
    }

    #[test]
    fn ids_increase_in_construction_order() {
        let engine = engine();
        let ids: Vec<u64> = (0..5).map(|_| engine.get("http://h/").id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{ids:?}");
    }

    #[test]
    fn default_headers_are_seeded() {
        let req = engine().get("http://h/");
        assert_eq!(req.header_value("X-Client"), Some("requests"));
    }

    #[test]
    fn header_setters() {
        let req = engine()
            .get("http://h/")
            .header_user_agent("agent/1.0")
            .header_accept_json()
            .header_content_type("text/plain");
        assert_eq!(req.header_value("User-Agent"), Some("agent/1.0"));
        assert_eq!(req.header_value("Accept"), Some("application/json"));
        assert_eq!(req.header_value("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn headers_are_case_sensitive() {
        let req = engine().get("http://h/").header("x-client", "other");
        assert_eq!(req.header_value("X-Client"), Some("requests"));
        assert_eq!(req.header_value("x-client"), Some("other"));
    }

    #[test]
    fn replacing_headers_drops_defaults() {
        let mut headers = HashMap::new();
        headers.insert("A".to_string(), "1".to_string());
        let req = engine().get("http://h/").headers_replace(headers);
        assert_eq!(req.headers().len(), 1);
        assert!(req.header_value("X-Client").is_none());
    }

    #[test]
    fn basic_auth_sets_authorization() {
        let req = engine().get("http://h/").basic_auth("Aladdin", "open sesame");
        assert_eq!(
            req.header_value("Authorization"),
            Some("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==")
        );
    }

    #[test]
    fn raw_and_text_bodies() {
        let engine = engine();
        let req = engine.post("http://h/").body(vec![1u8, 2, 3]);
        assert_eq!(req.body_bytes(), Some(&[1u8, 2, 3][..]));
        let req = engine.post("http://h/").body_text("hello");
        assert_eq!(req.body_bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn typed_body_sets_content_type() {
        let req = engine()
            .post("http://h/")
            .body_object(&User {
                first_name: "requests".to_string(),
            })
            .unwrap();
        assert_eq!(req.header_value("Content-Type"), Some("application/json"));
        let json: serde_json::Value = serde_json::from_slice(req.body_bytes().unwrap()).unwrap();
        assert_eq!(json["first_name"], "requests");
    }

    #[test]
    fn typed_body_of_unregistered_type_fails() {
        let err = engine().post("http://h/").body_object(&42u32).unwrap_err();
        assert!(matches!(
            err,
            Error::Codec(CodecError::Unregistered { .. })
        ));
    }

    #[test]
    fn typed_body_without_codec_fails() {
        let engine = Engine::new(Config::default());
        let err = engine
            .post("http://h/")
            .body_object(&User {
                first_name: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NoCodec));
    }

    #[test]
    fn exec_on_uninitialized_engine_is_rejected() {
        let err = engine().get("http://h/").exec().unwrap_err();
        assert!(matches!(err, Error::NotReady(EngineState::Uninitialized)));
    }
}
