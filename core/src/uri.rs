//! Structured URL construction.
//!
//! # Design
//! `UriBuilder` collects scheme, host, port, path and query parameters and
//! renders them once in `build_string`. Parameters are an ordered list, not
//! a map: a name may repeat and insertion order is kept. The query is
//! `application/x-www-form-urlencoded`. The scheme defaults to `http` and a
//! path without a leading `/` gets one. Request factories take anything that
//! implements `IntoUrl`, so a plain string and a builder are interchangeable.

use std::borrow::Cow;

/// Builds an absolute URL from its parts.
///
/// Query parameters keep their insertion order, may repeat, and are encoded
/// as `application/x-www-form-urlencoded` (a space becomes `+`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UriBuilder {
    scheme: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    params: Vec<(String, String)>,
}

impl UriBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn build_string(&self) -> String {
        let scheme = self.scheme.as_deref().unwrap_or("http");
        let mut url = format!("{scheme}://{}", self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        if !self.path.is_empty() && !self.path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&self.path);
        if !self.params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

/// Anything a request factory accepts as its target.
pub trait IntoUrl {
    fn into_url(self) -> String;
}

impl IntoUrl for &str {
    fn into_url(self) -> String {
        self.to_string()
    }
}

impl IntoUrl for String {
    fn into_url(self) -> String {
        self
    }
}

impl IntoUrl for &String {
    fn into_url(self) -> String {
        self.clone()
    }
}

impl IntoUrl for Cow<'_, str> {
    fn into_url(self) -> String {
        self.into_owned()
    }
}

impl IntoUrl for &UriBuilder {
    fn into_url(self) -> String {
        self.build_string()
    }
}

impl IntoUrl for UriBuilder {
    fn into_url(self) -> String {
        self.build_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_host_and_path() {
        let uri = UriBuilder::new()
            .scheme("https")
            .host("bigsonata.com")
            .path("/java/examples/");
        assert_eq!(uri.build_string(), "https://bigsonata.com/java/examples/");
    }

    #[test]
    fn parameters_are_form_encoded() {
        let uri = UriBuilder::new()
            .scheme("https")
            .host("bigsonata.com")
            .param("text", "data data")
            .path("/action_page2.php");
        assert_eq!(
            uri.build_string(),
            "https://bigsonata.com/action_page2.php?text=data+data"
        );
    }

    #[test]
    fn repeated_parameters_keep_order() {
        let uri = UriBuilder::new()
            .scheme("https")
            .host("bigsonata.com")
            .param("test", "a")
            .param("test", "b");
        assert_eq!(uri.build_string(), "https://bigsonata.com?test=a&test=b");
    }

    #[test]
    fn port_and_default_scheme() {
        let uri = UriBuilder::new().host("127.0.0.1").port(8080).path("users/2");
        assert_eq!(uri.build_string(), "http://127.0.0.1:8080/users/2");
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let uri = UriBuilder::new().host("h").param("q", "a&b=c");
        assert_eq!(uri.build_string(), "http://h?q=a%26b%3Dc");
    }

    #[test]
    fn into_url_accepts_builders() {
        let uri = UriBuilder::new().host("h").path("/p");
        assert_eq!((&uri).into_url(), "http://h/p");
        assert_eq!(uri.into_url(), "http://h/p");
        assert_eq!("http://x/".into_url(), "http://x/");
    }
}
