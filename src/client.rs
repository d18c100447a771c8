//! Configuration and dispatch core shared by concrete service clients.

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, HOST, USER_AGENT};
use reqwest::{Method, Proxy};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::decode::{decode_body, BodyFormat};
use crate::error::{ClientError, ServiceErrorPayload};
use crate::{LIBRARY_NAME, LIBRARY_VERSION};

/// Everything outside the RFC 3986 unreserved set gets escaped.
const PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// URL scheme used to reach the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// Parse a configuration string. Anything other than "http" falls back
    /// to https, mirroring the permissive service defaults.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("http") {
            Scheme::Http
        } else {
            Scheme::Https
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request options forwarded to the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Holds per-client configuration and the lazily-built HTTP transport.
///
/// The transport is constructed from the configuration current at first use
/// and then reused for the lifetime of the client. Setter calls made after
/// the first request do not reach the existing transport; replace it through
/// [`ServiceClient::set_transport`] when that is the intent.
#[derive(Debug)]
pub struct ServiceClient {
    scheme: Scheme,
    protocol_version: String,
    domain: String,
    port: String,
    access_token: String,
    expires_in: Option<DateTime<Utc>>,
    proxy_url: Option<String>,
    debug: bool,
    user_agent: Option<String>,
    transport: OnceLock<Client>,
}

impl Default for ServiceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceClient {
    pub fn new() -> Self {
        Self {
            scheme: Scheme::Https,
            protocol_version: "1.1".to_string(),
            domain: String::new(),
            port: String::new(),
            access_token: String::new(),
            expires_in: None,
            proxy_url: None,
            debug: false,
            user_agent: None,
            transport: OnceLock::new(),
        }
    }

    /// Build a client from a configuration profile.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::new();
        client
            .set_scheme(Scheme::parse(&config.connection.scheme))
            .set_protocol_version(config.connection.protocol_version.clone())
            .set_domain(config.connection.domain.clone())
            .set_port(config.connection.port.clone())
            .set_access_token(config.auth.access_token.clone())
            .set_expires_in(config.auth.expires_in)
            .set_debug(config.http.debug);
        if let Some(proxy) = &config.http.proxy_url {
            client.set_proxy_url(proxy.clone());
        }
        if let Some(agent) = &config.http.user_agent {
            client.set_user_agent(agent.clone());
        }
        client
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn set_scheme(&mut self, scheme: Scheme) -> &mut Self {
        self.scheme = scheme;
        self
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// HTTP protocol version, "1.0" or "1.1". Stored configuration only.
    pub fn set_protocol_version(&mut self, version: impl Into<String>) -> &mut Self {
        self.protocol_version = version.into();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.domain = domain.into();
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn set_port(&mut self, port: impl Into<String>) -> &mut Self {
        self.port = port.into();
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) -> &mut Self {
        self.access_token = token.into();
        self
    }

    pub fn expires_in(&self) -> Option<DateTime<Utc>> {
        self.expires_in
    }

    /// Token expiry timestamp. Caller-managed; nothing here validates it.
    pub fn set_expires_in(&mut self, when: Option<DateTime<Utc>>) -> &mut Self {
        self.expires_in = when;
        self
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    pub fn set_proxy_url(&mut self, proxy: impl Into<String>) -> &mut Self {
        self.proxy_url = Some(proxy.into());
        self
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Enable verbose connection tracing on the transport.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Explicit override when set, library identity otherwise.
    pub fn user_agent(&self) -> String {
        match &self.user_agent {
            Some(agent) => agent.clone(),
            None => format!("{}/{}", LIBRARY_NAME, LIBRARY_VERSION),
        }
    }

    pub fn set_user_agent(&mut self, agent: impl Into<String>) -> &mut Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Absolute URL for a resource under the service root.
    ///
    /// The resource is percent-encoded as a single path segment. The domain
    /// is used as-is; nothing checks that it has been set.
    pub fn service_url(&self, resource: &str) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.domain,
            utf8_percent_encode(resource, PATH_ENCODE_SET)
        )
    }

    /// True when the client carries enough configuration to issue authorized
    /// calls. Never consulted by the dispatch path itself.
    pub fn check_settings(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// The memoized HTTP transport, built on first use.
    pub fn transport(&self) -> Result<&Client, ClientError> {
        self.transport_with_headers(None)
    }

    /// Like [`ServiceClient::transport`], but merges `extra` into the
    /// default header set when the transport is first built. Extras never
    /// override the default headers, and once a transport exists they are
    /// ignored entirely.
    pub fn transport_with_headers(
        &self,
        extra: Option<&HeaderMap>,
    ) -> Result<&Client, ClientError> {
        if let Some(client) = self.transport.get() {
            return Ok(client);
        }
        let built = self.build_transport(extra)?;
        Ok(self.transport.get_or_init(|| built))
    }

    /// Replace the memoized transport, bypassing construction. Useful for
    /// substituting a preconfigured client in tests.
    pub fn set_transport(&mut self, client: Client) -> &mut Self {
        self.transport = OnceLock::from(client);
        self
    }

    fn build_transport(&self, extra: Option<&HeaderMap>) -> Result<Client, ClientError> {
        debug!(target: "transport", "building client for {}", self.service_url(""));
        let mut builder = Client::builder().default_headers(self.default_headers(extra)?);
        if let Some(proxy) = self.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        if self.debug {
            builder = builder.connection_verbose(true);
        }
        Ok(builder.build()?)
    }

    fn default_headers(&self, extra: Option<&HeaderMap>) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let auth = format!("OAuth {}", self.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|source| ClientError::Header {
                name: "Authorization",
                source,
            })?,
        );
        headers.insert(
            HOST,
            HeaderValue::from_str(&self.domain).map_err(|source| ClientError::Header {
                name: "Host",
                source,
            })?,
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent()).map_err(|source| ClientError::Header {
                name: "User-Agent",
                source,
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        if let Some(extra) = extra {
            // extras never shadow the defaults
            for (name, value) in extra {
                if !headers.contains_key(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }
        Ok(headers)
    }

    fn request_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}://{}/{}",
            self.scheme,
            self.domain,
            path.trim_start_matches('/')
        )
    }

    /// Issue one request and translate structured service errors.
    ///
    /// `path` is resolved against the service root unless it is already an
    /// absolute http(s) URL. Responses the transport does not classify as
    /// errors come back unchanged. A 4xx response is inspected for a
    /// structured error payload and mapped onto [`ClientError`]; when its
    /// body carries no such payload the original status error is re-raised.
    /// Everything else, 5xx included, propagates untranslated.
    pub fn send_request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response, ClientError> {
        let url = self.request_url(path);
        debug!(target: "dispatch", "{} {}", method, url);

        let mut request = self.transport()?.request(method, url.as_str());
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if !options.headers.is_empty() {
            request = request.headers(options.headers);
        }
        if let Some(body) = &options.json {
            request = request.json(body);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send()?;
        let status = response.status();
        let source = match response.error_for_status_ref() {
            Ok(_) => return Ok(response),
            Err(source) => source,
        };

        if status.is_client_error() {
            let body = response.text().unwrap_or_default();
            if let Some(payload) = decode_body::<ServiceErrorPayload>(&body, BodyFormat::Json) {
                warn!(target: "dispatch", "service error {}: {}", payload.error, payload.message);
                return Err(payload.into_error(status));
            }
        }
        Err(ClientError::Transport(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured_client() -> ServiceClient {
        let mut client = ServiceClient::new();
        client
            .set_domain("example.com")
            .set_access_token("secret-token");
        client
    }

    #[test]
    fn test_service_url_percent_encodes_resource() {
        let client = configured_client();
        assert_eq!(client.service_url("a b"), "https://example.com/a%20b");
    }

    #[test]
    fn test_service_url_with_empty_resource() {
        let client = configured_client();
        assert_eq!(client.service_url(""), "https://example.com/");
    }

    #[test]
    fn test_service_url_does_not_validate_domain() {
        let client = ServiceClient::new();
        assert_eq!(client.service_url("status"), "https:///status");
    }

    #[test]
    fn test_default_user_agent() {
        let client = ServiceClient::new();
        assert_eq!(
            client.user_agent(),
            format!("{}/{}", LIBRARY_NAME, LIBRARY_VERSION)
        );
    }

    #[test]
    fn test_user_agent_override_wins() {
        let mut client = ServiceClient::new();
        client.set_user_agent("my-app/2.0");
        assert_eq!(client.user_agent(), "my-app/2.0");
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!(Scheme::parse("http"), Scheme::Http);
        assert_eq!(Scheme::parse("HTTP"), Scheme::Http);
        assert_eq!(Scheme::parse("https"), Scheme::Https);
        assert_eq!(Scheme::parse("gopher"), Scheme::Https);
    }

    #[test]
    fn test_fluent_setters_chain() {
        let mut client = ServiceClient::new();
        client
            .set_scheme(Scheme::Http)
            .set_domain("localhost")
            .set_port("8080")
            .set_protocol_version("1.0")
            .set_access_token("t")
            .set_debug(true);
        assert_eq!(client.scheme(), Scheme::Http);
        assert_eq!(client.domain(), "localhost");
        assert_eq!(client.port(), "8080");
        assert_eq!(client.protocol_version(), "1.0");
        assert_eq!(client.access_token(), "t");
        assert!(client.debug());
    }

    #[test]
    fn test_check_settings_requires_token() {
        let mut client = ServiceClient::new();
        assert!(!client.check_settings());
        client.set_access_token("t");
        assert!(client.check_settings());
    }

    #[test]
    fn test_default_headers_carry_credentials() {
        let client = configured_client();
        let headers = client.default_headers(None).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "OAuth secret-token");
        assert_eq!(headers.get(HOST).unwrap(), "example.com");
        assert_eq!(headers.get(ACCEPT).unwrap(), "*/*");
        assert_eq!(
            headers.get(USER_AGENT).unwrap(),
            client.user_agent().as_str()
        );
    }

    #[test]
    fn test_extra_headers_merge_additively() {
        let client = configured_client();
        let mut extra = HeaderMap::new();
        extra.insert(ACCEPT, HeaderValue::from_static("application/json"));
        extra.insert(
            HeaderName::from_static("x-api-flavor"),
            HeaderValue::from_static("beta"),
        );

        let headers = client.default_headers(Some(&extra)).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "*/*");
        assert_eq!(headers.get("x-api-flavor").unwrap(), "beta");
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn test_request_url_joins_relative_paths() {
        let client = configured_client();
        assert_eq!(
            client.request_url("api/v1/skills"),
            "https://example.com/api/v1/skills"
        );
        assert_eq!(
            client.request_url("/api/v1/skills"),
            "https://example.com/api/v1/skills"
        );
    }

    #[test]
    fn test_request_url_passes_absolute_urls_through() {
        let client = configured_client();
        assert_eq!(
            client.request_url("http://other.example.com/x"),
            "http://other.example.com/x"
        );
    }

    #[test]
    fn test_invalid_token_surfaces_header_error() {
        let mut client = configured_client();
        client.set_access_token("bad\ntoken");
        match client.default_headers(None) {
            Err(ClientError::Header { name, .. }) => assert_eq!(name, "Authorization"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
