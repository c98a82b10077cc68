//! HTTP transport implementation using reqwest.
//!
//! This adapter implements the `HttpTransport` port. Relative request targets
//! are resolved against the configured base URL; the underlying client keeps
//! a cookie jar so cookie-based refresh works across calls.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Url};
use tokenrelay_application::ports::{HttpTransport, TransportError};
use tokenrelay_domain::request::{JSON_CONTENT_TYPE, RequestBodyKind};
use tokenrelay_domain::{ApiRequest, ApiResponse, AuthSettings, HttpMethod, RequestBody};
use tracing::debug;

/// HTTP transport backed by `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
    timeout_ms: u64,
}

impl ReqwestTransport {
    /// Creates a transport for the configured base URL.
    ///
    /// Defaults applied to every request:
    /// - `Content-Type` and `Accept`: `application/json`
    /// - the configured timeout and user agent
    /// - a shared cookie jar
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the client cannot be created.
    pub fn new(settings: &AuthSettings) -> Result<Self, TransportError> {
        let base_url = Url::parse(&settings.base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{e}: {}", settings.base_url)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_CONTENT_TYPE));

        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout_ms: settings.timeout_ms,
        })
    }

    /// Returns the base URL relative targets are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a request target to an absolute URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if the target cannot be joined to the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url, TransportError> {
        if let Ok(url) = Url::parse(target)
            && url.has_host()
        {
            return Ok(url);
        }
        self.base_url
            .join(target)
            .map_err(|e| TransportError::InvalidUrl(format!("{e}: {target}")))
    }

    const fn to_reqwest_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
        }
    }

    fn build_body(
        builder: reqwest::RequestBuilder,
        body: &RequestBody,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        match &body.kind {
            RequestBodyKind::None => Ok(builder),
            RequestBodyKind::Raw { .. } => {
                if body
                    .content_type()
                    .is_some_and(|ct| ct.contains(JSON_CONTENT_TYPE))
                    && !body.content.is_empty()
                {
                    let _: serde_json::Value = serde_json::from_str(&body.content)
                        .map_err(|e| TransportError::InvalidBody(format!("invalid JSON: {e}")))?;
                }
                Ok(builder.body(body.content.clone()))
            }
            RequestBodyKind::FormUrlEncoded => Ok(builder.body(body.content.clone())),
        }
    }

    fn map_error(error: &reqwest::Error, timeout_ms: u64) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout { timeout_ms };
        }
        if error.is_connect() {
            return TransportError::ConnectionFailed(error.to_string());
        }
        if error.is_builder() {
            return TransportError::InvalidUrl(error.to_string());
        }
        if error.is_body() {
            return TransportError::InvalidBody(error.to_string());
        }
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.resolve(&request.url)?;
        let start = Instant::now();

        let mut builder = self
            .client
            .request(Self::to_reqwest_method(request.method), url);
        for header in request.headers.iter() {
            builder = builder.header(&header.name, &header.value);
        }
        if let Some(content_type) = request.body.content_type()
            && !request.headers.contains("content-type")
        {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder = Self::build_body(builder, &request.body)?;

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(&e, self.timeout_ms))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Other(format!("failed to read body: {e}")))?
            .to_vec();
        let duration = start.elapsed();

        debug!(
            request_id = %request.id,
            method = %request.method,
            url = %request.url,
            status,
            elapsed_ms = duration.as_millis(),
            "request completed"
        );
        Ok(ApiResponse::new(status, headers, body, duration))
    }
}
