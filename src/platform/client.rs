//! platform::client
//!
//! Shared HTTP plumbing for the concrete drivers.
//!
//! Each driver owns an [`Api`]: a base URL, an authentication scheme, and
//! any service-specific default headers. The wrapper keeps the verbs thin
//! and funnels every non-success response through one status-to-error
//! mapping so drivers never hand-roll their own classification.

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use super::error::PlatformError;

/// User agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("omniforge/", env!("CARGO_PKG_VERSION"));

/// Longest error-body excerpt quoted in an error message.
const MAX_ERROR_EXCERPT: usize = 200;

/// How a driver proves its identity on each request.
#[derive(Clone)]
pub(crate) enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// `Authorization: token <token>` (Gitea).
    Token(String),
    /// `PRIVATE-TOKEN: <token>` (GitLab).
    PrivateToken(String),
    /// HTTP basic credentials. Azure DevOps sends a PAT as the password
    /// with an empty username.
    Basic { username: String, password: String },
}

// Credentials stay out of debug output.
impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self {
            AuthScheme::Bearer(_) => "Bearer",
            AuthScheme::Token(_) => "Token",
            AuthScheme::PrivateToken(_) => "PrivateToken",
            AuthScheme::Basic { .. } => "Basic",
        };
        write!(f, "AuthScheme::{scheme}(***)")
    }
}

/// One driver's view of a service API.
#[derive(Debug, Clone)]
pub(crate) struct Api {
    http: reqwest::Client,
    base: Url,
    auth: AuthScheme,
    headers: Vec<(&'static str, &'static str)>,
}

impl Api {
    /// Build a client for `endpoint`.
    ///
    /// The endpoint must be an absolute `http`/`https` URL with a host. Its
    /// path is normalized to end with `/` so relative joins extend it
    /// instead of replacing the last segment.
    pub(crate) fn new(endpoint: &str, auth: AuthScheme) -> Result<Api, PlatformError> {
        let mut base = Url::parse(endpoint)
            .map_err(|_| PlatformError::InvalidEndpoint(endpoint.to_string()))?;
        if base.host_str().is_none() || !matches!(base.scheme(), "http" | "https") {
            return Err(PlatformError::InvalidEndpoint(endpoint.to_string()));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Api {
            http: reqwest::Client::new(),
            base,
            auth,
            headers: Vec::new(),
        })
    }

    /// Attach a static default header to every request.
    pub(crate) fn with_header(mut self, name: &'static str, value: &'static str) -> Api {
        self.headers.push((name, value));
        self
    }

    /// The normalized base endpoint, always with a trailing slash.
    pub(crate) fn endpoint(&self) -> String {
        self.base.to_string()
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, PlatformError> {
        let response = self.execute(self.build(Method::GET, path)?).await?;
        Self::decode(response).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let request = self.build(Method::POST, path)?.json(body);
        Self::decode(self.execute(request).await?).await
    }

    pub(crate) async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let request = self.build(Method::PATCH, path)?.json(body);
        Self::decode(self.execute(request).await?).await
    }

    pub(crate) async fn put_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let request = self.build(Method::PUT, path)?.json(body);
        Self::decode(self.execute(request).await?).await
    }

    /// POST where the response body is irrelevant.
    pub(crate) async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), PlatformError> {
        let request = self.build(Method::POST, path)?.json(body);
        self.execute(request).await.map(drop)
    }

    /// PATCH where the response body is irrelevant.
    pub(crate) async fn patch_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), PlatformError> {
        let request = self.build(Method::PATCH, path)?.json(body);
        self.execute(request).await.map(drop)
    }

    /// PUT where the response body is irrelevant.
    pub(crate) async fn put_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), PlatformError> {
        let request = self.build(Method::PUT, path)?.json(body);
        self.execute(request).await.map(drop)
    }

    fn build(&self, method: Method, path: &str) -> Result<RequestBuilder, PlatformError> {
        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|_| PlatformError::InvalidEndpoint(format!("{}{path}", self.base)))?;
        trace!(%method, %url, "platform API request");
        let mut request = self
            .http
            .request(method, url)
            .header(reqwest::header::USER_AGENT, USER_AGENT);
        for (name, value) in &self.headers {
            request = request.header(*name, *value);
        }
        Ok(match &self.auth {
            AuthScheme::Bearer(token) => request.bearer_auth(token),
            AuthScheme::Token(token) => request.header(AUTHORIZATION, format!("token {token}")),
            AuthScheme::PrivateToken(token) => request.header("PRIVATE-TOKEN", token.as_str()),
            AuthScheme::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        })
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|err| PlatformError::Network(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let rate_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.unwrap_or_default();
        let error = classify(status, rate_remaining.as_deref(), &body);
        debug!(status = status.as_u16(), %error, "platform API request failed");
        Err(error)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PlatformError> {
        let status = response.status();
        response.json::<T>().await.map_err(|err| PlatformError::Api {
            status: status.as_u16(),
            message: format!("unparseable response body: {err}"),
        })
    }
}

/// Map a non-success response onto the error taxonomy.
fn classify(status: StatusCode, rate_remaining: Option<&str>, body: &str) -> PlatformError {
    let message = extract_message(status, body);
    match status {
        StatusCode::UNAUTHORIZED => PlatformError::AuthFailed(message),
        // GitHub reports an exhausted rate limit as 403 with the remaining
        // quota in a header.
        StatusCode::FORBIDDEN if rate_remaining == Some("0") => PlatformError::RateLimited,
        StatusCode::FORBIDDEN => PlatformError::AuthFailed(format!("permission denied: {message}")),
        StatusCode::NOT_FOUND => PlatformError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited,
        _ => PlatformError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull a human-readable message out of an error body.
///
/// Understands the common envelopes (`message`, `error.message`, `error`,
/// `error_description`) and falls back to a trimmed excerpt of the raw body.
fn extract_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for candidate in [
            &value["message"],
            &value["error"]["message"],
            &value["error"],
            &value["error_description"],
        ] {
            if let Some(text) = candidate.as_str() {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string();
    }
    trimmed.chars().take(MAX_ERROR_EXCERPT).collect()
}
