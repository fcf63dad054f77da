//! HTTP client for the Google Drive REST API.
//!
//! Wraps an [`HttpExecutor`] with OAuth2 bearer-token auth, URL building for
//! the metadata and upload endpoints, and helpers for the common HTTP verbs.
//! Every call assembles a fresh [`RequestSpec`]; nothing is carried over
//! between requests. No call is retried.

use log::debug;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::executor::{ApiResponse, HttpExecutor, ReqwestExecutor, RequestSpec, ResponseSink};
use crate::types::{GDriveConfig, GDriveError, GDriveErrorKind, GDriveResult, OAuthToken};

/// Google Drive client with bearer auth over a pluggable executor.
#[derive(Debug, Clone)]
pub struct GDriveClient<E = ReqwestExecutor> {
    executor: E,
    token: Option<OAuthToken>,
    config: GDriveConfig,
}

impl GDriveClient<ReqwestExecutor> {
    /// Create a client backed by `reqwest`.
    pub fn new(config: GDriveConfig) -> GDriveResult<Self> {
        config.validate()?;
        let executor = ReqwestExecutor::new(&config)?;
        Ok(Self {
            executor,
            token: None,
            config,
        })
    }

    pub fn default_client() -> GDriveResult<Self> {
        Self::new(GDriveConfig::default())
    }
}

impl<E: HttpExecutor> GDriveClient<E> {
    pub fn with_executor(executor: E, config: GDriveConfig) -> GDriveResult<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            token: None,
            config,
        })
    }

    // ── Token management ─────────────────────────────────────────

    pub fn set_token(&mut self, token: OAuthToken) {
        self.token = Some(token);
    }

    pub fn token(&self) -> Option<&OAuthToken> {
        self.token.as_ref()
    }

    /// Whether the client currently has a valid (non-expired) token.
    pub fn is_authenticated(&self) -> bool {
        self.token
            .as_ref()
            .map(|t| !t.access_token.is_empty() && !t.is_expired())
            .unwrap_or(false)
    }

    pub fn config(&self) -> &GDriveConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    // ── Request building helpers ─────────────────────────────────

    fn auth_header(&self) -> GDriveResult<String> {
        let token = self
            .token
            .as_ref()
            .filter(|t| !t.access_token.is_empty())
            .ok_or_else(|| GDriveError::auth("No OAuth2 token set"))?;
        if token.is_expired() {
            return Err(GDriveError::new(
                GDriveErrorKind::TokenExpired,
                "OAuth2 token has expired, refresh required",
            ));
        }
        Ok(format!("Bearer {}", token.access_token))
    }

    /// Start a request carrying the bearer `Authorization` header.
    pub fn authorized(&self, method: Method, url: impl Into<String>) -> GDriveResult<RequestSpec> {
        Ok(RequestSpec::new(method, url).with_header("Authorization", self.auth_header()?))
    }

    // ── Execution ────────────────────────────────────────────────

    /// Run a request and hand back whatever status the server answered.
    pub fn execute(&self, request: &RequestSpec) -> GDriveResult<ApiResponse> {
        self.executor.execute(request, None)
    }

    /// Run a request, streaming a successful body into `sink`.
    pub fn execute_streaming(
        &self,
        request: &RequestSpec,
        sink: &mut dyn ResponseSink,
    ) -> GDriveResult<ApiResponse> {
        self.executor.execute(request, Some(sink))
    }

    /// Run a request; any non-2xx status becomes a protocol error.
    pub fn execute_checked(&self, request: &RequestSpec) -> GDriveResult<ApiResponse> {
        let resp = self.execute(request)?;
        if !resp.is_success() {
            debug!("Drive API {} {} -> HTTP {}", request.method, request.url, resp.status);
            return Err(GDriveError::from_response(resp.status, resp.body.as_ref()));
        }
        Ok(resp)
    }

    // ── Public HTTP verb helpers ──────────────────────────────────

    /// GET a JSON response.
    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> GDriveResult<T> {
        let request = self.authorized(Method::GET, url)?;
        self.execute_checked(&request)?.json()
    }

    /// GET with query parameters, return JSON.
    pub fn get_json_with_query<T, K, V>(&self, url: &str, query: &[(K, V)]) -> GDriveResult<T>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let full = url::Url::parse_with_params(
            url,
            query.iter().map(|(k, v)| (k.as_ref(), v.as_ref())),
        )
        .map_err(|e| GDriveError::invalid(format!("Invalid URL '{url}': {e}")))?;
        self.get_json(full.as_str())
    }

    /// POST with a JSON body, return JSON.
    pub fn post_json<B, T>(&self, url: &str, body: &B) -> GDriveResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self
            .authorized(Method::POST, url)?
            .with_header("Content-Type", "application/json; charset=UTF-8")
            .with_json(body)?;
        self.execute_checked(&request)?.json()
    }

    /// DELETE (no response body expected).
    pub fn delete(&self, url: &str) -> GDriveResult<()> {
        let request = self.authorized(Method::DELETE, url)?.with_raw_headers();
        self.execute_checked(&request)?;
        Ok(())
    }

    /// POST a form without the bearer header (token endpoints).
    pub fn post_form_unauthenticated(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> GDriveResult<ApiResponse> {
        let request = RequestSpec::post(url).with_form(params);
        self.execute_checked(&request)
    }

    // ── URLs ─────────────────────────────────────────────────────

    /// Build a full API URL: `{api_base}/{path}`.
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.config.api_base, path)
    }

    /// Build a full upload URL: `{upload_base}/{path}`.
    pub fn upload_url(&self, path: &str) -> String {
        join_url(&self.config.upload_base, path)
    }

    /// URL of one file resource, with the ID percent-encoded.
    pub fn file_url(&self, file_id: &str) -> GDriveResult<String> {
        if file_id.is_empty() {
            return Err(GDriveError::invalid("File ID is empty"));
        }
        let mut url = url::Url::parse(&self.api_url("files"))
            .map_err(|e| GDriveError::invalid(format!("Invalid api_base: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| GDriveError::invalid("api_base cannot take path segments"))?
            .push(file_id);
        Ok(url.to_string())
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
