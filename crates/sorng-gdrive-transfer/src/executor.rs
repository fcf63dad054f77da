//! HTTP request execution for the Drive REST surface.
//!
//! A request is described once as an immutable [`RequestSpec`] and handed to
//! an [`HttpExecutor`], which performs exactly one blocking HTTP exchange.
//! Response bodies are either decoded as JSON or streamed into a
//! [`ResponseSink`]. Transport failures and HTTP error statuses are kept
//! apart: the former are `Err(Transport)`, the latter come back as an
//! [`ApiResponse`] for the caller to judge.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::types::{GDriveConfig, GDriveError, GDriveErrorKind, GDriveResult};

/// Size of the buffer response bodies are streamed through.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;
/// Redirect hops followed before giving up.
const MAX_REDIRECTS: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Json(Value),
    Form(Vec<(String, String)>),
}

/// One fully described HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    /// Header names are unique (case-insensitively); order is irrelevant.
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// On success only the status and headers are wanted and the body is
    /// not decoded. Error bodies are always decoded.
    pub raw_headers: bool,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            raw_headers: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Set a header, replacing any existing header of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    pub fn with_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(bytes.into());
        self
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> GDriveResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| GDriveError::serialization(format!("Body serialization: {e}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn with_form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_raw_headers(mut self) -> Self {
        self.raw_headers = true;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            RequestBody::Bytes(b) => Some(&b[..]),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Response headers with lower-cased names; repeated headers keep every
/// value, in arrival order, under one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseHeaders(BTreeMap<String, Vec<String>>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value of a header.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            headers.insert(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Status, headers and decoded body of one HTTP exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    /// JSON body; a non-JSON body is kept as a string; `None` when empty,
    /// skipped, or streamed into a sink.
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> GDriveResult<T> {
        let body = self
            .body
            .clone()
            .ok_or_else(|| GDriveError::serialization("Response has no body"))?;
        serde_json::from_value(body)
            .map_err(|e| GDriveError::serialization(format!("JSON parse error: {e}")))
    }
}

fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Sinks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Receiver of a streamed response body.
///
/// `accept` returns how many bytes of `chunk` were consumed; anything less
/// than `chunk.len()` aborts the transfer.
pub trait ResponseSink {
    fn accept(&mut self, chunk: &[u8]) -> usize;
}

impl ResponseSink for Vec<u8> {
    fn accept(&mut self, chunk: &[u8]) -> usize {
        self.extend_from_slice(chunk);
        chunk.len()
    }
}

impl<S: ResponseSink + ?Sized> ResponseSink for &mut S {
    fn accept(&mut self, chunk: &[u8]) -> usize {
        (**self).accept(chunk)
    }
}

/// Adapts any [`Write`] into a sink. The first write error stops the
/// transfer and is kept for the caller.
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    pub fn error(&self) -> Option<&io::Error> {
        self.error.as_ref()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ResponseSink for WriterSink<W> {
    fn accept(&mut self, chunk: &[u8]) -> usize {
        if self.error.is_some() {
            return 0;
        }
        match self.inner.write_all(chunk) {
            Ok(()) => chunk.len(),
            Err(e) => {
                self.error = Some(e);
                0
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Performs one HTTP exchange per call.
///
/// With a sink, a 2xx body is streamed into it and `ApiResponse::body` is
/// `None`; any other status has its body decoded instead and the sink is
/// left untouched.
pub trait HttpExecutor {
    fn execute(
        &self,
        request: &RequestSpec,
        sink: Option<&mut dyn ResponseSink>,
    ) -> GDriveResult<ApiResponse>;
}

impl<E: HttpExecutor + ?Sized> HttpExecutor for &E {
    fn execute(
        &self,
        request: &RequestSpec,
        sink: Option<&mut dyn ResponseSink>,
    ) -> GDriveResult<ApiResponse> {
        (**self).execute(request, sink)
    }
}

/// Blocking executor backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    inner: Client,
    low_speed_limit: u64,
    low_speed_time: Duration,
}

impl ReqwestExecutor {
    pub fn new(config: &GDriveConfig) -> GDriveResult<Self> {
        let inner = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .https_only(true)
            .redirect(Policy::custom(|attempt| {
                if attempt.url().scheme() != "https" {
                    attempt.error("refusing redirect to a non-HTTPS target")
                } else if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else {
                    attempt.follow()
                }
            }))
            .build()
            .map_err(|e| GDriveError::transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            low_speed_limit: config.low_speed_limit,
            low_speed_time: Duration::from_secs(config.low_speed_time_seconds),
        })
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(
        &self,
        request: &RequestSpec,
        sink: Option<&mut dyn ResponseSink>,
    ) -> GDriveResult<ApiResponse> {
        ensure_https(&request.url)?;
        debug!("Drive API {} {}", request.method, request.url);

        let mut builder = self.inner.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(pairs) => builder.form(pairs),
        };

        let response = builder.send().map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let headers = ResponseHeaders::from_header_map(response.headers());
        let mut reader =
            ThroughputWatchdog::new(response, self.low_speed_limit, self.low_speed_time);

        let success = (200..300).contains(&status);

        match sink {
            Some(sink) if success => {
                let streamed = stream_into(&mut reader, sink)?;
                debug!("Streamed {} bytes (HTTP {})", streamed, status);
                Ok(ApiResponse {
                    status,
                    headers,
                    body: None,
                })
            }
            _ if request.raw_headers && success => Ok(ApiResponse {
                status,
                headers,
                body: None,
            }),
            _ => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| GDriveError::transport(format!("Failed to read response body: {e}")))?;
                Ok(ApiResponse {
                    status,
                    headers,
                    body: decode_body(&buf),
                })
            }
        }
    }
}

/// Refuse anything but HTTPS before touching the network.
pub fn ensure_https(url: &str) -> GDriveResult<url::Url> {
    let parsed = url::Url::parse(url)
        .map_err(|e| GDriveError::invalid(format!("Invalid URL '{url}': {e}")))?;
    if parsed.scheme() != "https" {
        return Err(GDriveError::invalid(format!("Refusing non-HTTPS URL: {url}")));
    }
    Ok(parsed)
}

fn map_reqwest_error(e: reqwest::Error) -> GDriveError {
    if e.is_builder() {
        return GDriveError::invalid(format!("Invalid request: {e}"));
    }
    if e.is_timeout() {
        return GDriveError::transport(format!("Request timed out: {e}"));
    }
    GDriveError::transport(e.to_string())
}

/// Copy a body into a sink; returns the number of bytes delivered.
fn stream_into(reader: &mut impl Read, sink: &mut dyn ResponseSink) -> GDriveResult<u64> {
    let mut buf = vec![0u8; STREAM_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(GDriveError::transport(format!(
                    "Transfer interrupted after {total} bytes: {e}"
                )))
            }
        };
        let accepted = sink.accept(&buf[..n]);
        if accepted < n {
            return Err(GDriveError::new(
                GDriveErrorKind::TransferAborted,
                format!("Sink accepted {accepted} of {n} bytes after {total} bytes"),
            ));
        }
        total += n as u64;
    }
}

/// Aborts a body read when throughput stays under `limit` bytes/s for a
/// whole `window`.
pub(crate) struct ThroughputWatchdog<R> {
    inner: R,
    limit: u64,
    window: Duration,
    window_start: Instant,
    window_bytes: u64,
}

impl<R: Read> ThroughputWatchdog<R> {
    pub(crate) fn new(inner: R, limit: u64, window: Duration) -> Self {
        Self {
            inner,
            limit,
            window,
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }
}

impl<R: Read> Read for ThroughputWatchdog<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.limit == 0 || n == 0 {
            return Ok(n);
        }
        self.window_bytes += n as u64;
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.window {
            let floor = self.limit as f64 * elapsed.as_secs_f64();
            if (self.window_bytes as f64) < floor {
                warn!(
                    "Transfer below {} B/s for {:?} ({} bytes)",
                    self.limit, elapsed, self.window_bytes
                );
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("transfer speed below {} B/s for {:?}", self.limit, elapsed),
                ));
            }
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
        Ok(n)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
