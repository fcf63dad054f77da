#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use reqwest::Method;
use serde_json::{json, Value};
use sorng_gdrive_transfer::executor::{
    ApiResponse, HttpExecutor, RequestBody, RequestSpec, ResponseHeaders, ResponseSink,
};
use sorng_gdrive_transfer::types::{GDriveConfig, GDriveError, GDriveErrorKind, GDriveResult, OAuthToken};
use sorng_gdrive_transfer::GDriveClient;

pub const SESSION_URL: &str =
    "https://www.googleapis.com/upload/drive/v2/files?uploadType=resumable&upload_id=test-session";

pub fn authed<E: HttpExecutor>(executor: E, config: GDriveConfig) -> GDriveClient<E> {
    let mut client = GDriveClient::with_executor(executor, config).unwrap();
    client.set_token(OAuthToken::bearer("ya29.test"));
    client
}

/// Config with small chunks so chunked uploads stay cheap.
pub fn small_chunks(chunk_size: u64, threshold: u64) -> GDriveConfig {
    GDriveConfig {
        chunk_size,
        chunk_threshold_size: threshold,
        ..Default::default()
    }
}

pub fn source(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

/// One canned response.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Bytes streamed into the sink on success.
    pub content: Vec<u8>,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
            ..Default::default()
        }
    }

    pub fn content(status: u16, content: &[u8]) -> Self {
        Self {
            status,
            content: content.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

fn respond(
    reply: Reply,
    raw_headers: bool,
    sink: Option<&mut dyn ResponseSink>,
) -> GDriveResult<ApiResponse> {
    let headers: ResponseHeaders = reply.headers.iter().map(|(k, v)| (k, v.clone())).collect();
    let success = (200..300).contains(&reply.status);
    if let (Some(sink), true) = (sink, success) {
        for piece in reply.content.chunks(16) {
            let accepted = sink.accept(piece);
            if accepted < piece.len() {
                return Err(GDriveError::new(
                    GDriveErrorKind::TransferAborted,
                    "sink refused bytes",
                ));
            }
        }
        return Ok(ApiResponse {
            status: reply.status,
            headers,
            body: None,
        });
    }
    Ok(ApiResponse {
        status: reply.status,
        headers,
        body: if raw_headers && success { None } else { reply.body },
    })
}

/// Answers requests from a fixed script, in order, and records them.
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: RefCell<VecDeque<Reply>>,
    requests: RefCell<Vec<RequestSpec>>,
}

impl ScriptedExecutor {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl HttpExecutor for ScriptedExecutor {
    fn execute(
        &self,
        request: &RequestSpec,
        sink: Option<&mut dyn ResponseSink>,
    ) -> GDriveResult<ApiResponse> {
        self.requests.borrow_mut().push(request.clone());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| GDriveError::transport("no scripted reply left"))?;
        respond(reply, request.raw_headers, sink)
    }
}

/// Minimal in-memory resumable upload endpoint.
///
/// Appends each PUT body at the offset it claims, accepting at most
/// `accept_cap` bytes per request, and answers 308 with a `Range` header
/// until the declared total has arrived.
pub struct FakeDrive {
    pub received: RefCell<Vec<u8>>,
    requests: RefCell<Vec<RequestSpec>>,
    accept_cap: usize,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::with_accept_cap(usize::MAX)
    }

    pub fn with_accept_cap(accept_cap: usize) -> Self {
        Self {
            received: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
            accept_cap,
        }
    }

    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.borrow().clone()
    }

    pub fn content_ranges(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .filter(|r| r.method == Method::PUT)
            .filter_map(|r| r.header("content-range").map(str::to_string))
            .collect()
    }

    fn progress_reply(&self, total: Option<u64>) -> Reply {
        let received = self.received.borrow().len() as u64;
        if total == Some(received) {
            return Reply::json(
                200,
                json!({
                    "id": "file-1",
                    "title": "upload.bin",
                    "mimeType": "application/octet-stream",
                    "fileSize": received.to_string()
                }),
            );
        }
        let reply = Reply::status(308);
        if received == 0 {
            reply
        } else {
            reply.with_header("Range", &format!("bytes=0-{}", received - 1))
        }
    }
}

/// `(start, total)` from `bytes s-e/t`, `bytes s-e/*` or `bytes */t`.
fn parse_content_range(value: &str) -> (Option<u64>, Option<u64>) {
    let spec = value.trim_start_matches("bytes ");
    let (range, total) = spec.split_once('/').unwrap_or((spec, "*"));
    let start = range.split_once('-').and_then(|(s, _)| s.parse().ok());
    (start, total.parse().ok())
}

impl HttpExecutor for FakeDrive {
    fn execute(
        &self,
        request: &RequestSpec,
        _sink: Option<&mut dyn ResponseSink>,
    ) -> GDriveResult<ApiResponse> {
        self.requests.borrow_mut().push(request.clone());

        let reply = if request.method == Method::POST {
            Reply::status(200).with_header("Location", SESSION_URL)
        } else if request.method == Method::PUT && request.url == SESSION_URL {
            let (start, total) = parse_content_range(request.header("content-range").unwrap_or(""));
            let data = match &request.body {
                RequestBody::Bytes(bytes) => bytes.to_vec(),
                _ => Vec::new(),
            };
            if let Some(start) = start {
                let mut received = self.received.borrow_mut();
                if start != received.len() as u64 {
                    return Ok(ApiResponse {
                        status: 400,
                        headers: ResponseHeaders::new(),
                        body: Some(json!({"error": {"message": "offset mismatch"}})),
                    });
                }
                let take = data.len().min(self.accept_cap);
                received.extend_from_slice(&data[..take]);
            }
            self.progress_reply(total)
        } else {
            Reply::json(404, json!({"error": {"message": "not found"}}))
        };

        respond(reply, request.raw_headers, None)
    }
}
