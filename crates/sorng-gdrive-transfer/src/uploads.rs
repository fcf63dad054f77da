//! File upload operations for Google Drive.
//!
//! Two strategies are used, picked by source size:
//! - **Single-shot**: metadata + content in one `multipart/related` POST.
//! - **Chunked**: a resumable session fed with fixed-size chunks, each PUT
//!   starting at the offset the server confirmed for the previous one.
//!
//! Nothing is retried. An upload aborted mid-way may leave a partial session
//! on the server; no cleanup is attempted.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::{debug, info, warn};
use reqwest::Method;

use crate::client::GDriveClient;
use crate::executor::{ensure_https, ApiResponse, HttpExecutor};
use crate::session::{finalize_range, parse_range_upper, Chunk, UploadSession};
use crate::types::{
    mime_types, DestinationParams, DriveFile, GDriveError, GDriveErrorKind, GDriveResult,
    UploadStatus, UploadStrategy,
};

/// Status Drive answers while a resumable session still expects bytes.
const RESUME_INCOMPLETE: u16 = 308;

/// Pick the upload strategy for a source of the given size.
///
/// An unknown size always goes through a resumable session.
pub fn select_strategy(total_bytes: Option<u64>, threshold: u64) -> UploadStrategy {
    match total_bytes {
        Some(total) if total <= threshold => UploadStrategy::SingleShot,
        _ => UploadStrategy::Chunked,
    }
}

/// Upload a byte source as a new Drive file.
pub fn upload_file<E, R>(
    client: &GDriveClient<E>,
    params: &DestinationParams,
    source: R,
    total_bytes: Option<u64>,
) -> GDriveResult<DriveFile>
where
    E: HttpExecutor,
    R: Read,
{
    match select_strategy(total_bytes, client.config().chunk_threshold_size) {
        UploadStrategy::SingleShot => {
            let total = total_bytes.unwrap_or_default();
            upload_single_shot(client, params, source, total)
        }
        UploadStrategy::Chunked => upload_chunked(client, params, source, total_bytes),
    }
}

/// Upload a local file. Title and MIME type default to the file name and
/// its guessed type.
pub fn upload_path<E: HttpExecutor>(
    client: &GDriveClient<E>,
    path: impl AsRef<Path>,
    params: Option<DestinationParams>,
) -> GDriveResult<DriveFile> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        GDriveError::invalid(format!("Cannot open '{}': {e}", path.display()))
    })?;
    let size = file
        .metadata()
        .map_err(|e| GDriveError::invalid(format!("Cannot stat '{}': {e}", path.display())))?
        .len();

    let mut params = params.unwrap_or_default();
    if params.title.is_empty() {
        params.title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
    }
    if params.mime_type.is_none() {
        params.mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    }

    upload_file(client, &params, file, Some(size))
}

// ── Single-shot upload ───────────────────────────────────────────

fn upload_single_shot<E: HttpExecutor, R: Read>(
    client: &GDriveClient<E>,
    params: &DestinationParams,
    source: R,
    total_bytes: u64,
) -> GDriveResult<DriveFile> {
    let mut data = Vec::new();
    source
        .take(total_bytes)
        .read_to_end(&mut data)
        .map_err(|e| GDriveError::upload(format!("Failed to read source: {e}")))?;
    if (data.len() as u64) < total_bytes {
        return Err(GDriveError::invalid(format!(
            "Source ended after {} of {} bytes",
            data.len(),
            total_bytes
        )));
    }

    debug!("Starting multipart upload of '{}' ({} bytes)", params.title, data.len());

    let metadata = serde_json::to_vec(params)
        .map_err(|e| GDriveError::serialization(format!("Metadata serialization: {e}")))?;
    let boundary = new_boundary();
    let body = build_multipart_body(&boundary, &metadata, params.content_type(), &data);

    let url = format!("{}?uploadType=multipart", client.upload_url("files"));
    let request = client
        .authorized(Method::POST, url)?
        .with_header("Content-Type", format!("multipart/related; boundary={boundary}"))
        .with_bytes(body);

    let file: DriveFile = client.execute_checked(&request)?.json()?;
    info!("Multipart upload complete: {} ({})", file.title, file.id);
    Ok(file)
}

/// Random boundary token for a multipart body.
pub fn new_boundary() -> String {
    format!("sorng_gdrive_{}", uuid::Uuid::new_v4().simple())
}

/// Assemble a two-part `multipart/related` body: JSON metadata, then content.
pub fn build_multipart_body(
    boundary: &str,
    metadata_json: &[u8],
    content_type: &str,
    data: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + metadata_json.len() + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_types::JSON).as_bytes());
    body.extend_from_slice(metadata_json);
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--").as_bytes());
    body
}

// ── Chunked (resumable) upload ───────────────────────────────────

fn upload_chunked<E: HttpExecutor, R: Read>(
    client: &GDriveClient<E>,
    params: &DestinationParams,
    source: R,
    total_bytes: Option<u64>,
) -> GDriveResult<DriveFile> {
    let chunk_size = client.config().chunk_size;
    info!(
        "Starting resumable upload of '{}' ({} bytes, chunk size: {} bytes)",
        params.title,
        total_bytes.map_or_else(|| "unknown".to_string(), |t| t.to_string()),
        chunk_size
    );

    let mut session = initiate_session(client, params, total_bytes)?;

    // A declared total caps what is read from the source.
    let source = source.take(total_bytes.unwrap_or(u64::MAX));
    let mut feeder = ChunkFeeder::new(source, chunk_size as usize);
    let mut chunks_sent = 0u32;

    while let Some(chunk) = feeder.next_chunk(session.bytes_sent())? {
        if session.total_bytes().is_none() && !feeder.has_more()? {
            session.set_total(chunk.end() + 1)?;
        }

        let resp = send_chunk(client, &session, &chunk)?;
        chunks_sent += 1;
        let sent_through = chunk.end() + 1;

        match resp.status {
            200 | 201 => return finish(&mut session, sent_through, &resp, &params.title),
            RESUME_INCOMPLETE => {
                let confirmed = match resp.header("range").and_then(parse_range_upper) {
                    Some(upper) => upper.checked_add(1).ok_or_else(|| {
                        GDriveError::upload(format!(
                            "Server confirmed an impossible range ending at {upper}"
                        ))
                    })?,
                    None => session.bytes_sent(),
                };
                if confirmed <= session.bytes_sent() {
                    warn!(
                        "Resumable upload of '{}' stalled at {} bytes",
                        params.title,
                        session.bytes_sent()
                    );
                    return Err(GDriveError::upload(format!(
                        "Server accepted no bytes of chunk {}",
                        chunk.content_range(session.total_bytes())
                    )));
                }
                session.confirm(confirmed, sent_through)?;
                if confirmed < sent_through {
                    let unconfirmed = (confirmed - chunk.start) as usize;
                    feeder.carry_over(chunk.data[unconfirmed..].to_vec());
                }
                debug!(
                    "Resumable upload progress: {:?}",
                    session.progress(&params.title, UploadStatus::InProgress)
                );
            }
            status => return Err(GDriveError::from_response(status, resp.body.as_ref())),
        }
    }

    if chunks_sent == 0 && session.total_bytes().unwrap_or(0) == 0 {
        session.set_total(0)?;
        let resp = finalize_empty(client, &session)?;
        if resp.is_success() {
            return finish(&mut session, 0, &resp, &params.title);
        }
        return Err(GDriveError::from_response(resp.status, resp.body.as_ref()));
    }

    Err(GDriveError::upload(format!(
        "Source exhausted after {} bytes but the server did not complete the upload{}",
        session.bytes_sent(),
        session
            .total_bytes()
            .map(|t| format!(" (expected {t} bytes)"))
            .unwrap_or_default()
    )))
}

/// Open a resumable session and return it with its upload URL.
fn initiate_session<E: HttpExecutor>(
    client: &GDriveClient<E>,
    params: &DestinationParams,
    total_bytes: Option<u64>,
) -> GDriveResult<UploadSession> {
    let url = format!("{}?uploadType=resumable", client.upload_url("files"));
    let mut request = client
        .authorized(Method::POST, url)?
        .with_header("Content-Type", mime_types::JSON)
        .with_header("X-Upload-Content-Type", params.content_type())
        .with_json(params)?
        .with_raw_headers();
    if let Some(total) = total_bytes {
        request = request.with_header("X-Upload-Content-Length", total.to_string());
    }

    let resp = client.execute_checked(&request)?;
    let location = resp.header("location").ok_or_else(|| {
        GDriveError::new(
            GDriveErrorKind::SessionInitiation,
            format!("No Location header in resumable session response (HTTP {})", resp.status),
        )
    })?;
    ensure_https(location).map_err(|e| {
        GDriveError::new(
            GDriveErrorKind::SessionInitiation,
            format!("Unusable session URL: {}", e.message),
        )
    })?;

    debug!("Resumable session opened: {}", location);
    Ok(UploadSession::new(location, total_bytes))
}

fn send_chunk<E: HttpExecutor>(
    client: &GDriveClient<E>,
    session: &UploadSession,
    chunk: &Chunk,
) -> GDriveResult<ApiResponse> {
    let content_range = chunk.content_range(session.total_bytes());
    debug!("Uploading chunk {}", content_range);
    let request = client
        .authorized(Method::PUT, session.session_url())?
        .with_header("Content-Length", chunk.len().to_string())
        .with_header("Content-Range", content_range)
        .with_bytes(chunk.data.clone());
    client.execute(&request)
}

fn finalize_empty<E: HttpExecutor>(
    client: &GDriveClient<E>,
    session: &UploadSession,
) -> GDriveResult<ApiResponse> {
    let request = client
        .authorized(Method::PUT, session.session_url())?
        .with_header("Content-Length", "0")
        .with_header("Content-Range", finalize_range(0));
    client.execute(&request)
}

fn finish(
    session: &mut UploadSession,
    sent_through: u64,
    resp: &ApiResponse,
    title: &str,
) -> GDriveResult<DriveFile> {
    session.confirm(sent_through, sent_through)?;
    let file: DriveFile = resp.json().map_err(|e| {
        GDriveError::upload(format!("Upload finished but the response was unusable: {}", e.message))
    })?;
    info!(
        "Resumable upload complete: {} ({}), {:?}",
        file.title,
        file.id,
        session.progress(title, UploadStatus::Completed)
    );
    Ok(file)
}

/// Cuts a reader into chunks, re-queueing bytes the server did not confirm.
struct ChunkFeeder<R> {
    source: R,
    chunk_size: usize,
    /// Bytes to send before reading more from `source`.
    carry: Vec<u8>,
    eof: bool,
}

impl<R: Read> ChunkFeeder<R> {
    fn new(source: R, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size,
            carry: Vec::new(),
            eof: false,
        }
    }

    /// Next chunk starting at `start`, or `None` once the source is drained.
    fn next_chunk(&mut self, start: u64) -> GDriveResult<Option<Chunk>> {
        let mut data = std::mem::take(&mut self.carry);
        if data.len() < self.chunk_size && !self.eof {
            let want = self.chunk_size - data.len();
            let read = self.read_up_to(&mut data, want)?;
            if read < want {
                self.eof = true;
            }
        }
        if data.len() > self.chunk_size {
            self.carry = data.split_off(self.chunk_size);
        }
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Chunk {
            start,
            data: data.into(),
        }))
    }

    /// Whether anything remains after the chunk just produced.
    fn has_more(&mut self) -> GDriveResult<bool> {
        if !self.carry.is_empty() {
            return Ok(true);
        }
        if self.eof {
            return Ok(false);
        }
        let mut peek = Vec::with_capacity(1);
        if self.read_up_to(&mut peek, 1)? == 0 {
            self.eof = true;
            return Ok(false);
        }
        self.carry = peek;
        Ok(true)
    }

    /// Put unconfirmed bytes back in front of the queue.
    fn carry_over(&mut self, mut bytes: Vec<u8>) {
        bytes.append(&mut self.carry);
        self.carry = bytes;
    }

    fn read_up_to(&mut self, buf: &mut Vec<u8>, limit: usize) -> GDriveResult<usize> {
        (&mut self.source)
            .take(limit as u64)
            .read_to_end(buf)
            .map_err(|e: io::Error| GDriveError::upload(format!("Failed to read source: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
