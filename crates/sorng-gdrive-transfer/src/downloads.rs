//! File download operations for Google Drive.
//!
//! A download resolves the file's direct content URL from its metadata, then
//! streams that URL (optionally one byte range of it) into a
//! [`ResponseSink`]. Windows of a large file are fetched by calling
//! [`download_file`] repeatedly with successive [`ByteRange`]s.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::{debug, info};
use reqwest::Method;

use crate::client::GDriveClient;
use crate::executor::{HttpExecutor, ResponseSink, WriterSink};
use crate::files;
use crate::types::{DownloadOutcome, GDriveError, GDriveErrorKind, GDriveResult};

/// Inclusive byte window `start..=end` of a file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> GDriveResult<Self> {
        if end < start {
            return Err(GDriveError::invalid(format!("Invalid byte range {start}-{end}")));
        }
        Ok(Self { start, end })
    }

    /// First window of a `total`-byte file.
    pub fn first(total: u64, chunk: u64) -> Option<Self> {
        Self::window_at(0, total, chunk)
    }

    /// The window after this one; both bounds move by `chunk`, the end is
    /// clamped to the last byte.
    pub fn next_window(&self, total: u64, chunk: u64) -> Option<Self> {
        Self::window_at(self.start.checked_add(chunk)?, total, chunk)
    }

    fn window_at(start: u64, total: u64, chunk: u64) -> Option<Self> {
        if chunk == 0 || start >= total {
            return None;
        }
        let end = start.saturating_add(chunk - 1).min(total - 1);
        Some(Self { start, end })
    }

    /// Number of bytes in the window; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` request header value.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Counts what the wrapped sink actually accepted.
struct CountingSink<'a> {
    inner: &'a mut dyn ResponseSink,
    written: u64,
}

impl ResponseSink for CountingSink<'_> {
    fn accept(&mut self, chunk: &[u8]) -> usize {
        let accepted = self.inner.accept(chunk);
        self.written += accepted as u64;
        accepted
    }
}

/// Stream a file's content (or one range of it) into `sink`.
pub fn download_file<E: HttpExecutor>(
    client: &GDriveClient<E>,
    file_id: &str,
    sink: &mut dyn ResponseSink,
    range: Option<ByteRange>,
) -> GDriveResult<DownloadOutcome> {
    let file = files::get_file(client, file_id)?;
    let url = file.content_url().map(str::to_string).ok_or_else(|| {
        GDriveError::new(
            GDriveErrorKind::DownloadFailed,
            format!(
                "File '{}' ({}) has no downloadable content",
                file.title, file.mime_type
            ),
        )
    })?;

    let mut request = client.authorized(Method::GET, url)?;
    if let Some(range) = range {
        request = request.with_header("Range", range.header_value());
    }
    debug!(
        "Downloading file {}{}",
        file_id,
        range.map(|r| format!(" ({})", r.header_value())).unwrap_or_default()
    );

    let mut counting = CountingSink {
        inner: sink,
        written: 0,
    };
    let resp = client.execute_streaming(&request, &mut counting)?;
    if !resp.is_success() {
        return Err(GDriveError::from_response(resp.status, resp.body.as_ref()));
    }

    let bytes_written = counting.written;
    info!("Downloaded {} bytes of {} (HTTP {})", bytes_written, file_id, resp.status);
    Ok(DownloadOutcome {
        file,
        status: resp.status,
        bytes_written,
    })
}

/// Download a file's whole content to a local path.
pub fn download_to_path<E: HttpExecutor>(
    client: &GDriveClient<E>,
    file_id: &str,
    destination: impl AsRef<Path>,
) -> GDriveResult<DownloadOutcome> {
    let destination = destination.as_ref();
    let out = File::create(destination).map_err(|e| {
        GDriveError::new(
            GDriveErrorKind::DownloadFailed,
            format!("Cannot create file '{}': {e}", destination.display()),
        )
    })?;

    let mut sink = WriterSink::new(out);
    let result = download_file(client, file_id, &mut sink, None);
    if let Some(e) = sink.error() {
        return Err(GDriveError::new(
            GDriveErrorKind::DownloadFailed,
            format!("Write error: {e}"),
        ));
    }
    let outcome = result?;

    sink.into_inner().flush().map_err(|e| {
        GDriveError::new(GDriveErrorKind::DownloadFailed, format!("Flush error: {e}"))
    })?;
    info!("Saved {} bytes to {}", outcome.bytes_written, destination.display());
    Ok(outcome)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
