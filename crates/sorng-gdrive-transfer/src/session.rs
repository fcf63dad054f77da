//! Resumable upload session state.
//!
//! An [`UploadSession`] is opened by the initiation request and then only
//! ever moves forward: `bytes_sent` follows the offset the server confirms
//! after each [`Chunk`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{GDriveError, GDriveResult, UploadProgress, UploadStatus};

/// One contiguous slice of the source, sent in a single PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Offset of the first byte within the source.
    pub start: u64,
    /// Shared with the request that carries it; cloning does not copy.
    pub data: Bytes,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset of the last byte (inclusive). Chunks are never empty.
    pub fn end(&self) -> u64 {
        self.start + self.len().saturating_sub(1)
    }

    /// `Content-Range` value; `*` stands in for a total not known yet.
    pub fn content_range(&self, total: Option<u64>) -> String {
        match total {
            Some(total) => format!("bytes {}-{}/{}", self.start, self.end(), total),
            None => format!("bytes {}-{}/*", self.start, self.end()),
        }
    }
}

/// `Content-Range` of the empty PUT that closes a session with no content.
pub fn finalize_range(total: u64) -> String {
    format!("bytes */{total}")
}

/// Upper bound of a `Range: bytes=0-N` header, i.e. `N`.
pub fn parse_range_upper(value: &str) -> Option<u64> {
    let range = value.trim();
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let (_, upper) = range.rsplit_once('-')?;
    upper.trim().parse().ok()
}

/// Bookkeeping for one resumable upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    session_url: String,
    total_bytes: Option<u64>,
    bytes_sent: u64,
}

impl UploadSession {
    pub fn new(session_url: impl Into<String>, total_bytes: Option<u64>) -> Self {
        Self {
            session_url: session_url.into(),
            total_bytes,
            bytes_sent: 0,
        }
    }

    pub fn session_url(&self) -> &str {
        &self.session_url
    }

    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Bytes the server has durably accepted.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes == Some(self.bytes_sent)
    }

    /// Fix the total once the end of a source of unknown length is reached.
    pub fn set_total(&mut self, total: u64) -> GDriveResult<()> {
        match self.total_bytes {
            Some(known) if known != total => Err(GDriveError::upload(format!(
                "Total size already declared as {known}, cannot change to {total}"
            ))),
            _ if total < self.bytes_sent => Err(GDriveError::upload(format!(
                "Total size {total} is below the {} bytes already accepted",
                self.bytes_sent
            ))),
            _ => {
                self.total_bytes = Some(total);
                Ok(())
            }
        }
    }

    /// Record the offset the server confirmed.
    ///
    /// `sent_through` is the offset just past the last byte actually sent;
    /// the server cannot have accepted more than that.
    pub fn confirm(&mut self, offset: u64, sent_through: u64) -> GDriveResult<()> {
        if offset < self.bytes_sent {
            return Err(GDriveError::upload(format!(
                "Server offset moved backwards from {} to {offset}",
                self.bytes_sent
            )));
        }
        if offset > sent_through {
            return Err(GDriveError::upload(format!(
                "Server confirmed {offset} bytes but only {sent_through} were sent"
            )));
        }
        if let Some(total) = self.total_bytes {
            if offset > total {
                return Err(GDriveError::upload(format!(
                    "Server confirmed {offset} bytes of a {total} byte upload"
                )));
            }
        }
        self.bytes_sent = offset;
        Ok(())
    }

    pub fn progress(&self, file_name: &str, status: UploadStatus) -> UploadProgress {
        let percentage = match self.total_bytes {
            Some(total) if total > 0 => (self.bytes_sent as f64 / total as f64) * 100.0,
            Some(_) if status == UploadStatus::Completed => 100.0,
            _ => 0.0,
        };
        UploadProgress {
            file_name: file_name.to_string(),
            bytes_sent: self.bytes_sent,
            total_bytes: self.total_bytes,
            percentage,
            status,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
