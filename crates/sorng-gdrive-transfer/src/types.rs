//! Core types for the Google Drive transfer client.
//!
//! All types are serde-friendly with camelCase JSON field naming and follow
//! the Drive v2 `files` resource model used by the upload and download
//! endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for Google Drive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GDriveErrorKind {
    /// Connection, DNS, TLS, timeout or throughput-watchdog failure.
    Transport,
    /// Well-formed HTTP response with a non-success status.
    Protocol,
    /// A resumable upload session URL could not be obtained.
    SessionInitiation,
    /// Chunked upload could not make progress or finish.
    UploadFailed,
    /// Download could not be started or completed.
    DownloadFailed,
    /// The response sink refused part of a buffer.
    TransferAborted,
    /// No usable OAuth2 token.
    AuthenticationFailed,
    /// Token has expired.
    TokenExpired,
    /// Invalid request parameter or configuration.
    InvalidParameter,
    /// JSON (de)serialization failure.
    Serialization,
}

impl std::fmt::Display for GDriveErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transport => "Transport",
            Self::Protocol => "Protocol",
            Self::SessionInitiation => "SessionInitiation",
            Self::UploadFailed => "UploadFailed",
            Self::DownloadFailed => "DownloadFailed",
            Self::TransferAborted => "TransferAborted",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::TokenExpired => "TokenExpired",
            Self::InvalidParameter => "InvalidParameter",
            Self::Serialization => "Serialization",
        };
        f.write_str(name)
    }
}

/// A Google Drive error.
///
/// Protocol errors carry the HTTP status and the `error` object the server
/// sent back, so callers can inspect `reason`/`domain` entries themselves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GDriveError {
    pub kind: GDriveErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl std::fmt::Display for GDriveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "[{} {}] {}", self.kind, status, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for GDriveError {}

impl GDriveError {
    pub fn new(kind: GDriveErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    /// Build a protocol error from a non-success response.
    ///
    /// Drive wraps failures as `{"error": {"code": .., "message": .., "errors": [..]}}`;
    /// the inner object becomes the payload. Anything else is kept verbatim.
    pub fn from_response(status: u16, body: Option<&Value>) -> Self {
        let payload = body.map(|b| b.get("error").cloned().unwrap_or_else(|| b.clone()));

        let message = match payload.as_ref() {
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("HTTP {status}")),
            Some(Value::String(s)) if !s.is_empty() => s.chars().take(500).collect(),
            _ => format!("HTTP {status}"),
        };

        Self {
            kind: GDriveErrorKind::Protocol,
            message,
            status: Some(status),
            payload,
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::Transport, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::AuthenticationFailed, msg)
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::InvalidParameter, msg)
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::UploadFailed, msg)
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::new(GDriveErrorKind::Serialization, msg)
    }

    pub fn is_transport(&self) -> bool {
        self.kind == GDriveErrorKind::Transport
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == GDriveErrorKind::Protocol && self.status == Some(404)
    }
}

/// Convenience type alias.
pub type GDriveResult<T> = Result<T, GDriveError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  OAuth2
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// OAuth2 client credentials used for token refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCredentials {
    /// OAuth2 client ID from Google Cloud Console.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
}

/// OAuth2 token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token (used to obtain new access tokens).
    pub refresh_token: Option<String>,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Expiry time.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    pub scope: Option<String>,
}

impl Default for OAuthToken {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_at: None,
            scope: None,
        }
    }
}

impl OAuthToken {
    /// A token with no known expiry, e.g. one handed over by the caller.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() >= exp,
            None => false,
        }
    }
}

/// Raw JSON response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Files
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Well-known Google Drive MIME types.
pub mod mime_types {
    pub const FOLDER: &str = "application/vnd.google-apps.folder";
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const JSON: &str = "application/json; charset=UTF-8";

    /// Native Google Workspace documents have no downloadable content.
    pub fn is_google_type(mime: &str) -> bool {
        mime.starts_with("application/vnd.google-apps.")
    }
}

/// Reference to a parent folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,
}

impl ParentReference {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_root: None,
        }
    }
}

/// File labels (v2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLabels {
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub trashed: bool,
}

/// Google Drive file metadata (v2 files resource).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// Unique opaque file ID.
    #[serde(default)]
    pub id: String,
    /// File title.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Size in bytes; v2 serializes it as a decimal string.
    #[serde(default)]
    pub file_size: Option<String>,
    #[serde(default)]
    pub parents: Vec<ParentReference>,
    /// Short-lived direct content URL (blobs only).
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub web_content_link: Option<String>,
    #[serde(default)]
    pub md5_checksum: Option<String>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: FileLabels,
}

impl DriveFile {
    pub fn size(&self) -> Option<u64> {
        self.file_size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn is_folder(&self) -> bool {
        self.mime_type == mime_types::FOLDER
    }

    /// The URL the content bytes are served from, if any.
    pub fn content_url(&self) -> Option<&str> {
        self.download_url
            .as_deref()
            .or(self.web_content_link.as_deref())
            .filter(|u| !u.is_empty())
    }
}

/// Paginated file list response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub items: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Parameters for listing files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesParams {
    /// Drive search query (`q`).
    pub query: Option<String>,
    pub max_results: Option<u32>,
    pub page_token: Option<String>,
    pub order_by: Option<String>,
    /// Extra query pairs passed through untouched.
    #[serde(default)]
    pub extra: Vec<(String, String)>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Uploads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Metadata of the file being created, sent as the JSON part / body of an
/// upload request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationParams {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<ParentReference>,
}

impl DestinationParams {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parents.push(ParentReference::new(parent_id));
        self
    }

    /// MIME type of the content part.
    pub fn content_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(mime_types::OCTET_STREAM)
    }
}

/// Upload strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadStrategy {
    /// Metadata + content in one multipart/related request.
    SingleShot,
    /// Resumable session fed in fixed-size chunks.
    Chunked,
}

/// Upload progress report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub file_name: String,
    pub bytes_sent: u64,
    pub total_bytes: Option<u64>,
    pub percentage: f64,
    pub status: UploadStatus,
}

/// Upload status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UploadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Downloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a single (possibly ranged) download call.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    /// Metadata the content URL was resolved from.
    pub file: DriveFile,
    /// Status of the content GET (200, or 206 for ranged requests).
    pub status: u16,
    pub bytes_written: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default size of one resumable-upload chunk (4 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 4_194_304;
/// Sources larger than this go through a resumable session.
pub const DEFAULT_CHUNK_THRESHOLD_SIZE: u64 = 9_863_168;

/// Drive client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GDriveConfig {
    /// Base URL for metadata endpoints.
    pub api_base: String,
    /// Base URL for upload endpoints.
    pub upload_base: String,
    /// OAuth2 token endpoint (refresh).
    pub token_url: String,
    /// OAuth2 revocation endpoint.
    pub revoke_url: String,
    pub user_agent: String,
    /// Connection-establishment timeout (seconds).
    pub connect_timeout_seconds: u64,
    /// Upper bound for one whole request (seconds).
    pub timeout_seconds: u64,
    /// Minimum response throughput in bytes/s; 0 disables the watchdog.
    pub low_speed_limit: u64,
    /// How long throughput may stay below `low_speed_limit` (seconds).
    pub low_speed_time_seconds: u64,
    /// Bytes per resumable-upload chunk.
    pub chunk_size: u64,
    /// Largest source size still sent as a single multipart request.
    pub chunk_threshold_size: u64,
}

impl Default for GDriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v2".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v2".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            revoke_url: "https://oauth2.googleapis.com/revoke".to_string(),
            user_agent: concat!("sorng-gdrive-transfer/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_seconds: 10,
            timeout_seconds: 300,
            low_speed_limit: 1024,
            low_speed_time_seconds: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_threshold_size: DEFAULT_CHUNK_THRESHOLD_SIZE,
        }
    }
}

impl GDriveConfig {
    /// Reject settings the transfer code cannot work with.
    pub fn validate(&self) -> GDriveResult<()> {
        if self.chunk_size == 0 {
            return Err(GDriveError::invalid("chunk_size must be greater than zero"));
        }
        for (name, value) in [
            ("api_base", &self.api_base),
            ("upload_base", &self.upload_base),
            ("token_url", &self.token_url),
            ("revoke_url", &self.revoke_url),
        ] {
            let parsed = url::Url::parse(value)
                .map_err(|e| GDriveError::invalid(format!("{name} is not a URL: {e}")))?;
            if parsed.scheme() != "https" {
                return Err(GDriveError::invalid(format!("{name} must use https: {value}")));
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
