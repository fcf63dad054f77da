//! # SortOfRemote NG – Google Drive Transfer
//!
//! Blocking Google Drive (v2 REST) client focused on moving file content.
//!
//! ## Features
//!
//! - **Uploads** – single-shot multipart for small sources, resumable chunked
//!   sessions for large or unknown-size ones, driven by server-confirmed offsets
//! - **Downloads** – streamed into a caller-supplied sink, whole or by byte range
//! - **File Management** – get, list (paged), delete
//! - **Folder Management** – create, find, nested folder paths
//! - **OAuth2** – bearer auth, token refresh and revocation
//! - **Transport** – HTTPS-only executor with connect timeout and a
//!   minimum-throughput watchdog; swappable behind [`executor::HttpExecutor`]

pub mod types;
pub mod executor;
pub mod client;
pub mod session;
pub mod auth;
pub mod files;
pub mod folders;
pub mod uploads;
pub mod downloads;

pub use client::GDriveClient;
pub use downloads::{download_file, download_to_path, ByteRange};
pub use executor::{ApiResponse, HttpExecutor, ReqwestExecutor, RequestSpec, ResponseSink, WriterSink};
pub use session::{Chunk, UploadSession};
pub use types::{DestinationParams, DriveFile, GDriveConfig, GDriveError, GDriveErrorKind, GDriveResult};
pub use uploads::{select_strategy, upload_file, upload_path};
