//! Google Drive folder operations.
//!
//! Folders in Drive are files with MIME type `application/vnd.google-apps.folder`.
//! This module provides convenience wrappers around the generic file operations.

use serde::Serialize;

use crate::client::GDriveClient;
use crate::executor::HttpExecutor;
use crate::files::{self, escape_query_value};
use crate::types::{mime_types, DriveFile, GDriveError, GDriveResult, ListFilesParams, ParentReference};

/// Body of a folder-creation request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFolder<'a> {
    title: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<ParentReference>,
}

/// Create a new folder.
pub fn create_folder<E: HttpExecutor>(
    client: &GDriveClient<E>,
    name: &str,
    parent_id: Option<&str>,
) -> GDriveResult<DriveFile> {
    if name.is_empty() {
        return Err(GDriveError::invalid("Folder name is empty"));
    }
    let body = NewFolder {
        title: name,
        mime_type: mime_types::FOLDER,
        parents: parent_id.map(|p| vec![ParentReference::new(p)]).unwrap_or_default(),
    };
    client.post_json(&client.api_url("files"), &body)
}

/// Create nested folders, returning the innermost folder.
pub fn create_folder_path<E: HttpExecutor>(
    client: &GDriveClient<E>,
    path: &[&str],
    root_parent_id: Option<&str>,
) -> GDriveResult<DriveFile> {
    let mut current_parent = root_parent_id.map(|s| s.to_string());

    let mut last_folder = None;
    for segment in path {
        let folder = create_folder(client, segment, current_parent.as_deref())?;
        current_parent = Some(folder.id.clone());
        last_folder = Some(folder);
    }

    last_folder.ok_or_else(|| GDriveError::invalid("Path must contain at least one segment"))
}

fn folder_query(name: &str, parent_id: Option<&str>) -> String {
    let mut q = format!(
        "mimeType = '{}' and title = '{}' and trashed = false",
        mime_types::FOLDER,
        escape_query_value(name)
    );
    if let Some(pid) = parent_id {
        q.push_str(&format!(" and '{}' in parents", escape_query_value(pid)));
    }
    q
}

/// Search for a folder by name under a given parent.
pub fn find_folder<E: HttpExecutor>(
    client: &GDriveClient<E>,
    name: &str,
    parent_id: Option<&str>,
) -> GDriveResult<Option<DriveFile>> {
    let params = ListFilesParams {
        query: Some(folder_query(name, parent_id)),
        max_results: Some(1),
        ..Default::default()
    };
    let list = files::list_files(client, &params)?;
    Ok(list.items.into_iter().next())
}

/// Get or create a folder by name under a given parent.
pub fn get_or_create_folder<E: HttpExecutor>(
    client: &GDriveClient<E>,
    name: &str,
    parent_id: Option<&str>,
) -> GDriveResult<DriveFile> {
    if let Some(existing) = find_folder(client, name, parent_id)? {
        return Ok(existing);
    }
    create_folder(client, name, parent_id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
