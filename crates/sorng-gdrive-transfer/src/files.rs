//! Google Drive file metadata operations (get, list, delete).

use log::debug;

use crate::client::GDriveClient;
use crate::executor::HttpExecutor;
use crate::types::{DriveFile, FileList, GDriveResult, ListFilesParams};

/// Get file metadata by ID.
pub fn get_file<E: HttpExecutor>(client: &GDriveClient<E>, file_id: &str) -> GDriveResult<DriveFile> {
    let url = client.file_url(file_id)?;
    client.get_json(&url)
}

/// Query pairs for a `files.list` call.
pub fn list_query(params: &ListFilesParams) -> Vec<(String, String)> {
    let mut query: Vec<(String, String)> = Vec::new();

    if let Some(ref q) = params.query {
        query.push(("q".into(), q.clone()));
    }
    if let Some(max) = params.max_results {
        query.push(("maxResults".into(), max.to_string()));
    }
    if let Some(ref token) = params.page_token {
        query.push(("pageToken".into(), token.clone()));
    }
    if let Some(ref order) = params.order_by {
        query.push(("orderBy".into(), order.clone()));
    }
    query.extend(params.extra.iter().cloned());

    query
}

/// List one page of files matching the given parameters.
pub fn list_files<E: HttpExecutor>(
    client: &GDriveClient<E>,
    params: &ListFilesParams,
) -> GDriveResult<FileList> {
    let url = client.api_url("files");
    let query = list_query(params);
    if query.is_empty() {
        return client.get_json(&url);
    }
    client.get_json_with_query(&url, &query)
}

/// List all files matching the params by consuming all pages.
pub fn list_all_files<E: HttpExecutor>(
    client: &GDriveClient<E>,
    params: &ListFilesParams,
) -> GDriveResult<Vec<DriveFile>> {
    let mut all_files = Vec::new();
    let mut page_params = params.clone();

    loop {
        let page = list_files(client, &page_params)?;
        all_files.extend(page.items);

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_params.page_token = Some(token),
            _ => break,
        }
    }

    debug!("Listed {} files", all_files.len());
    Ok(all_files)
}

/// Delete a file permanently (bypasses trash).
pub fn delete_file<E: HttpExecutor>(client: &GDriveClient<E>, file_id: &str) -> GDriveResult<()> {
    let url = client.file_url(file_id)?;
    client.delete(&url)
}

/// Quote a value for use inside a Drive search query string literal.
pub fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
