mod common;

use std::io::Write;

use common::{authed, small_chunks, source, FakeDrive, Reply, ScriptedExecutor, SESSION_URL};
use reqwest::Method;
use serde_json::{json, Value};
use sorng_gdrive_transfer::executor::RequestBody;
use sorng_gdrive_transfer::types::{
    DestinationParams, GDriveConfig, GDriveErrorKind, UploadStrategy, DEFAULT_CHUNK_THRESHOLD_SIZE,
};
use sorng_gdrive_transfer::{select_strategy, upload_file, upload_path, GDriveClient};

fn body_text(body: &RequestBody) -> String {
    match body {
        RequestBody::Bytes(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
        other => panic!("expected a byte body, got {other:?}"),
    }
}

fn file_reply() -> Reply {
    Reply::json(200, json!({"id": "file-1", "title": "Car.txt", "fileSize": "100"}))
}

#[test]
fn test_strategy_follows_threshold() {
    let t = DEFAULT_CHUNK_THRESHOLD_SIZE;
    assert_eq!(select_strategy(Some(100), t), UploadStrategy::SingleShot);
    assert_eq!(select_strategy(Some(t), t), UploadStrategy::SingleShot);
    assert_eq!(select_strategy(Some(t + 1), t), UploadStrategy::Chunked);
    assert_eq!(select_strategy(None, t), UploadStrategy::Chunked);
}

#[test]
fn test_single_shot_multipart_body() {
    let client = authed(ScriptedExecutor::new(vec![file_reply()]), GDriveConfig::default());
    let data = source(100);
    let params = DestinationParams {
        mime_type: Some("text/plain".into()),
        ..DestinationParams::titled("Car.txt").with_parent("folder-1")
    };

    let file = upload_file(&client, &params, data.as_slice(), Some(100)).unwrap();
    assert_eq!(file.id, "file-1");
    assert_eq!(file.size(), Some(100));

    let requests = client.executor().requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::POST);
    assert_eq!(
        req.url,
        "https://www.googleapis.com/upload/drive/v2/files?uploadType=multipart"
    );
    assert_eq!(req.header("authorization"), Some("Bearer ya29.test"));

    let content_type = req.header("content-type").unwrap();
    let boundary = content_type
        .strip_prefix("multipart/related; boundary=")
        .unwrap()
        .to_string();
    let text = body_text(&req.body);
    assert_eq!(text.matches(boundary.as_str()).count(), 3);

    let parts: Vec<&str> = text.split(&format!("--{boundary}")).collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[3], "--");

    let (json_headers, json_part) = parts[1].split_once("\r\n\r\n").unwrap();
    assert!(json_headers.contains("Content-Type: application/json; charset=UTF-8"));
    let metadata: Value = serde_json::from_str(json_part.trim_end_matches("\r\n")).unwrap();
    assert_eq!(metadata, serde_json::to_value(&params).unwrap());

    let (bin_headers, bin_part) = parts[2].split_once("\r\n\r\n").unwrap();
    assert!(bin_headers.contains("Content-Type: text/plain"));
    assert_eq!(bin_part.trim_end_matches("\r\n").as_bytes(), data.as_slice());
}

#[test]
fn test_single_shot_short_source_sends_nothing() {
    let client = authed(ScriptedExecutor::new(vec![file_reply()]), GDriveConfig::default());
    let data = source(50);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(100))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::InvalidParameter);
    assert!(client.executor().requests().is_empty());
}

#[test]
fn test_chunked_known_size_ranges_are_contiguous() {
    let client = authed(FakeDrive::new(), small_chunks(10, 25));
    let data = source(45);
    let params = DestinationParams {
        mime_type: Some("image/jpeg".into()),
        ..DestinationParams::titled("big.jpg")
    };

    let file = upload_file(&client, &params, data.as_slice(), Some(45)).unwrap();
    assert_eq!(file.id, "file-1");

    let drive = client.executor();
    assert_eq!(
        drive.content_ranges(),
        [
            "bytes 0-9/45",
            "bytes 10-19/45",
            "bytes 20-29/45",
            "bytes 30-39/45",
            "bytes 40-44/45"
        ]
    );
    assert_eq!(*drive.received.borrow(), data);

    let requests = drive.requests();
    let init = &requests[0];
    assert_eq!(init.method, Method::POST);
    assert!(init.url.ends_with("files?uploadType=resumable"));
    assert!(init.raw_headers);
    assert_eq!(init.header("x-upload-content-length"), Some("45"));
    assert_eq!(init.header("x-upload-content-type"), Some("image/jpeg"));
    assert_eq!(init.body, RequestBody::Json(json!({"title": "big.jpg", "mimeType": "image/jpeg"})));

    for put in &requests[1..] {
        assert_eq!(put.url, SESSION_URL);
        let len = put.body_bytes().unwrap().len();
        assert_eq!(put.header("content-length"), Some(len.to_string().as_str()));
        assert_eq!(put.header("authorization"), Some("Bearer ya29.test"));
    }
}

#[test]
fn test_chunk_bodies_reconstruct_source() {
    let client = authed(FakeDrive::new(), small_chunks(8, 10));
    let data = source(61);
    upload_file(&client, &DestinationParams::titled("a"), data.as_slice(), Some(61)).unwrap();

    let joined: Vec<u8> = client
        .executor()
        .requests()
        .iter()
        .filter(|r| r.method == Method::PUT)
        .flat_map(|r| r.body_bytes().unwrap().to_vec())
        .collect();
    assert_eq!(joined, data);
}

#[test]
fn test_chunked_unknown_size_declares_total_on_last_chunk() {
    let client = authed(FakeDrive::new(), small_chunks(10, 25));
    let data = source(25);
    upload_file(&client, &DestinationParams::titled("stream"), data.as_slice(), None).unwrap();
    assert_eq!(
        client.executor().content_ranges(),
        ["bytes 0-9/*", "bytes 10-19/*", "bytes 20-24/25"]
    );
    assert!(client.executor().requests()[0]
        .header("x-upload-content-length")
        .is_none());
}

#[test]
fn test_chunked_unknown_size_exact_multiple() {
    let client = authed(FakeDrive::new(), small_chunks(10, 25));
    let data = source(20);
    upload_file(&client, &DestinationParams::titled("stream"), data.as_slice(), None).unwrap();
    assert_eq!(client.executor().content_ranges(), ["bytes 0-9/*", "bytes 10-19/20"]);
    assert_eq!(*client.executor().received.borrow(), data);
}

#[test]
fn test_empty_unknown_source_is_finalized() {
    let client = authed(FakeDrive::new(), small_chunks(10, 25));
    upload_file(&client, &DestinationParams::titled("empty"), &b""[..], None).unwrap();

    let requests = client.executor().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].header("content-range"), Some("bytes */0"));
    assert_eq!(requests[1].header("content-length"), Some("0"));
}

#[test]
fn test_server_range_moves_next_chunk_start() {
    let client = authed(FakeDrive::new(), GDriveConfig::default());
    let data = source(10_000_000);
    upload_file(&client, &DestinationParams::titled("big"), data.as_slice(), Some(10_000_000))
        .unwrap();
    assert_eq!(
        client.executor().content_ranges(),
        [
            "bytes 0-4194303/10000000",
            "bytes 4194304-8388607/10000000",
            "bytes 8388608-9999999/10000000"
        ]
    );
}

#[test]
fn test_partial_acceptance_resends_unconfirmed_tail() {
    let client = authed(FakeDrive::with_accept_cap(7), small_chunks(10, 15));
    let data = source(20);
    upload_file(&client, &DestinationParams::titled("p"), data.as_slice(), Some(20)).unwrap();

    assert_eq!(
        client.executor().content_ranges(),
        ["bytes 0-9/20", "bytes 7-16/20", "bytes 14-19/20"]
    );
    assert_eq!(*client.executor().received.borrow(), data);
}

#[test]
fn test_missing_location_issues_no_put() {
    let client = authed(
        ScriptedExecutor::new(vec![Reply::status(200), file_reply()]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::SessionInitiation);

    let requests = client.executor().requests();
    assert_eq!(requests.len(), 1);
    assert!(requests.iter().all(|r| r.method != Method::PUT));
}

#[test]
fn test_plain_http_session_url_is_refused() {
    let client = authed(
        ScriptedExecutor::new(vec![
            Reply::status(200).with_header("Location", "http://www.googleapis.com/upload/x")
        ]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::SessionInitiation);
    assert_eq!(client.executor().requests().len(), 1);
}

#[test]
fn test_initiation_error_status_is_protocol() {
    let client = authed(
        ScriptedExecutor::new(vec![Reply::json(
            403,
            json!({"error": {"code": 403, "message": "Insufficient permissions"}}),
        )]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::Protocol);
    assert_eq!(err.status, Some(403));
    assert_eq!(err.message, "Insufficient permissions");
}

#[test]
fn test_chunk_error_status_stops_upload() {
    let client = authed(
        ScriptedExecutor::new(vec![
            Reply::status(200).with_header("Location", SESSION_URL),
            Reply::json(500, json!({"error": {"message": "backend error"}})),
            Reply::status(308).with_header("Range", "bytes=0-19"),
        ]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::Protocol);
    assert_eq!(err.status, Some(500));
    assert_eq!(client.executor().requests().len(), 2);
    assert_eq!(client.executor().remaining(), 1);
}

#[test]
fn test_no_progress_fails_instead_of_looping() {
    let client = authed(
        ScriptedExecutor::new(vec![
            Reply::status(200).with_header("Location", SESSION_URL),
            Reply::status(308),
        ]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::UploadFailed);
    assert_eq!(client.executor().requests().len(), 2);
}

#[test]
fn test_overflowing_range_fails_upload() {
    let client = authed(
        ScriptedExecutor::new(vec![
            Reply::status(200).with_header("Location", SESSION_URL),
            Reply::status(308).with_header("Range", "bytes=0-18446744073709551615"),
        ]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::UploadFailed);
    assert_eq!(client.executor().requests().len(), 2);
}

#[test]
fn test_transport_error_mid_upload_aborts() {
    // Only the initiation is answered; the first PUT fails in transport.
    let client = authed(
        ScriptedExecutor::new(vec![Reply::status(200).with_header("Location", SESSION_URL)]),
        small_chunks(10, 25),
    );
    let data = source(40);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(40))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::Transport);

    let requests = client.executor().requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, Method::PUT);
    assert_eq!(requests[1].header("content-range"), Some("bytes 0-9/40"));
}

#[test]
fn test_huge_declared_size_with_short_source() {
    let client = authed(ScriptedExecutor::new(vec![file_reply()]), small_chunks(10, u64::MAX));
    let data = source(5);
    let err = upload_file(
        &client,
        &DestinationParams::titled("x"),
        data.as_slice(),
        Some(u64::MAX / 2),
    )
    .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::InvalidParameter);
    assert!(client.executor().requests().is_empty());
}

#[test]
fn test_source_shorter_than_declared_fails() {
    let client = authed(FakeDrive::new(), small_chunks(10, 25));
    let data = source(30);
    let err = upload_file(&client, &DestinationParams::titled("x"), data.as_slice(), Some(45))
        .unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::UploadFailed);
    assert_eq!(
        client.executor().content_ranges(),
        ["bytes 0-9/45", "bytes 10-19/45", "bytes 20-29/45"]
    );
}

#[test]
fn test_upload_without_token_is_rejected() {
    let client = GDriveClient::with_executor(ScriptedExecutor::new(vec![file_reply()]), GDriveConfig::default())
        .unwrap();
    let err = upload_file(&client, &DestinationParams::titled("x"), &b"abc"[..], Some(3)).unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::AuthenticationFailed);
    assert!(client.executor().requests().is_empty());
}

#[test]
fn test_upload_path_guesses_title_and_mime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"hello drive!").unwrap();
    drop(f);

    let client = authed(ScriptedExecutor::new(vec![file_reply()]), GDriveConfig::default());
    upload_path(&client, &path, None).unwrap();

    let requests = client.executor().requests();
    assert_eq!(requests.len(), 1);
    let text = body_text(&requests[0].body);
    assert!(text.contains(r#""title":"notes.txt""#));
    assert!(text.contains("Content-Type: text/plain"));
    assert!(text.contains("hello drive!"));
}

#[test]
fn test_upload_path_missing_file() {
    let client = authed(ScriptedExecutor::new(vec![]), GDriveConfig::default());
    let err = upload_path(&client, "/definitely/not/here.bin", None).unwrap_err();
    assert_eq!(err.kind, GDriveErrorKind::InvalidParameter);
}
