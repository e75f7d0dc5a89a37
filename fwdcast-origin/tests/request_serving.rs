//! Drives `request::serve` end-to-end against a real temp directory,
//! collecting the emitted frame sequence the way `agent.rs` would forward
//! them to the relay. No origin/relay socket involved — this exercises the
//! request-servicing state machine the same way `ferrex-core`'s scanner
//! tests exercise `MediaScanner` against a real filesystem fixture.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fwdcast_origin::request;
use fwdcast_protocol::{Frame, Method};

async fn serve_collect(
    base: &std::path::Path,
    method: Method,
    path: &str,
) -> Vec<Frame> {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let collected = frames.clone();
    request::serve(
        base,
        "test-session",
        "req-1".to_string(),
        method,
        path.to_string(),
        &[],
        move |frame| {
            let collected = collected.clone();
            async move {
                collected.lock().unwrap().push(frame);
                Ok(())
            }
        },
    )
    .await;
    Arc::try_unwrap(frames).unwrap().into_inner().unwrap()
}

fn body_bytes(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        if let Some(Ok(bytes)) = frame.decode_chunk() {
            out.extend(bytes);
        }
    }
    out
}

fn status_of(frames: &[Frame]) -> u16 {
    frames
        .iter()
        .find_map(|f| match f {
            Frame::Response { status, .. } => Some(*status),
            _ => None,
        })
        .expect("a response frame")
}

fn headers_of(frames: &[Frame]) -> HashMap<String, String> {
    frames
        .iter()
        .find_map(|f| match f {
            Frame::Response { headers, .. } => Some(headers.clone()),
            _ => None,
        })
        .expect("a response frame")
}

#[tokio::test]
async fn serves_a_file_with_correct_status_and_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hi there").unwrap();

    let frames = serve_collect(dir.path(), Method::Get, "hello.txt").await;
    assert_eq!(status_of(&frames), 200);
    assert_eq!(body_bytes(&frames), b"hi there");
    assert!(matches!(frames.last(), Some(Frame::End { .. })));
}

#[tokio::test]
async fn head_request_carries_no_body() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hi there").unwrap();

    let frames = serve_collect(dir.path(), Method::Head, "hello.txt").await;
    assert_eq!(status_of(&frames), 200);
    assert!(body_bytes(&frames).is_empty());
    let headers = headers_of(&frames);
    assert_eq!(headers.get("content-length").unwrap(), "8");
}

#[tokio::test]
async fn missing_file_is_a_404() {
    let dir = tempfile::tempdir().unwrap();
    let frames = serve_collect(dir.path(), Method::Get, "nope.txt").await;
    assert_eq!(status_of(&frames), 404);
}

#[tokio::test]
async fn parent_traversal_is_a_403() {
    let dir = tempfile::tempdir().unwrap();
    let frames = serve_collect(dir.path(), Method::Get, "../../etc/passwd").await;
    assert_eq!(status_of(&frames), 403);
}

#[tokio::test]
async fn directory_renders_an_html_listing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("subdir")).unwrap();
    std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

    let frames = serve_collect(dir.path(), Method::Get, "").await;
    assert_eq!(status_of(&frames), 200);
    assert_eq!(
        headers_of(&frames).get("content-type").unwrap(),
        "text/html; charset=utf-8"
    );
    let body = String::from_utf8(body_bytes(&frames)).unwrap();
    assert!(body.contains("subdir"));
    assert!(body.contains("a.txt"));
}

#[tokio::test]
async fn download_zip_contains_every_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"aaa").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/b.txt"), b"bbb").unwrap();

    let frames = serve_collect(dir.path(), Method::Get, "__download__.zip").await;
    assert_eq!(status_of(&frames), 200);
    assert_eq!(
        headers_of(&frames).get("content-type").unwrap(),
        "application/zip"
    );
    let zip_bytes = body_bytes(&frames);
    assert!(!zip_bytes.is_empty());
    // A minimal structural check: every zip stream ends with the end of
    // central directory signature.
    assert_eq!(&zip_bytes[zip_bytes.len() - 22..zip_bytes.len() - 18], b"PK\x05\x06");
}

#[tokio::test]
async fn excluded_entries_are_hidden_from_listings() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("visible.txt"), b"v").unwrap();
    std::fs::write(dir.path().join(".secret"), b"s").unwrap();

    let frames = Arc::new(Mutex::new(Vec::new()));
    let collected = frames.clone();
    request::serve(
        dir.path(),
        "test-session",
        "req-1".to_string(),
        Method::Get,
        String::new(),
        &[".secret".to_string()],
        move |frame| {
            let collected = collected.clone();
            async move {
                collected.lock().unwrap().push(frame);
                Ok(())
            }
        },
    )
    .await;
    let frames = Arc::try_unwrap(frames).unwrap().into_inner().unwrap();
    let body = String::from_utf8(body_bytes(&frames)).unwrap();
    assert!(body.contains("visible.txt"));
    assert!(!body.contains(".secret"));
}
