//! Per-request servicing: one independent activity per incoming `request`
//! frame, exactly as `spec.md` §4.5's six-step algorithm. Ordered only
//! within its own `id` — concurrent requests for different IDs interleave
//! freely, matched by spawning each from `agent.rs` as its own task.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use fwdcast_protocol::{Frame, Method};
use percent_encoding::percent_decode_str;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::listing;
use crate::mime;
use crate::scan;
use crate::zip;

const CHUNK_SIZE: usize = 64 * 1024;
const DOWNLOAD_MARKER: &str = "__download__.zip";
const AUTH_MARKER: &str = "__auth__";

/// Services one request end-to-end, emitting `response`/`data`/`end` frames
/// through `emit`. `emit` failing (the Relay connection is gone) aborts the
/// remainder of this request — there's nowhere left to send the rest.
pub async fn serve<F, Fut>(
    base: &Path,
    session_id: &str,
    id: String,
    method: Method,
    raw_path: String,
    excludes: &[String],
    mut emit: F,
) where
    F: FnMut(Frame) -> Fut,
    Fut: std::future::Future<Output = Result<(), ()>>,
{
    let path = normalize(&raw_path);

    if path == AUTH_MARKER || path.starts_with(&format!("{AUTH_MARKER}/")) {
        let _ = emit(not_found(&id)).await;
        let _ = emit(Frame::End { id }).await;
        return;
    }

    if path == DOWNLOAD_MARKER || path.ends_with(&format!("/{DOWNLOAD_MARKER}")) {
        let subdir = path.strip_suffix(DOWNLOAD_MARKER).unwrap_or("").trim_end_matches('/');
        serve_zip(base, id, subdir, excludes, &mut emit).await;
        return;
    }

    let resolved = match resolve(base, &path) {
        Some(resolved) => resolved,
        None => {
            let _ = emit(forbidden(&id)).await;
            let _ = emit(Frame::End { id }).await;
            return;
        }
    };

    let metadata = match tokio::fs::metadata(&resolved).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let _ = emit(not_found(&id)).await;
            let _ = emit(Frame::End { id }).await;
            return;
        }
        Err(err) => {
            warn!(path = %resolved.display(), error = %err, "stat failed");
            let _ = emit(server_error(&id)).await;
            let _ = emit(Frame::End { id }).await;
            return;
        }
    };

    if metadata.is_dir() {
        let entries = match scan::list_dir(&resolved, excludes) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %resolved.display(), error = %err, "listing failed");
                let _ = emit(server_error(&id)).await;
                let _ = emit(Frame::End { id }).await;
                return;
            }
        };
        let body = listing::render(session_id, &path, &entries);
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html; charset=utf-8".to_string());
        if emit(Frame::Response { id: id.clone(), status: 200, headers }).await.is_err() {
            return;
        }
        if method != Method::Head {
            let _ = emit(Frame::data(&id, body.as_bytes())).await;
        }
        let _ = emit(Frame::End { id }).await;
        return;
    }

    let content_type = mime::guess(&resolved);
    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), content_type);
    headers.insert("content-length".to_string(), metadata.len().to_string());
    if emit(Frame::Response { id: id.clone(), status: 200, headers }).await.is_err() {
        return;
    }

    if method == Method::Head {
        let _ = emit(Frame::End { id }).await;
        return;
    }

    let mut file = match tokio::fs::File::open(&resolved).await {
        Ok(file) => file,
        Err(err) => {
            warn!(path = %resolved.display(), error = %err, "open failed after successful stat");
            let _ = emit(Frame::End { id }).await;
            return;
        }
    };

    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match file.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if emit(Frame::data(&id, &buf[..n])).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(path = %resolved.display(), error = %err, "read error mid-transfer");
                break;
            }
        }
    }
    let _ = emit(Frame::End { id }).await;
}

async fn serve_zip<F, Fut>(base: &Path, id: String, subdir: &str, excludes: &[String], emit: &mut F)
where
    F: FnMut(Frame) -> Fut,
    Fut: std::future::Future<Output = Result<(), ()>>,
{
    let resolved = match resolve(base, subdir) {
        Some(resolved) => resolved,
        None => {
            let _ = emit(forbidden(&id)).await;
            let _ = emit(Frame::End { id }).await;
            return;
        }
    };

    let files = match scan::walk_files(&resolved, excludes) {
        Ok(files) => files,
        Err(err) => {
            warn!(path = %resolved.display(), error = %err, "zip enumeration failed");
            let _ = emit(server_error(&id)).await;
            let _ = emit(Frame::End { id }).await;
            return;
        }
    };

    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/zip".to_string());
    if emit(Frame::Response { id: id.clone(), status: 200, headers }).await.is_err() {
        return;
    }

    let mut reader = zip::stream_zip(files);
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if emit(Frame::data(&id, &buf[..n])).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "read error while streaming zip");
                break;
            }
        }
    }
    let _ = emit(Frame::End { id }).await;
}

fn not_found(id: &str) -> Frame {
    Frame::Response { id: id.to_string(), status: 404, headers: HashMap::new() }
}

fn forbidden(id: &str) -> Frame {
    Frame::Response { id: id.to_string(), status: 403, headers: HashMap::new() }
}

fn server_error(id: &str) -> Frame {
    Frame::Response { id: id.to_string(), status: 500, headers: HashMap::new() }
}

/// URI-decode and strip leading/trailing slashes, per step 1.
fn normalize(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    decoded.trim_matches('/').to_string()
}

/// Joins `path` against `base` and rejects anything that resolves outside
/// it — the sole defense against traversal attacks (step 4). Rejects `..`
/// components before ever touching the filesystem, then re-confirms via
/// `starts_with` against the lexically-joined path (not `canonicalize`,
/// since the share may legitimately contain symlinks a viewer should be
/// able to follow within the share).
fn resolve(base: &Path, path: &str) -> Option<PathBuf> {
    let mut joined = base.to_path_buf();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if joined.starts_with(base) {
        Some(joined)
    } else {
        None
    }
}
