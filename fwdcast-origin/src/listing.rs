//! Directory listing HTML, the Origin-side counterpart to
//! `fwdcast-relay::pages`: small, dependency-free, format!-based. Takes the
//! session ID so every generated link is absolute under `/{sid}/...`,
//! since the Origin has no notion of its own public URL.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::scan::DirEntryInfo;

pub fn render(session_id: &str, resource_path: &str, entries: &[DirEntryInfo]) -> String {
    let mut rows = String::new();

    if !resource_path.is_empty() {
        let parent = parent_of(resource_path);
        rows.push_str(&format!(
            "<tr><td><a href=\"/{sid}/{parent}\">..</a></td><td></td></tr>",
            sid = session_id,
            parent = encode_path(&parent),
        ));
    }

    for entry in entries {
        let href = if resource_path.is_empty() {
            entry.name.clone()
        } else {
            format!("{resource_path}/{}", entry.name)
        };
        let label = if entry.is_dir {
            format!("{}/", entry.name)
        } else {
            entry.name.clone()
        };
        let size = if entry.is_dir {
            String::new()
        } else {
            human_size(entry.size)
        };
        rows.push_str(&format!(
            "<tr><td><a href=\"/{sid}/{href}\">{label}</a></td><td>{size}</td></tr>",
            sid = session_id,
            href = encode_path(&href),
            label = html_escape(&label),
        ));
    }

    let download_href = if resource_path.is_empty() {
        "__download__.zip".to_string()
    } else {
        format!("{resource_path}/__download__.zip")
    };

    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <title>Index of /{escaped_path}</title></head>\
         <body style=\"font-family: monospace; max-width: 48rem; margin: 2rem auto;\">\
         <h1>Index of /{escaped_path}</h1>\
         <p><a href=\"/{sid}/{download_href}\">download as .zip</a></p>\
         <table>{rows}</table></body></html>",
        escaped_path = html_escape(resource_path),
        sid = session_id,
        download_href = encode_path(&download_href),
    )
}

fn parent_of(resource_path: &str) -> String {
    match resource_path.rfind('/') {
        Some(idx) => resource_path[..idx].to_string(),
        None => String::new(),
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_parent_link_except_at_root() {
        let root = render("abc123def456", "", &[]);
        assert!(!root.contains(">..<"));

        let nested = render("abc123def456", "sub", &[]);
        assert!(nested.contains(">..<"));
    }

    #[test]
    fn human_size_scales_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KiB");
    }
}
