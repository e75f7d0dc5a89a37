//! MIME type lookup for served files.
//!
//! Grounded on `mime_guess` being an optional dependency of
//! `rt-ui-http` (`crates/rt-ui-http/Cargo.toml`) for serving a static UI;
//! here it's a hard dependency since every file response needs a
//! `Content-Type`.

use std::path::Path;

pub fn guess(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
