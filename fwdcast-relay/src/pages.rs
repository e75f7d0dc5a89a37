//! Minimal, dependency-free HTML pages for the surfaces `spec.md` leaves to
//! an external renderer (directory listings are the Origin's problem; this
//! module only covers the handful of pages the Relay itself must answer
//! with real bytes: error pages, the login form, and the rate-limit
//! countdown page).

use axum::http::StatusCode;

fn shell(title: &str, body: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family: sans-serif; max-width: 32rem; margin: 4rem auto;\">{body}</body></html>"
    )
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    shell(
        &format!("{} {}", status.as_u16(), status.canonical_reason().unwrap_or("")),
        &format!(
            "<h1>{}</h1><p>{}</p>",
            status.canonical_reason().unwrap_or("Error"),
            html_escape(message)
        ),
    )
}

pub fn login_page(session_id: &str, redirect: &str, error: Option<&str>) -> String {
    let error_html = error
        .map(|e| format!("<p style=\"color:#b00\">{}</p>", html_escape(e)))
        .unwrap_or_default();
    shell(
        "Password required",
        &format!(
            "<h1>Password required</h1>{error_html}\
             <form method=\"post\" action=\"/{sid}/__auth__?redirect={redirect}\">\
             <input type=\"password\" name=\"password\" autofocus>\
             <button type=\"submit\">Unlock</button></form>",
            sid = html_escape(session_id),
            redirect = html_escape(redirect),
        ),
    )
}

pub fn rate_limited_page(retry_after_secs: u64) -> String {
    shell(
        "Too many attempts",
        &format!(
            "<h1>Too many attempts</h1><p>Try again in {retry_after_secs} seconds.</p>"
        ),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
