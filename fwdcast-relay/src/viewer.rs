//! The viewer-facing HTTP bridge: `GET/HEAD /{sid}/{*rest}` and the
//! `/{sid}/__auth__` login subflow.
//!
//! The five-step algorithm below has no direct teacher analogue (the
//! teacher never bridges HTTP to a WebSocket-held peer); it is grounded on
//! the request/reply correlation shape of iwismer's
//! `ForwarderCommand`/`oneshot::Sender<ForwarderProxyReply<T>>` plumbing in
//! `services/server/src/state.rs`, adapted from a single oneshot reply to a
//! `mpsc` stream of `ViewerEvent`s terminated by a oneshot `done` signal.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use fwdcast_protocol::Frame;
use futures_util::StreamExt as _;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

use crate::errors::{AppError, AppResult};
use crate::pages;
use crate::session::{generate_request_id, PendingRequest, Session, SessionId, ViewerEvent};
use crate::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VIEWER_EVENT_BUFFER: usize = 16;
const COOKIE_MAX_AGE_SECS: i64 = 3600;

fn cookie_name(sid: &str) -> String {
    format!("fwdcast_auth_{sid}")
}

/// A `302 Found` redirect. `axum::response::Redirect::to` emits `303 See
/// Other` (axum has no public constructor for 302), but `spec.md` requires
/// 302 for both the auth-gate redirect and the post-login redirect.
fn found(location: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, location)
        .body(Body::empty())
        .expect("static status and a single header always build")
}

/// `GET|HEAD /{sid}/{*rest}` — steps 1-5 of the viewer bridge algorithm.
/// The `/{sid}/__auth__` route is registered ahead of this wildcard in
/// `main.rs`'s router, so axum's route specificity keeps the two apart.
pub async fn bridge(
    State(state): State<AppState>,
    Path((sid, rest)): Path<(String, String)>,
    method: Method,
    jar: CookieJar,
) -> Response {
    match bridge_inner(state, sid, rest, method, jar).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// `GET|HEAD /{sid}/` — the share's root resource, which the wildcard route
/// can't capture since there is no trailing segment for it to match.
pub async fn bridge_root(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    method: Method,
    jar: CookieJar,
) -> Response {
    match bridge_inner(state, sid, String::new(), method, jar).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn bridge_inner(
    state: AppState,
    sid: String,
    rest: String,
    method: Method,
    jar: CookieJar,
) -> AppResult<Response> {
    // 1. Lookup.
    let session_id =
        SessionId::parse(&sid).ok_or_else(|| AppError::not_found("no such share"))?;
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("this share no longer exists"))?;

    // 2. Auth gate.
    if session.requires_auth() {
        let cookie_ok = jar
            .get(&cookie_name(session.id.as_str()))
            .is_some_and(|c| session.check_cookie(c.value()));
        if !cookie_ok {
            let redirect = format!("/{}/{}", session.id, rest);
            return Ok(found(&format!(
                "/{}/__auth__?redirect={}",
                session.id,
                percent_encoding::utf8_percent_encode(
                    &redirect,
                    percent_encoding::NON_ALPHANUMERIC
                )
            )));
        }
    }

    // 3. Admission.
    match session.increment_viewers() {
        crate::session::ViewerAdmission::Admitted => {}
        crate::session::ViewerAdmission::MaxReached => {
            let mut response = (
                StatusCode::SERVICE_UNAVAILABLE,
                Html(pages::error_page(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "this share is at capacity, try again shortly",
                )),
            )
                .into_response();
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from_static("30"));
            return Ok(response);
        }
        crate::session::ViewerAdmission::NotFound => {
            return Err(AppError::not_found("this share no longer exists"));
        }
    }

    let result = serve_request(&session, &rest, &method).await;
    session.decrement_viewers();
    result
}

async fn serve_request(session: &Session, rest: &str, method: &Method) -> AppResult<Response> {
    // 4. Dispatch.
    let request_id = generate_request_id();
    let (writer_tx, writer_rx) = mpsc::channel::<ViewerEvent>(VIEWER_EVENT_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();
    session.add_pending(request_id.clone(), PendingRequest::new(writer_tx, done_tx));

    let frame_method = if method == Method::HEAD {
        fwdcast_protocol::Method::Head
    } else {
        fwdcast_protocol::Method::Get
    };
    let request = Frame::Request {
        id: request_id.clone(),
        method: frame_method,
        path: rest.to_string(),
    };
    if session.to_origin.send(request).await.is_err() {
        session.remove_pending(&request_id);
        return Err(AppError::gateway_timeout("origin is not connected"));
    }

    // 5. Wait for headers, then stream the body.
    let mut writer_rx = writer_rx;
    let headers_event = tokio::select! {
        event = writer_rx.recv() => event,
        _ = tokio::time::sleep(REQUEST_TIMEOUT) => {
            session.remove_pending(&request_id);
            return Err(AppError::gateway_timeout("origin did not respond in time"));
        }
    };

    let Some(ViewerEvent::Headers { status, headers }) = headers_event else {
        session.remove_pending(&request_id);
        return Err(AppError::gateway_timeout("origin closed without responding"));
    };

    let status =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response_headers = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response_headers.insert(name, value);
        }
    }

    // `done` fires when the duplex loop removes this pending request (on
    // `end`, or when the session itself is torn down); either way the
    // writer side of `writer_rx` is dropped with it, which is what
    // actually terminates the body stream below. There is nothing left to
    // wait for here once headers have arrived.
    drop(done_rx);

    let body_stream = ReceiverStream::new(writer_rx).filter_map(|event| {
        futures_util::future::ready(match event {
            ViewerEvent::Data(bytes) => Some(Ok::<_, std::io::Error>(bytes)),
            ViewerEvent::Headers { .. } => None,
        })
    });

    let mut response = Response::builder().status(status);
    *response.headers_mut().unwrap() = response_headers;
    Ok(response
        .body(Body::from_stream(body_stream))
        .expect("status and headers were validated above"))
}

/// `GET /{sid}/__auth__[?redirect=...]` — render the login page.
pub async fn auth_get(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    axum::extract::Query(query): axum::extract::Query<AuthQuery>,
) -> AppResult<Html<String>> {
    let session_id = SessionId::parse(&sid).ok_or_else(|| AppError::not_found("no such share"))?;
    let _ = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("this share no longer exists"))?;
    let redirect = if query.redirect.is_empty() {
        "/"
    } else {
        &query.redirect
    };
    Ok(Html(pages::login_page(&sid, redirect, None)))
}

#[derive(serde::Deserialize)]
pub struct AuthQuery {
    #[serde(default)]
    pub redirect: String,
}

#[derive(serde::Deserialize)]
pub struct AuthForm {
    pub password: String,
}

/// `POST /{sid}/__auth__?redirect=...` — verify the submitted password.
pub async fn auth_post(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    jar: CookieJar,
    axum::extract::Query(query): axum::extract::Query<AuthQuery>,
    axum::extract::Form(form): axum::extract::Form<AuthForm>,
) -> AppResult<Response> {
    let session_id = SessionId::parse(&sid).ok_or_else(|| AppError::not_found("no such share"))?;
    let session = state
        .sessions
        .get(&session_id)
        .ok_or_else(|| AppError::not_found("this share no longer exists"))?;

    if session.is_rate_limited() {
        return Ok((
            StatusCode::TOO_MANY_REQUESTS,
            Html(pages::rate_limited_page(30)),
        )
            .into_response());
    }

    if !session.verify_password(&form.password) {
        let tripped = session.record_failed_auth();
        let message = if tripped {
            return Ok((
                StatusCode::TOO_MANY_REQUESTS,
                Html(pages::rate_limited_page(30)),
            )
                .into_response());
        } else {
            "incorrect password"
        };
        return Ok((
            StatusCode::UNAUTHORIZED,
            Html(pages::login_page(&sid, &query.redirect, Some(message))),
        )
            .into_response());
    }

    let cookie = Cookie::build((cookie_name(session.id.as_str()), session.auth_token()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(COOKIE_MAX_AGE_SECS))
        .path(format!("/{}", session.id))
        .build();

    let redirect = if query.redirect.is_empty() {
        format!("/{}/", session.id)
    } else {
        query.redirect.clone()
    };
    let jar = jar.add(cookie);
    Ok((jar, found(&redirect)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_name_is_scoped_to_the_session() {
        assert_eq!(cookie_name("abc123def456"), "fwdcast_auth_abc123def456");
    }
}
