//! The fwdcast relay: the public-facing half of the tunnel, holding every
//! active share's session state, multiplexing Origin WebSocket traffic, and
//! answering viewer HTTP requests.

pub mod auth;
pub mod config;
pub mod duplex;
pub mod errors;
pub mod pages;
pub mod session;
pub mod state;
pub mod viewer;
pub mod ws_origin;

use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::{Args, Config};
pub use state::AppState;

/// Assembles the full router: Origin registration, the auth subflow, and
/// the viewer bridge, in most-specific-first order so axum's routing picks
/// `/{sid}/__auth__` and `/{sid}/` over the `/{sid}/{*rest}` wildcard.
/// `GET /` and any path that matches no route at all fall through to
/// `not_found`, per `spec.md` §6.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_origin::handler))
        .route(
            "/{sid}/__auth__",
            get(viewer::auth_get).post(viewer::auth_post),
        )
        .route("/{sid}/{*rest}", get(viewer::bridge).head(viewer::bridge))
        .route("/{sid}/", get(viewer::bridge_root).head(viewer::bridge_root))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> (StatusCode, Html<String>) {
    (
        StatusCode::NOT_FOUND,
        Html(pages::error_page(StatusCode::NOT_FOUND, "no such share")),
    )
}
