use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionStore;

/// Shared application state, modeled on the teacher's `infra/app_state.rs::AppState`:
/// a small `Clone`-able bundle of `Arc`s handed to every axum handler via
/// `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub config: Arc<Config>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
