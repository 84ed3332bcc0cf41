pub mod admin;
pub mod auth;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod rooms;
pub mod routes;

use raaya_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Run blocking database work off the async runtime.
pub(crate) async fn db_call<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
        .map_err(ApiError::Internal)
}
