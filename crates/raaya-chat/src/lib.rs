//! Chat core: room topology resolution, authorization and the message store.
//!
//! Every operation runs its SQLite work on the blocking pool; the async
//! callers (REST handlers and the WebSocket gateway) never hold a database
//! lock across an `.await`.

pub mod error;
pub mod resolver;
pub mod store;

use std::sync::Arc;

use raaya_db::Database;
use raaya_types::api::Claims;
use raaya_types::models::Role;
use uuid::Uuid;

pub use error::ChatError;
pub use resolver::{ChatTarget, authorize};

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl From<&Claims> for Caller {
    fn from(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            role: claims.role,
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
}

impl ChatService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run blocking database work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, ChatError>
    where
        F: FnOnce(&Database) -> Result<T, ChatError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| ChatError::Storage(anyhow::anyhow!("spawn_blocking join error: {}", e)))?
    }
}
