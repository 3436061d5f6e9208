use std::sync::Arc;

use tracing::error;

use chatline_db::Database;
use chatline_gateway::dispatcher::Dispatcher;

use crate::ai::CompletionClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::tokens::TokenIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub tokens: TokenIssuer,
    pub media: Arc<dyn MediaStore>,
    /// `None` when no completion API key is configured.
    pub assistant: Option<Arc<dyn CompletionClient>>,
    pub config: Config,
}

/// Run a blocking database closure off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
        .map_err(ApiError::from)
}
