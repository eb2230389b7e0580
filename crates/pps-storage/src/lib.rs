//! Persistence backends and JSON HTTP plumbing for the partner portal.

mod candidates;
mod http;
mod preferences;

pub use candidates::{CandidateStore, MemoryCandidateStore, PgCandidateStore};
pub use http::{
    is_replayable, is_transient_error, is_transient_status, HttpClientConfig, HttpError,
    JsonHttpClient, JsonResponse, RetryPolicy,
};
pub use preferences::{
    FilePreferenceStore, MemoryPreferenceStore, PinOverlay, PinRepository, PreferenceMap,
    PreferenceStore,
};

use thiserror::Error;
use uuid::Uuid;

pub const CRATE_NAME: &str = "pps-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("preference file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed stored value: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("candidate {0} not found")]
    NotFound(Uuid),
    #[error("ats id {0} is already linked to a stored candidate")]
    ExternalIdTaken(String),
    #[error("store lock poisoned")]
    Poisoned,
}
