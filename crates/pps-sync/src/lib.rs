//! Candidate workflows: reconciliation, pins, duplicate probing and contact
//! enrichment, plus the `Portal` facade that wires them together.

pub mod batch;
pub mod duplicates;
pub mod enrichment;
pub mod pins;
pub mod portal;
pub mod reconcile;

use std::path::PathBuf;

pub use batch::{
    write_contact, BatchEnricher, BatchEvent, BatchItemOutcome, BatchProgress, BatchReport,
    OutcomeLevel, WriteBack, WriteStatus,
};
pub use duplicates::DuplicateProbe;
pub use enrichment::{
    extract_contact_data, interpret_reply, EnrichmentError, EnrichmentOutcome, EnrichmentWorkflow,
    POLL_ATTEMPTS, POLL_INTERVAL,
};
pub use pins::{set_pin, toggle_pin, PinError};
pub use portal::{
    AtsSync, DeletionReport, EnrichedCandidate, Portal, PortalError, RegistrationOutcome,
};
pub use reconcile::{reconcile, transient_local_id};

pub const CRATE_NAME: &str = "pps-sync";

#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub database_url: Option<String>,
    pub ats_base_url: String,
    pub ats_api_token: Option<String>,
    pub enrichment_base_url: String,
    pub enrichment_api_key: Option<String>,
    pub preferences_path: PathBuf,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub batch_throttle_ms: u64,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: env_opt("DATABASE_URL"),
            ats_base_url: env_opt("ATS_BASE_URL")
                .unwrap_or_else(|| "https://api.manatal.com/open/v3".to_string()),
            ats_api_token: env_opt("ATS_API_TOKEN"),
            enrichment_base_url: env_opt("ENRICHMENT_BASE_URL")
                .unwrap_or_else(|| "https://api.rocketreach.co/api/v2".to_string()),
            enrichment_api_key: env_opt("ENRICHMENT_API_KEY"),
            preferences_path: env_opt("PPS_PREFERENCES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./preferences.json")),
            http_timeout_secs: env_opt("PPS_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            user_agent: env_opt("PPS_USER_AGENT").unwrap_or_else(|| "pps/0.1".to_string()),
            batch_throttle_ms: env_opt("PPS_BATCH_THROTTLE_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1500),
        }
    }
}
