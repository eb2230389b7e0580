//! External collaborator contracts (ATS, enrichment provider, session) and
//! their HTTP and in-memory implementations.

mod manatal;
mod memory;
mod rocketreach;
mod session;

pub use manatal::ManatalClient;
pub use memory::MemoryAts;
pub use rocketreach::RocketReachClient;
pub use session::StaticSessionProvider;

use async_trait::async_trait;
use pps_core::{non_empty, Candidate, ContactData, NewCandidate, Session, UserRole};
use pps_storage::HttpError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub const CRATE_NAME: &str = "pps-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("unexpected payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http(HttpError::Status { status: 404, .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsSearchField {
    Email,
    Phone,
    Linkedin,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtsMatch {
    Exact,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtsQuery {
    pub field: AtsSearchField,
    pub value: String,
    pub mode: AtsMatch,
}

impl AtsQuery {
    pub fn exact(field: AtsSearchField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            mode: AtsMatch::Exact,
        }
    }

    pub fn contains(field: AtsSearchField, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            mode: AtsMatch::Contains,
        }
    }
}

/// Candidate record as the ATS returns it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtsCandidate {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub current_company: Option<String>,
    #[serde(default)]
    pub current_position: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) => Ok(s),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unsupported id {other}"))),
    }
}

impl AtsCandidate {
    /// Partial candidate shape used for display and duplicate reports.
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            external_id: Some(self.id.clone()),
            name: self.full_name.trim().to_string(),
            email: self.email.clone(),
            phone: self.phone_number.clone(),
            linkedin_url: self.linkedin_url.clone(),
            role: self.current_position.clone(),
            current_company: self.current_company.clone(),
            location: self.address.clone(),
            source: Some("ats".to_string()),
            ..Candidate::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtsSearchPage {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub results: Vec<AtsCandidate>,
}

/// Writable ATS fields; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtsCandidateFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl From<&NewCandidate> for AtsCandidateFields {
    fn from(value: &NewCandidate) -> Self {
        let keep = |v: &Option<String>| non_empty(v).map(ToString::to_string);
        Self {
            full_name: Some(value.name.trim().to_string()),
            email: keep(&value.email),
            phone_number: keep(&value.phone),
            linkedin_url: keep(&value.linkedin_url),
            current_company: keep(&value.current_company),
            current_position: keep(&value.role),
            address: keep(&value.location),
        }
    }
}

impl From<&ContactData> for AtsCandidateFields {
    fn from(value: &ContactData) -> Self {
        Self {
            email: value.email.clone(),
            phone_number: value.phone.clone(),
            ..Self::default()
        }
    }
}

impl AtsCandidateFields {
    pub fn apply_to(&self, record: &mut AtsCandidate) {
        if let Some(v) = &self.full_name {
            record.full_name = v.clone();
        }
        if let Some(v) = &self.email {
            record.email = Some(v.clone());
        }
        if let Some(v) = &self.phone_number {
            record.phone_number = Some(v.clone());
        }
        if let Some(v) = &self.linkedin_url {
            record.linkedin_url = Some(v.clone());
        }
        if let Some(v) = &self.current_company {
            record.current_company = Some(v.clone());
        }
        if let Some(v) = &self.current_position {
            record.current_position = Some(v.clone());
        }
        if let Some(v) = &self.address {
            record.address = Some(v.clone());
        }
    }
}

/// Applicant-tracking system. Job, pipeline and match endpoints live outside
/// this crate.
#[async_trait]
pub trait AtsClient: Send + Sync {
    async fn search_candidates(&self, query: &AtsQuery) -> Result<AtsSearchPage, AdapterError>;

    async fn get_candidate(&self, id: &str) -> Result<AtsCandidate, AdapterError>;

    async fn create_candidate(&self, fields: &AtsCandidateFields) -> Result<AtsCandidate, AdapterError>;

    async fn update_candidate(
        &self,
        id: &str,
        fields: &AtsCandidateFields,
    ) -> Result<AtsCandidate, AdapterError>;

    /// Idempotent: an already-missing record counts as deleted.
    async fn delete_candidate(&self, id: &str) -> Result<(), AdapterError>;
}

/// Raw provider reply. Interpretation (error payloads, status codes, job
/// shape) belongs to the enrichment workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub http_status: u16,
    pub body: JsonValue,
}

impl ProviderReply {
    pub fn ok(body: JsonValue) -> Self {
        Self {
            http_status: 200,
            body,
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn submit_lookup(&self, linkedin_url: &str) -> Result<ProviderReply, AdapterError>;

    async fn check_status(&self, job_id: u64) -> Result<ProviderReply, AdapterError>;
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, AdapterError>;

    async fn user_role(&self, user_id: &str) -> Result<UserRole, AdapterError>;
}
