//! Core domain model and identity rules for the partner portal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "pps-core";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    Available,
    Interviewing,
    Offer,
    Hired,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Interviewing => "interviewing",
            Self::Offer => "offer",
            Self::Hired => "hired",
        }
    }
}

impl fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError(pub String);

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized value `{}`", self.0)
    }
}

impl std::error::Error for ParseEnumError {}

impl FromStr for CandidateStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Self::Available),
            "interviewing" => Ok(Self::Interviewing),
            "offer" => Ok(Self::Offer),
            "hired" => Ok(Self::Hired),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// A person as shown in the portal, either stored canonically or synthesized
/// from an external search hit.
///
/// `is_pinned` and `is_interested` are per-viewer overlay values joined at read
/// time; they are never written back with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub local_id: Option<Uuid>,
    pub external_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub role: Option<String>,
    pub current_company: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: CandidateStatus,
    pub created_by: Option<String>,
    pub source: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub is_interested: bool,
    /// Set on records synthesized from external search results; their
    /// `local_id` exists only for display and is not a canonical row.
    #[serde(default)]
    pub transient: bool,
}

fn default_visibility() -> bool {
    true
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            local_id: None,
            external_id: None,
            name: String::new(),
            email: None,
            phone: None,
            linkedin_url: None,
            role: None,
            current_company: None,
            location: None,
            status: CandidateStatus::Available,
            created_by: None,
            source: None,
            visibility: true,
            created_at: None,
            is_pinned: false,
            is_interested: false,
            transient: false,
        }
    }
}

/// Trimmed, non-empty view of an optional text field.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Case-insensitive comparison form of a person's name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Merge identity: the ATS id when known, otherwise the normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CandidateKey {
    External(String),
    Name(String),
}

impl Candidate {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn external_id(&self) -> Option<&str> {
        non_empty(&self.external_id)
    }

    pub fn merge_key(&self) -> CandidateKey {
        match self.external_id() {
            Some(id) => CandidateKey::External(id.to_string()),
            None => CandidateKey::Name(normalize_name(&self.name)),
        }
    }

    /// Overlay key: `external_id`, falling back to `local_id`.
    pub fn pin_key(&self) -> Option<String> {
        self.external_id()
            .map(ToString::to_string)
            .or_else(|| self.local_id.map(|id| id.to_string()))
    }

    /// Every key an overlay entry for this record may have been written under.
    pub fn overlay_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(key) = self.pin_key() {
            keys.push(key);
        }
        if let Some(local) = self.local_id.map(|id| id.to_string()) {
            if !keys.contains(&local) {
                keys.push(local);
            }
        }
        keys
    }

    /// Two records describe the same person when their ATS ids agree, or, when
    /// at least one side has no ATS id, when their normalized names agree.
    pub fn same_person(&self, other: &Candidate) -> bool {
        match (self.external_id(), other.external_id()) {
            (Some(a), Some(b)) => a == b,
            _ => {
                let name = normalize_name(&self.name);
                !name.is_empty() && name == normalize_name(&other.name)
            }
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.local_id.is_some() && !self.transient
    }

    pub fn can_persist(&self) -> bool {
        self.local_id.is_some() || self.external_id().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateFilter {
    Pinned,
    #[default]
    #[serde(alias = "all_candidates")]
    All,
    Hired,
    #[serde(alias = "my_candidates")]
    Mine,
}

impl FromStr for CandidateFilter {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match key.as_str() {
            "pinned" => Ok(Self::Pinned),
            "all" | "all candidates" => Ok(Self::All),
            "hired" => Ok(Self::Hired),
            "mine" | "my candidates" => Ok(Self::Mine),
            _ => Err(ParseEnumError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    User,
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "user" => Ok(Self::User),
            other => Err(ParseEnumError(other.to_string())),
        }
    }
}

/// Who is looking at a candidate list. Anonymous viewers get no overlay.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Viewer {
    pub user_id: Option<String>,
    pub is_admin: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: true,
        }
    }

    pub fn from_session(session: Option<&Session>, role: UserRole) -> Self {
        match session {
            Some(session) => Self {
                user_id: Some(session.user_id.clone()),
                is_admin: role == UserRole::Admin,
            },
            None => Self::anonymous(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    pub fn owns(&self, candidate: &Candidate) -> bool {
        match (self.user_id(), candidate.created_by.as_deref()) {
            (Some(viewer), Some(owner)) => viewer == owner,
            _ => false,
        }
    }
}

/// Denormalized copy of a candidate taken when it was pinned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedSnapshot {
    pub key: String,
    pub local_id: Option<Uuid>,
    pub pinned_at: DateTime<Utc>,
    pub candidate: Candidate,
}

impl PinnedSnapshot {
    pub fn capture(candidate: &Candidate, pinned_at: DateTime<Utc>) -> Option<Self> {
        let key = candidate.pin_key()?;
        let mut candidate = candidate.clone();
        candidate.is_pinned = true;
        Some(Self {
            key,
            local_id: candidate.local_id,
            pinned_at,
            candidate,
        })
    }

    pub fn matches_any(&self, keys: &[String]) -> bool {
        keys.iter().any(|k| {
            *k == self.key || self.local_id.map(|id| id.to_string()).as_deref() == Some(k.as_str())
        })
    }
}

/// Fields accepted when registering a new person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin_url: Option<String>,
    pub role: Option<String>,
    pub current_company: Option<String>,
    pub location: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub status: CandidateStatus,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
}

impl Default for NewCandidate {
    fn default() -> Self {
        Self {
            name: String::new(),
            external_id: None,
            email: None,
            phone: None,
            linkedin_url: None,
            role: None,
            current_company: None,
            location: None,
            source: None,
            status: CandidateStatus::Available,
            visibility: true,
        }
    }
}

/// Partial update: only `Some` fields change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CandidatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CandidateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<bool>,
}

impl CandidatePatch {
    pub fn contact(contact: &ContactData) -> Self {
        Self {
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply_to(&self, candidate: &mut Candidate) {
        if let Some(v) = &self.external_id {
            candidate.external_id = Some(v.clone());
        }
        if let Some(v) = &self.email {
            candidate.email = Some(v.clone());
        }
        if let Some(v) = &self.phone {
            candidate.phone = Some(v.clone());
        }
        if let Some(v) = &self.linkedin_url {
            candidate.linkedin_url = Some(v.clone());
        }
        if let Some(v) = self.status {
            candidate.status = v;
        }
        if let Some(v) = self.visibility {
            candidate.visibility = v;
        }
    }
}

/// Contact fields used to look for an existing person before registration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DuplicateProbeFields {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub linkedin_url: Option<String>,
    pub phone: Option<String>,
}

impl From<&NewCandidate> for DuplicateProbeFields {
    fn from(value: &NewCandidate) -> Self {
        Self {
            email: value.email.clone(),
            full_name: Some(value.name.clone()),
            linkedin_url: value.linkedin_url.clone(),
            phone: value.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateField {
    Email,
    Phone,
    Linkedin,
    Name,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
    pub matched_by: DuplicateField,
    pub matched_candidate: Option<Candidate>,
}

impl DuplicateCheckResult {
    pub fn clear() -> Self {
        Self {
            is_duplicate: false,
            matched_by: DuplicateField::None,
            matched_candidate: None,
        }
    }

    pub fn matched(field: DuplicateField, candidate: Candidate) -> Self {
        Self {
            is_duplicate: true,
            matched_by: field,
            matched_candidate: Some(candidate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Submitted,
    Searching,
    Progress,
    Waiting,
    Complete,
    Failed,
    #[serde(alias = "not queued")]
    NotQueued,
    #[serde(other)]
    Unknown,
}

impl EnrichmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::NotQueued)
    }

    /// Statuses that keep the job in the polling loop.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Searching | Self::Progress | Self::Waiting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailCategory {
    Personal,
    Professional,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedEmail {
    #[serde(alias = "email")]
    pub address: String,
    #[serde(alias = "type", default)]
    pub category: Option<EmailCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedPhone {
    pub number: String,
}

/// One provider lookup, as last reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentJob {
    #[serde(default)]
    pub id: Option<u64>,
    pub status: EnrichmentStatus,
    #[serde(default, deserialize_with = "nullable_list")]
    pub emails: Vec<EnrichedEmail>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub phones: Vec<EnrichedPhone>,
}

impl EnrichmentJob {
    pub fn has_contact_lists(&self) -> bool {
        !self.emails.is_empty() || !self.phones.is_empty()
    }
}

fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactData {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactData {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}
