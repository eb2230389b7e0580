use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    AdapterError, AtsCandidate, AtsCandidateFields, AtsClient, AtsMatch, AtsQuery, AtsSearchField,
    AtsSearchPage,
};

/// In-process ATS used when no ATS credentials are configured, and in tests.
/// Keeps a log of every search it served.
#[derive(Debug, Default)]
pub struct MemoryAts {
    state: Mutex<MemoryAtsState>,
}

#[derive(Debug, Default)]
struct MemoryAtsState {
    records: Vec<AtsCandidate>,
    next_id: u64,
    queries: Vec<AtsQuery>,
}

impl MemoryAts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AtsCandidate>) -> Self {
        Self {
            state: Mutex::new(MemoryAtsState {
                next_id: records.len() as u64 + 1,
                records,
                queries: Vec::new(),
            }),
        }
    }

    pub async fn records(&self) -> Vec<AtsCandidate> {
        self.state.lock().await.records.clone()
    }

    pub async fn queries(&self) -> Vec<AtsQuery> {
        self.state.lock().await.queries.clone()
    }

    fn field_value(record: &AtsCandidate, field: AtsSearchField) -> Option<&str> {
        match field {
            AtsSearchField::Email => record.email.as_deref(),
            AtsSearchField::Phone => record.phone_number.as_deref(),
            AtsSearchField::Linkedin => record.linkedin_url.as_deref(),
            AtsSearchField::Name => Some(record.full_name.as_str()),
        }
    }

    fn matches(record: &AtsCandidate, query: &AtsQuery) -> bool {
        let Some(value) = Self::field_value(record, query.field) else {
            return false;
        };
        let value = value.trim().to_lowercase();
        let needle = query.value.trim().to_lowercase();
        match query.mode {
            AtsMatch::Exact => value == needle,
            AtsMatch::Contains => !needle.is_empty() && value.contains(&needle),
        }
    }
}

#[async_trait]
impl AtsClient for MemoryAts {
    async fn search_candidates(&self, query: &AtsQuery) -> Result<AtsSearchPage, AdapterError> {
        let mut state = self.state.lock().await;
        state.queries.push(query.clone());
        let results: Vec<_> = state
            .records
            .iter()
            .filter(|r| Self::matches(r, query))
            .cloned()
            .collect();
        Ok(AtsSearchPage {
            count: results.len(),
            results,
        })
    }

    async fn get_candidate(&self, id: &str) -> Result<AtsCandidate, AdapterError> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| AdapterError::Message(format!("ats candidate {id} not found")))
    }

    async fn create_candidate(&self, fields: &AtsCandidateFields) -> Result<AtsCandidate, AdapterError> {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(1);
        let mut record = AtsCandidate {
            id: state.next_id.to_string(),
            ..AtsCandidate::default()
        };
        state.next_id += 1;
        fields.apply_to(&mut record);
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update_candidate(
        &self,
        id: &str,
        fields: &AtsCandidateFields,
    ) -> Result<AtsCandidate, AdapterError> {
        let mut state = self.state.lock().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AdapterError::Message(format!("ats candidate {id} not found")))?;
        fields.apply_to(record);
        Ok(record.clone())
    }

    async fn delete_candidate(&self, id: &str) -> Result<(), AdapterError> {
        self.state.lock().await.records.retain(|r| r.id != id);
        Ok(())
    }
}
