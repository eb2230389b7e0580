use std::sync::Arc;
use std::time::Duration;

use pps_adapters::{AtsCandidateFields, AtsClient};
use pps_core::{non_empty, Candidate, CandidatePatch, ContactData};
use pps_storage::CandidateStore;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::enrichment::{EnrichmentOutcome, EnrichmentWorkflow};

pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLevel {
    Success,
    Warning,
    Error,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Failed(String),
}

impl WriteStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Where contact data landed: the record of truth first, then the mirror.
/// `secondary` is `None` when there was nothing to mirror to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBack {
    pub primary: WriteStatus,
    pub secondary: Option<WriteStatus>,
}

async fn mirror_to_ats(ats: &dyn AtsClient, ats_id: &str, fields: &AtsCandidateFields) -> WriteStatus {
    match ats.update_candidate(ats_id, fields).await {
        Ok(_) => WriteStatus::Written,
        Err(err) => {
            warn!(ats_id, error = %err, "ats contact sync failed");
            WriteStatus::Failed(err.to_string())
        }
    }
}

/// Persists enriched contact data.
///
/// Canonical rows are updated in the store, then mirrored to the ATS when
/// they carry an ATS id; a mirror failure is reported but never undoes the
/// local write. Transient rows only exist in the ATS, so the ATS write is
/// their primary one.
pub async fn write_contact(
    store: &dyn CandidateStore,
    ats: &dyn AtsClient,
    candidate: &Candidate,
    contact: &ContactData,
) -> WriteBack {
    let fields = AtsCandidateFields::from(contact);
    match (candidate.is_canonical(), candidate.local_id, candidate.external_id()) {
        (true, Some(local_id), external) => {
            let primary = match store
                .update_candidate(local_id, &CandidatePatch::contact(contact))
                .await
            {
                Ok(()) => WriteStatus::Written,
                Err(err) => WriteStatus::Failed(err.to_string()),
            };
            let secondary = match (primary.is_written(), external) {
                (true, Some(id)) => Some(mirror_to_ats(ats, id, &fields).await),
                _ => None,
            };
            WriteBack { primary, secondary }
        }
        (_, _, Some(id)) => WriteBack {
            primary: mirror_to_ats(ats, id, &fields).await,
            secondary: None,
        },
        _ => WriteBack {
            primary: WriteStatus::Failed("candidate has no stored record".to_string()),
            secondary: None,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemOutcome {
    pub index: usize,
    pub name: String,
    pub local_id: Option<Uuid>,
    pub level: OutcomeLevel,
    pub message: String,
    pub contact: Option<ContactData>,
    pub write_back: Option<WriteBack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub processed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEvent {
    pub progress: BatchProgress,
    pub outcome: BatchItemOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchItemOutcome>,
    pub progress: BatchProgress,
}

impl BatchReport {
    pub fn count(&self, level: OutcomeLevel) -> usize {
        self.outcomes.iter().filter(|o| o.level == level).count()
    }
}

/// Enriches a list of candidates one at a time, pausing before each lookup.
#[derive(Clone)]
pub struct BatchEnricher {
    workflow: EnrichmentWorkflow,
    store: Arc<dyn CandidateStore>,
    ats: Arc<dyn AtsClient>,
    throttle: Duration,
}

impl BatchEnricher {
    pub fn new(
        workflow: EnrichmentWorkflow,
        store: Arc<dyn CandidateStore>,
        ats: Arc<dyn AtsClient>,
        throttle: Duration,
    ) -> Self {
        Self {
            workflow,
            store,
            ats,
            throttle,
        }
    }

    async fn process(&self, index: usize, candidate: &Candidate) -> BatchItemOutcome {
        let mut outcome = BatchItemOutcome {
            index,
            name: candidate.name.clone(),
            local_id: candidate.local_id,
            level: OutcomeLevel::Skipped,
            message: String::new(),
            contact: None,
            write_back: None,
        };
        let Some(url) = non_empty(&candidate.linkedin_url) else {
            outcome.message = "no linkedin url".to_string();
            return outcome;
        };

        tokio::time::sleep(self.throttle).await;
        match self.workflow.enrich(url).await {
            Ok(EnrichmentOutcome::Found { contact }) => {
                let write_back =
                    write_contact(self.store.as_ref(), self.ats.as_ref(), candidate, &contact).await;
                (outcome.level, outcome.message) = match (&write_back.primary, &write_back.secondary) {
                    (WriteStatus::Failed(reason), _) => {
                        (OutcomeLevel::Error, format!("contact found but not saved: {reason}"))
                    }
                    (WriteStatus::Written, Some(WriteStatus::Failed(_))) => (
                        OutcomeLevel::Success,
                        "contact saved; ats sync failed".to_string(),
                    ),
                    _ => (OutcomeLevel::Success, "contact saved".to_string()),
                };
                outcome.contact = Some(contact);
                outcome.write_back = Some(write_back);
            }
            Ok(EnrichmentOutcome::NoContactInfo) => {
                outcome.level = OutcomeLevel::Warning;
                outcome.message = "no public contact info found".to_string();
            }
            Err(err) => {
                outcome.level = OutcomeLevel::Error;
                outcome.message = err.to_string();
            }
        }
        outcome
    }

    /// Processes `candidates` in order and never retries an item. When
    /// `events` is given, each outcome is sent as soon as it is known.
    pub async fn run(
        &self,
        candidates: &[Candidate],
        events: Option<&UnboundedSender<BatchEvent>>,
    ) -> BatchReport {
        let total = candidates.len();
        let span = info_span!("batch_enrichment", total);
        async {
            let mut outcomes = Vec::with_capacity(total);
            let mut progress = BatchProgress { processed: 0, total };
            for (index, candidate) in candidates.iter().enumerate() {
                let outcome = self.process(index, candidate).await;
                progress.processed = index + 1;
                info!(
                    processed = progress.processed,
                    level = ?outcome.level,
                    candidate = %outcome.name,
                    "batch item done"
                );
                if let Some(tx) = events {
                    // A dropped receiver only means nobody is watching.
                    let _ = tx.send(BatchEvent {
                        progress,
                        outcome: outcome.clone(),
                    });
                }
                outcomes.push(outcome);
            }
            BatchReport { outcomes, progress }
        }
        .instrument(span)
        .await
    }
}
