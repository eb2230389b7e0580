use std::sync::Arc;

use pps_adapters::{AtsClient, AtsQuery, AtsSearchField};
use pps_core::{non_empty, DuplicateCheckResult, DuplicateField, DuplicateProbeFields};
use tracing::{debug, info_span, warn, Instrument};

/// Values shorter than this (after trimming) are too weak to match on.
pub const MIN_PROBE_LEN: usize = 3;

/// Looks for an existing ATS record before a new person is registered.
#[derive(Clone)]
pub struct DuplicateProbe {
    ats: Arc<dyn AtsClient>,
}

impl DuplicateProbe {
    pub fn new(ats: Arc<dyn AtsClient>) -> Self {
        Self { ats }
    }

    fn strategies(fields: &DuplicateProbeFields) -> Vec<(DuplicateField, AtsQuery)> {
        let usable = |v: &Option<String>| {
            non_empty(v)
                .filter(|v| v.chars().count() >= MIN_PROBE_LEN)
                .map(ToString::to_string)
        };
        let mut out = Vec::with_capacity(4);
        if let Some(email) = usable(&fields.email) {
            out.push((DuplicateField::Email, AtsQuery::exact(AtsSearchField::Email, email)));
        }
        if let Some(phone) = usable(&fields.phone) {
            out.push((DuplicateField::Phone, AtsQuery::exact(AtsSearchField::Phone, phone)));
        }
        if let Some(url) = usable(&fields.linkedin_url) {
            out.push((DuplicateField::Linkedin, AtsQuery::contains(AtsSearchField::Linkedin, url)));
        }
        if let Some(name) = usable(&fields.full_name) {
            out.push((DuplicateField::Name, AtsQuery::exact(AtsSearchField::Name, name)));
        }
        out
    }

    /// Tries email, phone, LinkedIn (substring) and full name in that order
    /// and reports the first hit. A failing search is logged and skipped; if
    /// every search fails the answer is "not a duplicate".
    pub async fn check(&self, fields: &DuplicateProbeFields) -> DuplicateCheckResult {
        let span = info_span!("duplicate_probe");
        async {
            for (field, query) in Self::strategies(fields) {
                match self.ats.search_candidates(&query).await {
                    Ok(page) => {
                        if let Some(first) = page.results.first() {
                            debug!(?field, ats_id = %first.id, "duplicate found");
                            return DuplicateCheckResult::matched(field, first.to_candidate());
                        }
                    }
                    Err(err) => warn!(?field, error = %err, "duplicate search failed; trying next field"),
                }
            }
            DuplicateCheckResult::clear()
        }
        .instrument(span)
        .await
    }
}
