//! Facade wiring the workflows to their collaborators. This is what the web
//! and CLI layers talk to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pps_adapters::{
    AtsCandidateFields, AtsClient, AtsQuery, AtsSearchField, EnrichmentProvider, ManatalClient,
    MemoryAts, RocketReachClient, SessionProvider,
};
use pps_core::{
    Candidate, CandidateFilter, CandidatePatch, CandidateStatus, DuplicateCheckResult,
    DuplicateProbeFields, NewCandidate, UserRole, Viewer,
};
use pps_storage::{
    CandidateStore, FilePreferenceStore, HttpClientConfig, JsonHttpClient, MemoryCandidateStore,
    PgCandidateStore, PinOverlay, PinRepository, PreferenceStore, StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::batch::{write_contact, BatchEnricher, BatchEvent, BatchReport, WriteBack};
use crate::duplicates::DuplicateProbe;
use crate::enrichment::{EnrichmentError, EnrichmentOutcome, EnrichmentWorkflow};
use crate::pins::{self, PinError};
use crate::reconcile::reconcile;
use crate::PortalConfig;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("sign in required")]
    Unauthenticated,
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("candidate is not stored locally")]
    NotCanonical,
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pin(#[from] PinError),
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),
}

/// What happened on the ATS side of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ats", content = "detail", rename_all = "snake_case")]
pub enum AtsSync {
    Created(String),
    Linked(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Nothing was written; the caller must show the match and ask again
    /// with confirmation.
    Duplicate(DuplicateCheckResult),
    /// The confirmed match is already stored; that row is returned as is.
    Existing { candidate: Candidate },
    Created { candidate: Candidate, ats_sync: AtsSync },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    pub deleted_local: usize,
    pub deleted_ats: Vec<String>,
    pub ats_failures: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedCandidate {
    pub outcome: EnrichmentOutcome,
    pub write_back: Option<WriteBack>,
}

#[derive(Clone)]
pub struct Portal {
    store: Arc<dyn CandidateStore>,
    ats: Arc<dyn AtsClient>,
    pins: PinRepository,
    probe: DuplicateProbe,
    enrichment: EnrichmentWorkflow,
    batch: BatchEnricher,
}

impl Portal {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        ats: Arc<dyn AtsClient>,
        provider: Arc<dyn EnrichmentProvider>,
        preferences: Arc<dyn PreferenceStore>,
        throttle: Duration,
    ) -> Self {
        let enrichment = EnrichmentWorkflow::new(provider);
        Self {
            pins: PinRepository::new(preferences),
            probe: DuplicateProbe::new(ats.clone()),
            batch: BatchEnricher::new(enrichment.clone(), store.clone(), ats.clone(), throttle),
            enrichment,
            store,
            ats,
        }
    }

    /// Builds real collaborators from configuration. Without a database URL
    /// or ATS token the in-memory stand-ins are used.
    pub async fn from_config(config: &PortalConfig) -> Result<Self> {
        let http = Arc::new(JsonHttpClient::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..HttpClientConfig::default()
        })?);

        let store: Arc<dyn CandidateStore> = match &config.database_url {
            Some(url) => Arc::new(
                PgCandidateStore::connect(url)
                    .await
                    .context("connecting to candidate database")?,
            ),
            None => {
                warn!("DATABASE_URL not set; candidates live in memory only");
                Arc::new(MemoryCandidateStore::new())
            }
        };
        let ats: Arc<dyn AtsClient> = match &config.ats_api_token {
            Some(token) => Arc::new(ManatalClient::new(http.clone(), &config.ats_base_url, token)),
            None => {
                warn!("ATS_API_TOKEN not set; using in-memory ATS");
                Arc::new(MemoryAts::new())
            }
        };
        let provider = Arc::new(RocketReachClient::new(
            http,
            &config.enrichment_base_url,
            config.enrichment_api_key.clone().unwrap_or_default(),
        ));
        let preferences = Arc::new(
            FilePreferenceStore::open(&config.preferences_path).with_context(|| {
                format!("opening preferences at {}", config.preferences_path.display())
            })?,
        );

        Ok(Self::new(
            store,
            ats,
            provider,
            preferences,
            Duration::from_millis(config.batch_throttle_ms),
        ))
    }

    pub fn pins(&self) -> &PinRepository {
        &self.pins
    }

    /// Session and role lookups that fail degrade to an anonymous or
    /// non-admin viewer.
    pub async fn resolve_viewer(sessions: &dyn SessionProvider) -> Viewer {
        let session = match sessions.current_session().await {
            Ok(session) => session,
            Err(err) => {
                warn!(error = %err, "session lookup failed; continuing anonymously");
                None
            }
        };
        let role = match &session {
            Some(s) => sessions.user_role(&s.user_id).await.unwrap_or_else(|err| {
                warn!(error = %err, "role lookup failed; assuming user");
                UserRole::User
            }),
            None => UserRole::User,
        };
        Viewer::from_session(session.as_ref(), role)
    }

    fn overlay_for(&self, viewer: &Viewer) -> PinOverlay {
        let Some(user_id) = viewer.user_id() else {
            return PinOverlay::default();
        };
        self.pins.overlay(user_id).unwrap_or_else(|err| {
            warn!(error = %err, "pin overlay unreadable; showing no pins");
            PinOverlay::default()
        })
    }

    async fn search_external(&self, query: &str) -> Option<Vec<Candidate>> {
        match self
            .ats
            .search_candidates(&AtsQuery::contains(AtsSearchField::Name, query))
            .await
        {
            Ok(page) => Some(page.results.iter().map(|r| r.to_candidate()).collect()),
            Err(err) => {
                warn!(query, error = %err, "ats search failed; listing stored candidates only");
                None
            }
        }
    }

    /// The list for one tab, optionally narrowed by a free-text ATS search.
    pub async fn list_candidates(
        &self,
        viewer: &Viewer,
        filter: CandidateFilter,
        query: Option<&str>,
    ) -> Result<Vec<Candidate>, StoreError> {
        let scope = if viewer.is_admin {
            None
        } else {
            Some(viewer.user_id().unwrap_or_default())
        };
        let canonical = self.store.list_candidates(scope).await?;
        let external = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => self.search_external(q).await,
            None => None,
        };
        let overlay = self.overlay_for(viewer);
        Ok(reconcile(
            &canonical,
            external.as_deref(),
            filter,
            viewer,
            &overlay,
        ))
    }

    pub fn toggle_pin(&self, viewer: &Viewer, candidate: &Candidate) -> Result<bool, PinError> {
        pins::toggle_pin(&self.pins, candidate, viewer.user_id())
    }

    pub async fn check_duplicate(&self, fields: &DuplicateProbeFields) -> DuplicateCheckResult {
        self.probe.check(fields).await
    }

    /// Registers a new person.
    ///
    /// The duplicate probe always runs first. Without `confirmed`, a hit stops
    /// the registration and is returned for review. A caller-supplied ATS id,
    /// or a confirmed hit that carries one, is linked instead of creating a
    /// second ATS record. A caller-supplied id that is already stored is
    /// refused; a confirmed hit that is already stored returns that row. The
    /// ATS create is best-effort and the canonical row is always written.
    pub async fn register_candidate(
        &self,
        viewer: &Viewer,
        mut fields: NewCandidate,
        confirmed: bool,
    ) -> Result<RegistrationOutcome, PortalError> {
        let user_id = viewer.user_id().ok_or(PortalError::Unauthenticated)?;
        fields.name = fields.name.trim().to_string();
        if fields.name.is_empty() {
            return Err(PortalError::Invalid("name is required".to_string()));
        }

        let requested = pps_core::non_empty(&fields.external_id).map(str::to_string);
        let probe = self.probe.check(&DuplicateProbeFields::from(&fields)).await;
        if probe.is_duplicate && !confirmed {
            return Ok(RegistrationOutcome::Duplicate(probe));
        }

        if let Some(id) = &requested {
            if self.store.find_by_external_id(id).await?.is_some() {
                return Err(PortalError::Conflict(format!(
                    "ats id {id} is already linked to a stored candidate"
                )));
            }
        }
        let matched = probe
            .matched_candidate
            .as_ref()
            .and_then(|c| c.external_id())
            .map(str::to_string);
        if let (None, Some(id)) = (&requested, &matched) {
            if let Some(existing) = self.store.find_by_external_id(id).await? {
                info!(local_id = ?existing.local_id, ats_id = %id, "confirmed duplicate is already stored");
                return Ok(RegistrationOutcome::Existing {
                    candidate: existing,
                });
            }
        }

        let ats_sync = match requested.or(matched) {
            Some(id) => AtsSync::Linked(id),
            None => self.create_in_ats(&fields).await,
        };
        fields.external_id = match &ats_sync {
            AtsSync::Created(id) | AtsSync::Linked(id) => Some(id.clone()),
            AtsSync::Failed(_) => None,
        };

        let candidate = self
            .store
            .create_candidate(&fields, user_id)
            .await
            .map_err(|err| match err {
                StoreError::ExternalIdTaken(id) => PortalError::Conflict(format!(
                    "ats id {id} is already linked to a stored candidate"
                )),
                other => PortalError::Store(other),
            })?;
        info!(
            local_id = ?candidate.local_id,
            ats = ?ats_sync,
            "candidate registered"
        );
        Ok(RegistrationOutcome::Created {
            candidate,
            ats_sync,
        })
    }

    async fn create_in_ats(&self, fields: &NewCandidate) -> AtsSync {
        match self
            .ats
            .create_candidate(&AtsCandidateFields::from(fields))
            .await
        {
            Ok(record) => AtsSync::Created(record.id),
            Err(err) => {
                warn!(error = %err, "ats create failed; registering locally only");
                AtsSync::Failed(err.to_string())
            }
        }
    }

    fn authorize_owner(viewer: &Viewer, candidate: &Candidate) -> Result<(), PortalError> {
        if viewer.user_id().is_none() {
            return Err(PortalError::Unauthenticated);
        }
        if viewer.is_admin || viewer.owns(candidate) {
            Ok(())
        } else {
            Err(PortalError::Forbidden(format!(
                "{} belongs to another partner",
                candidate.name
            )))
        }
    }

    /// Changes a stored candidate's status. Moving to `Hired` also marks
    /// them as interesting for the viewer; any other status clears that.
    pub async fn set_status(
        &self,
        viewer: &Viewer,
        candidate: &Candidate,
        status: CandidateStatus,
    ) -> Result<Candidate, PortalError> {
        let local_id = candidate
            .local_id
            .filter(|_| candidate.is_canonical())
            .ok_or(PortalError::NotCanonical)?;
        Self::authorize_owner(viewer, candidate)?;

        self.store
            .update_candidate(
                local_id,
                &CandidatePatch {
                    status: Some(status),
                    ..CandidatePatch::default()
                },
            )
            .await?;
        let hired = status == CandidateStatus::Hired;
        if let Some(user_id) = viewer.user_id() {
            if let Err(err) = self
                .pins
                .set_interested(user_id, &candidate.overlay_keys(), hired)
            {
                warn!(error = %err, "interested flag not saved");
            }
        }

        let mut updated = candidate.clone();
        updated.status = status;
        updated.is_interested = hired;
        Ok(updated)
    }

    /// Deletes stored rows and their ATS copies. ATS deletion is
    /// best-effort and an already-missing ATS record counts as deleted.
    pub async fn delete_candidates(
        &self,
        viewer: &Viewer,
        candidates: &[Candidate],
    ) -> Result<DeletionReport, PortalError> {
        for candidate in candidates {
            if candidate.is_canonical() {
                Self::authorize_owner(viewer, candidate)?;
            } else if !viewer.is_admin {
                return Err(PortalError::Forbidden(
                    "only admins can delete ATS-only records".to_string(),
                ));
            }
        }

        let local_ids: Vec<_> = candidates
            .iter()
            .filter(|c| c.is_canonical())
            .filter_map(|c| c.local_id)
            .collect();
        self.store.delete_candidates(&local_ids).await?;

        let mut report = DeletionReport {
            deleted_local: local_ids.len(),
            ..DeletionReport::default()
        };
        for id in candidates.iter().filter_map(|c| c.external_id()) {
            match self.ats.delete_candidate(id).await {
                Ok(()) => report.deleted_ats.push(id.to_string()),
                Err(err) => {
                    warn!(ats_id = id, error = %err, "ats delete failed");
                    report.ats_failures.push((id.to_string(), err.to_string()));
                }
            }
        }
        info!(
            deleted_local = report.deleted_local,
            deleted_ats = report.deleted_ats.len(),
            "candidates deleted"
        );
        Ok(report)
    }

    /// Provider lookup only; nothing is written.
    pub async fn lookup_contact(&self, linkedin_url: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
        self.enrichment.enrich(linkedin_url).await
    }

    /// Looks up one candidate and saves whatever contact data turns up.
    pub async fn enrich_candidate(
        &self,
        viewer: &Viewer,
        candidate: &Candidate,
    ) -> Result<EnrichedCandidate, PortalError> {
        if viewer.user_id().is_none() {
            return Err(PortalError::Unauthenticated);
        }
        let url = pps_core::non_empty(&candidate.linkedin_url)
            .ok_or(EnrichmentError::MissingLinkedinUrl)?;
        let outcome = self.enrichment.enrich(url).await?;
        let write_back = match &outcome {
            EnrichmentOutcome::Found { contact } => {
                Some(write_contact(self.store.as_ref(), self.ats.as_ref(), candidate, contact).await)
            }
            EnrichmentOutcome::NoContactInfo => None,
        };
        Ok(EnrichedCandidate {
            outcome,
            write_back,
        })
    }

    pub async fn run_batch(
        &self,
        viewer: &Viewer,
        candidates: &[Candidate],
        events: Option<&UnboundedSender<BatchEvent>>,
    ) -> Result<BatchReport, PortalError> {
        if viewer.user_id().is_none() {
            return Err(PortalError::Unauthenticated);
        }
        Ok(self.batch.run(candidates, events).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pps_adapters::{AdapterError, AtsCandidate, ProviderReply};
    use pps_core::{DuplicateField, Session};
    use pps_storage::MemoryPreferenceStore;
    use serde_json::json;

    struct FixedProvider;

    #[async_trait]
    impl EnrichmentProvider for FixedProvider {
        async fn submit_lookup(&self, _linkedin_url: &str) -> Result<ProviderReply, AdapterError> {
            Ok(ProviderReply::ok(json!({
                "id": 1,
                "status": "complete",
                "emails": [{"email": "pro@corp.com", "type": "professional"}],
                "phones": []
            })))
        }

        async fn check_status(&self, _job_id: u64) -> Result<ProviderReply, AdapterError> {
            Err(AdapterError::Message("unused".into()))
        }
    }

    struct FailingSessions;

    #[async_trait]
    impl SessionProvider for FailingSessions {
        async fn current_session(&self) -> Result<Option<Session>, AdapterError> {
            Err(AdapterError::Message("auth down".into()))
        }

        async fn user_role(&self, _user_id: &str) -> Result<UserRole, AdapterError> {
            Ok(UserRole::Admin)
        }
    }

    struct Fixture {
        portal: Portal,
        store: Arc<MemoryCandidateStore>,
        ats: Arc<MemoryAts>,
    }

    fn fixture(stored: Vec<Candidate>, ats_records: Vec<AtsCandidate>) -> Fixture {
        let store = Arc::new(MemoryCandidateStore::with_candidates(stored));
        let ats = Arc::new(MemoryAts::with_records(ats_records));
        let portal = Portal::new(
            store.clone(),
            ats.clone(),
            Arc::new(FixedProvider),
            Arc::new(MemoryPreferenceStore::new()),
            Duration::ZERO,
        );
        Fixture { portal, store, ats }
    }

    fn ats_record(id: &str, name: &str, email: Option<&str>) -> AtsCandidate {
        AtsCandidate {
            id: id.into(),
            full_name: name.into(),
            email: email.map(ToString::to_string),
            ..AtsCandidate::default()
        }
    }

    fn owned(name: &str, owner: &str) -> Candidate {
        let mut c = Candidate::named(name);
        c.local_id = Some(uuid::Uuid::new_v4());
        c.created_by = Some(owner.into());
        c
    }

    #[tokio::test]
    async fn duplicate_email_blocks_registration() {
        let fx = fixture(vec![], vec![ats_record("55", "Existing Person", Some("a@x.com"))]);
        let viewer = Viewer::user("u1");
        let fields = NewCandidate {
            name: "New Person".into(),
            email: Some("a@x.com".into()),
            phone: Some(String::new()),
            linkedin_url: Some(String::new()),
            ..NewCandidate::default()
        };

        let outcome = fx
            .portal
            .register_candidate(&viewer, fields.clone(), false)
            .await
            .unwrap();
        let RegistrationOutcome::Duplicate(result) = outcome else {
            panic!("expected the duplicate to block registration");
        };
        assert!(result.is_duplicate);
        assert_eq!(result.matched_by, DuplicateField::Email);
        assert_eq!(
            result.matched_candidate.map(|c| c.name),
            Some("Existing Person".to_string())
        );
        assert!(fx.store.snapshot().await.is_empty());
        assert_eq!(fx.ats.records().await.len(), 1);

        let confirmed = fx.portal.register_candidate(&viewer, fields, true).await.unwrap();
        let RegistrationOutcome::Created { candidate, ats_sync } = confirmed else {
            panic!("confirmed registration should create");
        };
        assert_eq!(ats_sync, AtsSync::Linked("55".into()));
        assert_eq!(candidate.external_id.as_deref(), Some("55"));
        assert_eq!(fx.ats.records().await.len(), 1);
    }

    #[tokio::test]
    async fn supplied_ats_id_still_goes_through_the_duplicate_check() {
        let fx = fixture(vec![], vec![ats_record("55", "Existing Person", Some("a@x.com"))]);
        let viewer = Viewer::user("u1");
        let fields = NewCandidate {
            name: "New Person".into(),
            email: Some("a@x.com".into()),
            external_id: Some("999".into()),
            ..NewCandidate::default()
        };

        let outcome = fx
            .portal
            .register_candidate(&viewer, fields.clone(), false)
            .await
            .unwrap();
        assert!(matches!(outcome, RegistrationOutcome::Duplicate(_)));
        assert!(!fx.ats.queries().await.is_empty());
        assert!(fx.store.snapshot().await.is_empty());

        let linked = fx
            .portal
            .register_candidate(&viewer, fields.clone(), true)
            .await
            .unwrap();
        let RegistrationOutcome::Created { ats_sync, .. } = linked else {
            panic!("confirmed registration should create");
        };
        assert_eq!(ats_sync, AtsSync::Linked("999".into()));

        let again = fx.portal.register_candidate(&viewer, fields, true).await;
        assert!(matches!(again, Err(PortalError::Conflict(_))));
        let stored = fx.store.snapshot().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].external_id.as_deref(), Some("999"));
    }

    #[tokio::test]
    async fn confirmed_duplicate_already_stored_returns_that_row() {
        let mut existing = owned("Existing Person", "u2");
        existing.external_id = Some("55".into());
        let fx = fixture(
            vec![existing.clone()],
            vec![ats_record("55", "Existing Person", Some("a@x.com"))],
        );

        let outcome = fx
            .portal
            .register_candidate(
                &Viewer::user("u1"),
                NewCandidate {
                    name: "Existing Person".into(),
                    email: Some("a@x.com".into()),
                    ..NewCandidate::default()
                },
                true,
            )
            .await
            .unwrap();
        let RegistrationOutcome::Existing { candidate } = outcome else {
            panic!("expected the stored row back");
        };
        assert_eq!(candidate.local_id, existing.local_id);
        assert_eq!(fx.store.snapshot().await.len(), 1);
        assert_eq!(fx.ats.records().await.len(), 1);
    }

    #[tokio::test]
    async fn clean_registration_creates_in_both_stores() {
        let fx = fixture(vec![], vec![]);
        let outcome = fx
            .portal
            .register_candidate(
                &Viewer::user("u1"),
                NewCandidate {
                    name: "  Fresh Face ".into(),
                    email: Some("fresh@x.com".into()),
                    ..NewCandidate::default()
                },
                false,
            )
            .await
            .unwrap();
        let RegistrationOutcome::Created { candidate, ats_sync } = outcome else {
            panic!("expected creation");
        };
        assert_eq!(ats_sync, AtsSync::Created("1".into()));
        assert_eq!(candidate.name, "Fresh Face");
        assert_eq!(candidate.created_by.as_deref(), Some("u1"));
        assert!(candidate.visibility);
        assert_eq!(fx.ats.records().await[0].full_name, "Fresh Face");
    }

    #[tokio::test]
    async fn registration_needs_a_user_and_a_name() {
        let fx = fixture(vec![], vec![]);
        let anonymous = fx
            .portal
            .register_candidate(&Viewer::anonymous(), NewCandidate::default(), false)
            .await;
        assert!(matches!(anonymous, Err(PortalError::Unauthenticated)));
        let nameless = fx
            .portal
            .register_candidate(&Viewer::user("u1"), NewCandidate::default(), false)
            .await;
        assert!(matches!(nameless, Err(PortalError::Invalid(_))));
    }

    #[tokio::test]
    async fn search_lists_matched_and_transient_records() {
        let mut stored = owned("Ada Lovelace", "u1");
        stored.external_id = Some("1".into());
        let fx = fixture(
            vec![stored, owned("Unrelated", "u1")],
            vec![
                ats_record("1", "Ada Lovelace (ATS copy)", None),
                ats_record("2", "Ada Byron", None),
            ],
        );
        let viewer = Viewer::user("u1");

        let listed = fx
            .portal
            .list_candidates(&viewer, CandidateFilter::All, Some("ada"))
            .await
            .unwrap();
        let names: Vec<_> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ada Lovelace", "Ada Byron"]);
        assert!(listed[1].transient);

        let pinned = fx.portal.toggle_pin(&viewer, &listed[1]).unwrap();
        assert!(pinned);
        let pinned_tab = fx
            .portal
            .list_candidates(&viewer, CandidateFilter::Pinned, None)
            .await
            .unwrap();
        assert_eq!(pinned_tab.len(), 1);
        assert_eq!(pinned_tab[0].name, "Ada Byron");

        let everyone = fx
            .portal
            .list_candidates(&viewer, CandidateFilter::All, Some("   "))
            .await
            .unwrap();
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn hired_status_marks_interest() {
        let candidate = owned("Grace", "u1");
        let fx = fixture(vec![candidate.clone()], vec![]);
        let viewer = Viewer::user("u1");

        let updated = fx
            .portal
            .set_status(&viewer, &candidate, CandidateStatus::Hired)
            .await
            .unwrap();
        assert!(updated.is_interested);
        let hired = fx
            .portal
            .list_candidates(&viewer, CandidateFilter::Hired, None)
            .await
            .unwrap();
        assert_eq!(hired.len(), 1);
        assert!(hired[0].is_interested);

        fx.portal
            .set_status(&viewer, &candidate, CandidateStatus::Offer)
            .await
            .unwrap();
        let all = fx
            .portal
            .list_candidates(&viewer, CandidateFilter::All, None)
            .await
            .unwrap();
        assert!(!all[0].is_interested);
        assert_eq!(all[0].status, CandidateStatus::Offer);

        let stranger = fx
            .portal
            .set_status(&Viewer::user("u2"), &candidate, CandidateStatus::Hired)
            .await;
        assert!(matches!(stranger, Err(PortalError::Forbidden(_))));
    }

    #[tokio::test]
    async fn deletion_respects_ownership_and_tolerates_missing_ats_rows() {
        let mut mine = owned("Mine", "u1");
        mine.external_id = Some("9".into());
        let theirs = owned("Theirs", "u2");
        let fx = fixture(vec![mine.clone(), theirs.clone()], vec![]);

        let denied = fx
            .portal
            .delete_candidates(&Viewer::user("u1"), &[mine.clone(), theirs])
            .await;
        assert!(matches!(denied, Err(PortalError::Forbidden(_))));
        assert_eq!(fx.store.snapshot().await.len(), 2);

        let report = fx
            .portal
            .delete_candidates(&Viewer::user("u1"), &[mine])
            .await
            .unwrap();
        assert_eq!(report.deleted_local, 1);
        assert_eq!(report.deleted_ats, vec!["9".to_string()]);
        assert_eq!(fx.store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn single_enrichment_writes_back() {
        let mut candidate = owned("Linked", "u1");
        candidate.linkedin_url = Some("https://linkedin.com/in/linked".into());
        let fx = fixture(vec![candidate.clone()], vec![]);

        let enriched = fx
            .portal
            .enrich_candidate(&Viewer::user("u1"), &candidate)
            .await
            .unwrap();
        assert!(matches!(enriched.outcome, EnrichmentOutcome::Found { .. }));
        assert_eq!(
            fx.store.snapshot().await[0].email.as_deref(),
            Some("pro@corp.com")
        );

        let missing = fx
            .portal
            .enrich_candidate(&Viewer::user("u1"), &owned("No Url", "u1"))
            .await;
        assert!(matches!(
            missing,
            Err(PortalError::Enrichment(EnrichmentError::MissingLinkedinUrl))
        ));
    }

    #[tokio::test]
    async fn failing_session_lookup_means_anonymous() {
        let viewer = Portal::resolve_viewer(&FailingSessions).await;
        assert_eq!(viewer, Viewer::anonymous());
    }
}
