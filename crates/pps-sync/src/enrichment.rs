//! Contact lookup against the enrichment provider: submit, poll until the job
//! settles, then pull an email and phone out of the result.

use std::sync::Arc;
use std::time::Duration;

use pps_adapters::{EnrichmentProvider, ProviderReply};
use pps_core::{ContactData, EmailCategory, EnrichmentJob, EnrichmentStatus};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

/// Poll budget. Not configurable: together these bound a lookup to ~30s.
pub const POLL_ATTEMPTS: u32 = 10;
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    #[error("linkedin url is required")]
    MissingLinkedinUrl,
    #[error("enrichment provider unreachable: {0}")]
    Transport(String),
    #[error("empty response from enrichment provider")]
    EmptyResponse,
    #[error("enrichment provider rejected the api key")]
    Unauthorized,
    #[error("access denied or out of lookup credits")]
    AccessDenied,
    #[error("profile not found")]
    NotFound,
    #[error("enrichment provider error: {0}")]
    Upstream(String),
    #[error("lookup failed to resolve data")]
    LookupFailed,
    #[error("polling timed out after {0} attempts")]
    PollingTimedOut(u32),
    #[error("lookup incomplete, retry later")]
    Incomplete,
}

/// Result of a lookup that reached the provider successfully. An empty
/// result is a valid answer, distinct from any error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Found { contact: ContactData },
    NoContactInfo,
}

fn status_code(reply: &ProviderReply) -> u16 {
    reply
        .body
        .get("status")
        .and_then(JsonValue::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .filter(|code| *code >= 400)
        .unwrap_or(reply.http_status)
}

fn error_message(body: &JsonValue) -> Option<String> {
    ["detail", "error"].iter().find_map(|field| match body.get(*field)? {
        JsonValue::Null => None,
        JsonValue::String(s) if s.trim().is_empty() => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

fn is_empty_body(body: &JsonValue) -> bool {
    match body {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Maps a raw provider reply onto a job or a categorized error.
pub fn interpret_reply(reply: ProviderReply) -> Result<EnrichmentJob, EnrichmentError> {
    let code = status_code(&reply);
    if code >= 400 {
        return Err(match code {
            401 => EnrichmentError::Unauthorized,
            403 => EnrichmentError::AccessDenied,
            404 => EnrichmentError::NotFound,
            _ => EnrichmentError::Upstream(
                error_message(&reply.body).unwrap_or_else(|| format!("http status {code}")),
            ),
        });
    }
    if is_empty_body(&reply.body) {
        return Err(EnrichmentError::EmptyResponse);
    }
    if let Some(message) = error_message(&reply.body) {
        return Err(EnrichmentError::Upstream(message));
    }
    serde_json::from_value(reply.body)
        .map_err(|err| EnrichmentError::Upstream(format!("unreadable job: {err}")))
}

/// Picks one email (personal, then professional, then whatever comes first)
/// and the first phone. Blank entries are ignored.
pub fn extract_contact_data(job: &EnrichmentJob) -> EnrichmentOutcome {
    let emails: Vec<_> = job
        .emails
        .iter()
        .filter(|e| !e.address.trim().is_empty())
        .collect();
    let by_category = |category: EmailCategory| {
        emails
            .iter()
            .find(|e| e.category == Some(category))
            .map(|e| e.address.trim().to_string())
    };
    let email = by_category(EmailCategory::Personal)
        .or_else(|| by_category(EmailCategory::Professional))
        .or_else(|| emails.first().map(|e| e.address.trim().to_string()));
    let phone = job
        .phones
        .iter()
        .map(|p| p.number.trim())
        .find(|n| !n.is_empty())
        .map(ToString::to_string);

    let contact = ContactData { email, phone };
    if contact.is_empty() {
        EnrichmentOutcome::NoContactInfo
    } else {
        EnrichmentOutcome::Found { contact }
    }
}

#[derive(Clone)]
pub struct EnrichmentWorkflow {
    provider: Arc<dyn EnrichmentProvider>,
}

impl EnrichmentWorkflow {
    pub fn new(provider: Arc<dyn EnrichmentProvider>) -> Self {
        Self { provider }
    }

    /// Submits a lookup and, while the job is pending, polls it by id.
    pub async fn lookup(&self, linkedin_url: &str) -> Result<EnrichmentJob, EnrichmentError> {
        let url = linkedin_url.trim();
        if url.is_empty() {
            return Err(EnrichmentError::MissingLinkedinUrl);
        }
        let span = info_span!("enrichment_lookup", linkedin_url = url);
        async {
            let reply = self
                .provider
                .submit_lookup(url)
                .await
                .map_err(|err| EnrichmentError::Transport(err.to_string()))?;
            let mut job = interpret_reply(reply)?;
            debug!(status = ?job.status, id = ?job.id, "lookup submitted");

            if job.status.is_pending() {
                let id = job.id.ok_or_else(|| {
                    EnrichmentError::Upstream("pending job has no id".to_string())
                })?;
                job = self.poll(id).await?;
            }
            settle(job)
        }
        .instrument(span)
        .await
    }

    async fn poll(&self, id: u64) -> Result<EnrichmentJob, EnrichmentError> {
        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(POLL_INTERVAL).await;
            let reply = match self.provider.check_status(id).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(attempt, error = %err, "status check failed");
                    continue;
                }
            };
            match interpret_reply(reply) {
                Ok(job) if job.status.is_terminal() => {
                    info!(attempt, status = ?job.status, "lookup settled");
                    return Ok(job);
                }
                Ok(job) => debug!(attempt, status = ?job.status, "lookup still pending"),
                Err(err) => warn!(attempt, error = %err, "status check rejected"),
            }
        }
        Err(EnrichmentError::PollingTimedOut(POLL_ATTEMPTS))
    }

    /// Lookup plus extraction.
    pub async fn enrich(&self, linkedin_url: &str) -> Result<EnrichmentOutcome, EnrichmentError> {
        let job = self.lookup(linkedin_url).await?;
        Ok(extract_contact_data(&job))
    }
}

fn settle(job: EnrichmentJob) -> Result<EnrichmentJob, EnrichmentError> {
    match job.status {
        EnrichmentStatus::Failed => Err(EnrichmentError::LookupFailed),
        EnrichmentStatus::Complete | EnrichmentStatus::NotQueued => Ok(job),
        _ if job.has_contact_lists() => Ok(job),
        _ => Err(EnrichmentError::Incomplete),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use async_trait::async_trait;
    use pps_adapters::AdapterError;
    use pps_core::{EnrichedEmail, EnrichedPhone};
    use serde_json::json;
    use tokio::time::Instant;

    /// Replays a fixed submit reply, then the scripted status replies; once
    /// the script runs out it keeps answering with `fallback`.
    struct ScriptedProvider {
        submit: Result<ProviderReply, String>,
        checks: Mutex<VecDeque<Result<ProviderReply, String>>>,
        fallback: ProviderReply,
        check_calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProvider {
        fn new(submit: JsonValue) -> Self {
            Self {
                submit: Ok(ProviderReply::ok(submit)),
                checks: Mutex::new(VecDeque::new()),
                fallback: ProviderReply::ok(json!({"id": 1, "status": "searching"})),
                check_calls: Mutex::new(Vec::new()),
            }
        }

        fn then(self, reply: Result<JsonValue, &str>) -> Self {
            self.checks
                .lock()
                .unwrap()
                .push_back(reply.map(ProviderReply::ok).map_err(ToString::to_string));
            self
        }

        fn calls(&self) -> Vec<Instant> {
            self.check_calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EnrichmentProvider for ScriptedProvider {
        async fn submit_lookup(&self, _linkedin_url: &str) -> Result<ProviderReply, AdapterError> {
            self.submit.clone().map_err(AdapterError::Message)
        }

        async fn check_status(&self, _job_id: u64) -> Result<ProviderReply, AdapterError> {
            self.check_calls.lock().unwrap().push(Instant::now());
            match self.checks.lock().unwrap().pop_front() {
                Some(reply) => reply.map_err(AdapterError::Message),
                None => Ok(self.fallback.clone()),
            }
        }
    }

    fn workflow(provider: Arc<ScriptedProvider>) -> EnrichmentWorkflow {
        EnrichmentWorkflow::new(provider)
    }

    #[tokio::test]
    async fn empty_url_fails_before_any_call() {
        let provider = Arc::new(ScriptedProvider::new(json!({"status": "complete"})));
        let err = workflow(provider.clone()).lookup("   ").await.unwrap_err();
        assert_eq!(err, EnrichmentError::MissingLinkedinUrl);
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn upstream_error_payloads_are_categorized() {
        let cases = [
            (ProviderReply { http_status: 401, body: json!({"detail": "bad key"}) }, EnrichmentError::Unauthorized),
            (ProviderReply { http_status: 403, body: JsonValue::Null }, EnrichmentError::AccessDenied),
            (ProviderReply::ok(json!({"status": 404})), EnrichmentError::NotFound),
            (
                ProviderReply { http_status: 500, body: json!({"error": "boom"}) },
                EnrichmentError::Upstream("boom".into()),
            ),
            (ProviderReply::ok(json!({"detail": "Invalid profile url"})), EnrichmentError::Upstream("Invalid profile url".into())),
            (ProviderReply::ok(JsonValue::Null), EnrichmentError::EmptyResponse),
            (ProviderReply::ok(json!({})), EnrichmentError::EmptyResponse),
        ];
        for (reply, expected) in cases {
            assert_eq!(interpret_reply(reply).unwrap_err(), expected);
        }
    }

    #[tokio::test]
    async fn transport_failure_on_submit_is_not_retried() {
        let mut provider = ScriptedProvider::new(JsonValue::Null);
        provider.submit = Err("connection refused".into());
        let provider = Arc::new(provider);
        let err = workflow(provider.clone()).lookup("https://linkedin.com/in/x").await.unwrap_err();
        assert!(matches!(err, EnrichmentError::Transport(_)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_budget_is_ten_delayed_attempts() {
        let provider = Arc::new(ScriptedProvider::new(json!({"id": 1, "status": "searching"})));
        let started = Instant::now();
        let err = workflow(provider.clone())
            .lookup("https://linkedin.com/in/slow")
            .await
            .unwrap_err();
        assert_eq!(err, EnrichmentError::PollingTimedOut(10));

        let calls = provider.calls();
        assert_eq!(calls.len(), 10);
        for (i, at) in calls.iter().enumerate() {
            assert_eq!(*at - started, POLL_INTERVAL * (i as u32 + 1));
        }
        assert_eq!(started.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn poll_stops_at_first_terminal_status_and_swallows_transient_errors() {
        let provider = Arc::new(
            ScriptedProvider::new(json!({"id": 8, "status": "waiting"}))
                .then(Err("timeout"))
                .then(Ok(json!({"id": 8, "status": "progress"})))
                .then(Ok(json!({
                    "id": 8,
                    "status": "complete",
                    "emails": [
                        {"email": "work@corp.com", "type": "professional"},
                        {"email": "me@home.net", "type": "personal"}
                    ],
                    "phones": [{"number": "+1 555 0100"}, {"number": "+1 555 0199"}]
                }))),
        );
        let outcome = workflow(provider.clone())
            .enrich("https://linkedin.com/in/found")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            EnrichmentOutcome::Found {
                contact: ContactData {
                    email: Some("me@home.net".into()),
                    phone: Some("+1 555 0100".into()),
                }
            }
        );
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_terminal_is_a_lookup_failure() {
        let provider = Arc::new(
            ScriptedProvider::new(json!({"id": 2, "status": "searching"}))
                .then(Ok(json!({"id": 2, "status": "failed"}))),
        );
        let err = workflow(provider).lookup("https://linkedin.com/in/gone").await.unwrap_err();
        assert_eq!(err, EnrichmentError::LookupFailed);
    }

    #[tokio::test]
    async fn complete_without_contacts_is_no_contact_info() {
        let provider = Arc::new(ScriptedProvider::new(
            json!({"id": 3, "status": "complete", "emails": [], "phones": []}),
        ));
        let outcome = workflow(provider.clone())
            .enrich("https://linkedin.com/in/private")
            .await
            .unwrap();
        assert_eq!(outcome, EnrichmentOutcome::NoContactInfo);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn unsettled_initial_status_needs_contact_lists() {
        let bare = Arc::new(ScriptedProvider::new(json!({"id": 4, "status": "submitted"})));
        assert_eq!(
            workflow(bare).lookup("https://linkedin.com/in/a").await.unwrap_err(),
            EnrichmentError::Incomplete
        );

        let populated = Arc::new(ScriptedProvider::new(json!({
            "id": 5,
            "status": "submitted",
            "phones": [{"number": "020 7946 0000"}]
        })));
        let job = workflow(populated).lookup("https://linkedin.com/in/b").await.unwrap();
        assert_eq!(job.phones.len(), 1);
    }

    #[test]
    fn email_preference_falls_back_to_professional_then_first() {
        let email = |address: &str, category| EnrichedEmail {
            address: address.into(),
            category,
        };
        let mut job = EnrichmentJob {
            id: Some(1),
            status: EnrichmentStatus::Complete,
            emails: vec![
                email(" ", Some(EmailCategory::Personal)),
                email("other@x.com", Some(EmailCategory::Other)),
                email("pro@x.com", Some(EmailCategory::Professional)),
            ],
            phones: vec![],
        };
        assert_eq!(
            extract_contact_data(&job),
            EnrichmentOutcome::Found {
                contact: ContactData {
                    email: Some("pro@x.com".into()),
                    phone: None,
                }
            }
        );

        job.emails.truncate(2);
        job.phones.push(EnrichedPhone { number: "+33 1".into() });
        assert_eq!(
            extract_contact_data(&job),
            EnrichmentOutcome::Found {
                contact: ContactData {
                    email: Some("other@x.com".into()),
                    phone: Some("+33 1".into()),
                }
            }
        );
    }
}
