use std::sync::Arc;

use async_trait::async_trait;
use pps_storage::{JsonHttpClient, JsonResponse};
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::{AdapterError, EnrichmentProvider, ProviderReply};

/// Contact-enrichment provider client (person lookup + status check).
#[derive(Debug, Clone)]
pub struct RocketReachClient {
    http: Arc<JsonHttpClient>,
    base_url: String,
    api_key: String,
}

impl RocketReachClient {
    pub fn new(http: Arc<JsonHttpClient>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn call(&self, path: &str, query: &[(&str, String)]) -> Result<JsonResponse, AdapterError> {
        let request = self
            .http
            .request(Method::GET, &format!("{}{path}", self.base_url))
            .header("Api-Key", &self.api_key)
            .query(query);
        // The lookup workflow owns polling and pacing, so each call goes out once.
        Ok(self.http.send_once(request).await?)
    }
}

/// Status checks answer with a list; pick the entry for `job_id`. A list
/// without it reads as an empty reply.
fn select_job(body: JsonValue, job_id: u64) -> JsonValue {
    match body {
        JsonValue::Array(items) => items
            .into_iter()
            .find(|item| item.get("id").and_then(JsonValue::as_u64) == Some(job_id))
            .unwrap_or(JsonValue::Null),
        other => other,
    }
}

#[async_trait]
impl EnrichmentProvider for RocketReachClient {
    async fn submit_lookup(&self, linkedin_url: &str) -> Result<ProviderReply, AdapterError> {
        let resp = self
            .call("/person/lookup", &[("linkedin_url", linkedin_url.to_string())])
            .await?;
        Ok(ProviderReply {
            http_status: resp.status.as_u16(),
            body: resp.body,
        })
    }

    async fn check_status(&self, job_id: u64) -> Result<ProviderReply, AdapterError> {
        let resp = self
            .call("/person/checkStatus", &[("ids", job_id.to_string())])
            .await?;
        let http_status = resp.status.as_u16();
        let body = if resp.status.is_success() {
            select_job(resp.body, job_id)
        } else {
            resp.body
        };
        Ok(ProviderReply { http_status, body })
    }
}
