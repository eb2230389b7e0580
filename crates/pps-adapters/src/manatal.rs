use std::sync::Arc;

use async_trait::async_trait;
use pps_storage::{JsonHttpClient, JsonResponse};
use reqwest::Method;
use tracing::debug;

use crate::{
    AdapterError, AtsCandidate, AtsCandidateFields, AtsClient, AtsMatch, AtsQuery, AtsSearchField,
    AtsSearchPage,
};

/// REST client for the hosted ATS (token-authenticated, Django-style filters).
#[derive(Debug, Clone)]
pub struct ManatalClient {
    http: Arc<JsonHttpClient>,
    base_url: String,
    token: String,
}

impl ManatalClient {
    pub fn new(http: Arc<JsonHttpClient>, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn filter_param(query: &AtsQuery) -> String {
        let base = match query.field {
            AtsSearchField::Email => "email",
            AtsSearchField::Phone => "phone_number",
            AtsSearchField::Linkedin => "linkedin_url",
            AtsSearchField::Name => "full_name",
        };
        match query.mode {
            AtsMatch::Exact => base.to_string(),
            AtsMatch::Contains => format!("{base}__icontains"),
        }
    }

    fn candidates_url(&self) -> String {
        format!("{}/candidates/", self.base_url)
    }

    fn candidate_url(&self, id: &str) -> String {
        format!("{}/candidates/{id}/", self.base_url)
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<JsonResponse, AdapterError> {
        let request = request.header("Authorization", format!("Token {}", self.token));
        Ok(self.http.send(request).await?.error_for_status()?)
    }
}

#[async_trait]
impl AtsClient for ManatalClient {
    async fn search_candidates(&self, query: &AtsQuery) -> Result<AtsSearchPage, AdapterError> {
        let param = Self::filter_param(query);
        debug!(param = %param, "ats candidate search");
        let resp = self
            .call(
                self.http
                    .request(Method::GET, &self.candidates_url())
                    .query(&[(param.as_str(), query.value.as_str())]),
            )
            .await?;
        Ok(serde_json::from_value(resp.body)?)
    }

    async fn get_candidate(&self, id: &str) -> Result<AtsCandidate, AdapterError> {
        let resp = self
            .call(self.http.request(Method::GET, &self.candidate_url(id)))
            .await?;
        Ok(serde_json::from_value(resp.body)?)
    }

    async fn create_candidate(&self, fields: &AtsCandidateFields) -> Result<AtsCandidate, AdapterError> {
        let resp = self
            .call(
                self.http
                    .request(Method::POST, &self.candidates_url())
                    .json(fields),
            )
            .await?;
        Ok(serde_json::from_value(resp.body)?)
    }

    async fn update_candidate(
        &self,
        id: &str,
        fields: &AtsCandidateFields,
    ) -> Result<AtsCandidate, AdapterError> {
        let resp = self
            .call(
                self.http
                    .request(Method::PATCH, &self.candidate_url(id))
                    .json(fields),
            )
            .await?;
        Ok(serde_json::from_value(resp.body)?)
    }

    async fn delete_candidate(&self, id: &str) -> Result<(), AdapterError> {
        match self
            .call(self.http.request(Method::DELETE, &self.candidate_url(id)))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => {
                debug!(id, "ats candidate already gone");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pps_storage::HttpClientConfig;

    #[test]
    fn filters_follow_field_and_mode() {
        assert_eq!(
            ManatalClient::filter_param(&AtsQuery::exact(AtsSearchField::Phone, "+1")),
            "phone_number"
        );
        assert_eq!(
            ManatalClient::filter_param(&AtsQuery::contains(AtsSearchField::Linkedin, "in/ada")),
            "linkedin_url__icontains"
        );
    }

    #[test]
    fn urls_ignore_trailing_slash_in_base() {
        let http = Arc::new(JsonHttpClient::new(HttpClientConfig::default()).unwrap());
        let client = ManatalClient::new(http, "https://ats.test/open/v3/", "t");
        assert_eq!(client.candidates_url(), "https://ats.test/open/v3/candidates/");
        assert_eq!(client.candidate_url("12"), "https://ats.test/open/v3/candidates/12/");
    }
}
