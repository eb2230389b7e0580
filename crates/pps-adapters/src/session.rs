use async_trait::async_trait;
use pps_core::{Session, UserRole};

use crate::{AdapterError, SessionProvider};

/// Fixed session, typically read from the environment by the CLI.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionProvider {
    session: Option<Session>,
    role: UserRole,
}

impl StaticSessionProvider {
    pub fn new(session: Option<Session>, role: UserRole) -> Self {
        Self { session, role }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let session = std::env::var("PPS_USER_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .map(|user_id| Session {
                user_id,
                email: std::env::var("PPS_USER_EMAIL").ok(),
                display_name: std::env::var("PPS_USER_NAME").ok(),
            });
        let role = std::env::var("PPS_USER_ROLE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self { session, role }
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn current_session(&self) -> Result<Option<Session>, AdapterError> {
        Ok(self.session.clone())
    }

    async fn user_role(&self, user_id: &str) -> Result<UserRole, AdapterError> {
        match &self.session {
            Some(session) if session.user_id == user_id => Ok(self.role),
            _ => Ok(UserRole::User),
        }
    }
}
