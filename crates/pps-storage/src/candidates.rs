use async_trait::async_trait;
use chrono::Utc;
use pps_core::{non_empty, Candidate, CandidatePatch, NewCandidate};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::StoreError;

/// Canonical candidate storage. Authoritative over external copies.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// `None` lists every row; `Some(user)` lists rows that user may see
    /// (visible ones plus the ones they own).
    async fn list_candidates(&self, user_id: Option<&str>) -> Result<Vec<Candidate>, StoreError>;

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Candidate>, StoreError>;

    /// Fails with [`StoreError::ExternalIdTaken`] when another row already
    /// carries the same ATS id.
    async fn create_candidate(
        &self,
        fields: &NewCandidate,
        user_id: &str,
    ) -> Result<Candidate, StoreError>;

    async fn update_candidate(&self, id: Uuid, patch: &CandidatePatch) -> Result<(), StoreError>;

    async fn delete_candidates(&self, ids: &[Uuid]) -> Result<(), StoreError>;
}

fn new_record(fields: &NewCandidate, user_id: &str) -> Candidate {
    Candidate {
        local_id: Some(Uuid::new_v4()),
        external_id: non_empty(&fields.external_id).map(str::to_string),
        name: fields.name.trim().to_string(),
        email: fields.email.clone(),
        phone: fields.phone.clone(),
        linkedin_url: fields.linkedin_url.clone(),
        role: fields.role.clone(),
        current_company: fields.current_company.clone(),
        location: fields.location.clone(),
        status: fields.status,
        created_by: Some(user_id.to_string()),
        source: fields.source.clone(),
        visibility: fields.visibility,
        created_at: Some(Utc::now()),
        ..Candidate::default()
    }
}

#[derive(Debug, Default)]
pub struct MemoryCandidateStore {
    rows: Mutex<Vec<Candidate>>,
}

impl MemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candidates(rows: Vec<Candidate>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    pub async fn snapshot(&self) -> Vec<Candidate> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl CandidateStore for MemoryCandidateStore {
    async fn list_candidates(&self, user_id: Option<&str>) -> Result<Vec<Candidate>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|c| match user_id {
                None => true,
                Some(user) => c.visibility || c.created_by.as_deref() == Some(user),
            })
            .cloned()
            .collect())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Candidate>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|c| c.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_candidate(
        &self,
        fields: &NewCandidate,
        user_id: &str,
    ) -> Result<Candidate, StoreError> {
        let record = new_record(fields, user_id);
        let mut rows = self.rows.lock().await;
        if let Some(id) = record.external_id.as_deref() {
            if rows.iter().any(|c| c.external_id.as_deref() == Some(id)) {
                return Err(StoreError::ExternalIdTaken(id.to_string()));
            }
        }
        rows.push(record.clone());
        Ok(record)
    }

    async fn update_candidate(&self, id: Uuid, patch: &CandidatePatch) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(ext) = non_empty(&patch.external_id) {
            if rows
                .iter()
                .any(|c| c.local_id != Some(id) && c.external_id.as_deref() == Some(ext))
            {
                return Err(StoreError::ExternalIdTaken(ext.to_string()));
            }
        }
        let row = rows
            .iter_mut()
            .find(|c| c.local_id == Some(id))
            .ok_or(StoreError::NotFound(id))?;
        patch.apply_to(row);
        Ok(())
    }

    async fn delete_candidates(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        self.rows
            .lock()
            .await
            .retain(|c| c.local_id.map(|id| !ids.contains(&id)).unwrap_or(true));
        Ok(())
    }
}

/// Maps the `external_id` unique constraint onto a typed error.
fn external_id_conflict(err: sqlx::Error, external_id: Option<&str>) -> StoreError {
    match (&err, external_id) {
        (sqlx::Error::Database(db), Some(id)) if db.is_unique_violation() => {
            StoreError::ExternalIdTaken(id.to_string())
        }
        _ => StoreError::Database(err),
    }
}

const CANDIDATE_COLUMNS: &str = "id, external_id, name, email, phone, linkedin_url, role, \
     current_company, location, status, created_by, source, visibility, created_at";

#[derive(Debug, Clone)]
pub struct PgCandidateStore {
    pool: PgPool,
}

impl PgCandidateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_candidate(row: &PgRow) -> Result<Candidate, sqlx::Error> {
        let status: String = row.try_get("status")?;
        Ok(Candidate {
            local_id: Some(row.try_get("id")?),
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            linkedin_url: row.try_get("linkedin_url")?,
            role: row.try_get("role")?,
            current_company: row.try_get("current_company")?,
            location: row.try_get("location")?,
            status: status.parse().unwrap_or_default(),
            created_by: row.try_get("created_by")?,
            source: row.try_get("source")?,
            visibility: row.try_get("visibility")?,
            created_at: Some(row.try_get("created_at")?),
            ..Candidate::default()
        })
    }
}

#[async_trait]
impl CandidateStore for PgCandidateStore {
    async fn list_candidates(&self, user_id: Option<&str>) -> Result<Vec<Candidate>, StoreError> {
        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}
              FROM candidates
             WHERE $1::text IS NULL OR visibility OR created_by = $1
             ORDER BY created_at ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter()
            .map(Self::row_to_candidate)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Candidate>, StoreError> {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE external_id = $1");
        let row = sqlx::query(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_candidate).transpose()?)
    }

    async fn create_candidate(
        &self,
        fields: &NewCandidate,
        user_id: &str,
    ) -> Result<Candidate, StoreError> {
        let record = new_record(fields, user_id);
        let sql = format!(
            r#"
            INSERT INTO candidates
                (id, external_id, name, email, phone, linkedin_url, role,
                 current_company, location, status, created_by, source, visibility)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {CANDIDATE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(record.local_id)
            .bind(&record.external_id)
            .bind(&record.name)
            .bind(&record.email)
            .bind(&record.phone)
            .bind(&record.linkedin_url)
            .bind(&record.role)
            .bind(&record.current_company)
            .bind(&record.location)
            .bind(record.status.as_str())
            .bind(&record.created_by)
            .bind(&record.source)
            .bind(record.visibility)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| external_id_conflict(err, record.external_id.as_deref()))?;
        Ok(Self::row_to_candidate(&row)?)
    }

    async fn update_candidate(&self, id: Uuid, patch: &CandidatePatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
               SET external_id = COALESCE($2, external_id),
                   email = COALESCE($3, email),
                   phone = COALESCE($4, phone),
                   linkedin_url = COALESCE($5, linkedin_url),
                   status = COALESCE($6, status),
                   visibility = COALESCE($7, visibility),
                   updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&patch.external_id)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.linkedin_url)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.visibility)
        .execute(&self.pool)
        .await
        .map_err(|err| external_id_conflict(err, patch.external_id.as_deref()))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn delete_candidates(&self, ids: &[Uuid]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("DELETE FROM candidates WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
