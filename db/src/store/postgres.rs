use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

use super::{prepare_new, prepare_update, EventResourceStore, PipelineFilter, PipelineStore, StoreError};
use crate::dtos::{
    decode_actions, EmailSecret, EmailTemplate, EventSecrets, FormAllowedSubmitter,
    PipelineActionStatus, PipelineConfiguration, PipelineRun, RunStatus,
};
use crate::MIGRATOR;

/// Postgres-backed store keeping pipeline documents as JSONB.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    name: String,
    event_id: Uuid,
    enabled: bool,
    event: Json<serde_json::Value>,
    actions: Json<serde_json::Value>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineRow> for PipelineConfiguration {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            event_id: row.event_id,
            updated_at: row.updated_at,
            event: serde_json::from_value(row.event.0)?,
            actions: decode_actions(row.actions.0)?,
            enabled: row.enabled,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PipelineRunRow {
    id: Uuid,
    pipeline_id: Uuid,
    status: RunStatus,
    triggered_at: DateTime<Utc>,
    ran_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    action_statuses: Json<Vec<PipelineActionStatus>>,
    version: i64,
}

impl From<PipelineRunRow> for PipelineRun {
    fn from(row: PipelineRunRow) -> Self {
        Self {
            id: row.id,
            pipeline_id: row.pipeline_id,
            triggered_at: row.triggered_at,
            ran_at: row.ran_at,
            completed_at: row.completed_at,
            status: row.status,
            action_statuses: row.action_statuses.0,
            version: row.version,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EmailTemplateRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    subject: String,
    body: String,
    from_address: String,
    cc: Vec<String>,
    bcc: Vec<String>,
    reply_to: Option<String>,
    is_html: bool,
    updated_at: DateTime<Utc>,
}

impl From<EmailTemplateRow> for EmailTemplate {
    fn from(row: EmailTemplateRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            subject: row.subject,
            body: row.body,
            from: row.from_address,
            cc: row.cc,
            bcc: row.bcc,
            reply_to: row.reply_to,
            is_html: row.is_html,
            updated_at: row.updated_at,
        }
    }
}

const PIPELINE_COLUMNS: &str = "id, name, event_id, enabled, event, actions, updated_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        debug!("Database migrations applied");

        Ok(())
    }

    async fn fetch_pipeline(&self, id: Uuid) -> Result<PipelineConfiguration, StoreError> {
        let row = sqlx::query_as::<_, PipelineRow>(&format!(
            "SELECT {PIPELINE_COLUMNS} FROM pipelines WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "pipeline",
            id,
        })?;

        row.try_into()
    }

    async fn run_exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM pipeline_runs WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn get_pipeline(&self, id: Uuid) -> Result<PipelineConfiguration, StoreError> {
        self.fetch_pipeline(id).await
    }

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineConfiguration>, StoreError> {
        let rows = sqlx::query_as::<_, PipelineRow>(&format!(
            r#"
            SELECT
                {PIPELINE_COLUMNS}
            FROM
                pipelines
            WHERE
                ($1::uuid IS NULL OR event_id = $1)
                AND ($2::uuid IS NULL OR (event ->> 'onFormID')::uuid = $2)
            ORDER BY
                updated_at
            "#
        ))
        .bind(filter.event_id)
        .bind(filter.form_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PipelineConfiguration::try_from).collect()
    }

    async fn create_pipeline(
        &self,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError> {
        let pipeline = prepare_new(pipeline)?;

        sqlx::query(
            r#"
            INSERT INTO pipelines (id, name, event_id, enabled, event, actions, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pipeline.id)
        .bind(&pipeline.name)
        .bind(pipeline.event_id)
        .bind(pipeline.enabled)
        .bind(Json(&pipeline.event))
        .bind(Json(&pipeline.actions))
        .bind(pipeline.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(pipeline)
    }

    async fn update_pipeline(
        &self,
        id: Uuid,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError> {
        let existing = self.fetch_pipeline(id).await?;
        let pipeline = prepare_update(&existing, pipeline)?;

        sqlx::query(
            r#"
            UPDATE
                pipelines
            SET
                name = $1, enabled = $2, event = $3, actions = $4, updated_at = $5
            WHERE
                id = $6
            "#,
        )
        .bind(&pipeline.name)
        .bind(pipeline.enabled)
        .bind(Json(&pipeline.event))
        .bind(Json(&pipeline.actions))
        .bind(pipeline.updated_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(pipeline)
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<Uuid, StoreError> {
        let id = if run.id.is_nil() { Uuid::new_v4() } else { run.id };

        sqlx::query(
            r#"
            INSERT INTO pipeline_runs
                (id, pipeline_id, status, triggered_at, ran_at, completed_at, action_statuses, version)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, 0)
            "#,
        )
        .bind(id)
        .bind(run.pipeline_id)
        .bind(run.status)
        .bind(run.triggered_at)
        .bind(run.ran_at)
        .bind(run.completed_at)
        .bind(Json(&run.action_statuses))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_pipeline_run(&self, id: Uuid) -> Result<PipelineRun, StoreError> {
        let row = sqlx::query_as::<_, PipelineRunRow>(
            r#"
            SELECT
                id, pipeline_id, status, triggered_at, ran_at, completed_at, action_statuses, version
            FROM
                pipeline_runs
            WHERE
                id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "pipeline run",
            id,
        })?;

        Ok(row.into())
    }

    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE
                pipeline_runs
            SET
                status = $1,
                ran_at = $2,
                completed_at = $3,
                action_statuses = $4,
                version = version + 1
            WHERE
                id = $5 AND version = $6
            "#,
        )
        .bind(run.status)
        .bind(run.ran_at)
        .bind(run.completed_at)
        .bind(Json(&run.action_statuses))
        .bind(run.id)
        .bind(run.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if self.run_exists(run.id).await? {
                return Err(StoreError::Conflict(run.id));
            }

            return Err(StoreError::NotFound {
                entity: "pipeline run",
                id: run.id,
            });
        }

        Ok(())
    }
}

#[async_trait]
impl EventResourceStore for PgStore {
    async fn get_event_secrets(&self, event_id: Uuid) -> Result<Option<EventSecrets>, StoreError> {
        let email = sqlx::query_scalar::<_, Option<Json<EmailSecret>>>(
            "SELECT email FROM event_secrets WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(email.map(|email| EventSecrets {
            event_id,
            email: email.map(|Json(email)| email),
        }))
    }

    async fn get_email_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        let row = sqlx::query_as::<_, EmailTemplateRow>(
            r#"
            SELECT
                id, event_id, name, subject, body, from_address, cc, bcc, reply_to, is_html, updated_at
            FROM
                email_templates
            WHERE
                id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailTemplate::from))
    }

    async fn get_form_allowed_submitters(
        &self,
        form_id: Uuid,
    ) -> Result<Vec<FormAllowedSubmitter>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Option<DateTime<Utc>>)>(
            "SELECT email, expires_at FROM form_allowed_submitters WHERE form_id = $1 ORDER BY created_at",
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(email, expires_at)| FormAllowedSubmitter { email, expires_at })
            .collect())
    }

    async fn add_allowed_submitter(
        &self,
        form_id: Uuid,
        submitter: FormAllowedSubmitter,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO form_allowed_submitters (form_id, email, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(form_id)
        .bind(&submitter.email)
        .bind(submitter.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
