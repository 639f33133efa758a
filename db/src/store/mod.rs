mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::dtos::{
    ActionDecodeError, EmailTemplate, EventSecrets, FormAllowedSubmitter, PipelineConfiguration,
    PipelineRun, ValidationError,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("pipeline run {0} was modified concurrently")]
    Conflict(Uuid),
    #[error("invalid pipeline configuration: {0}")]
    Invalid(#[from] ValidationError),
    #[error("stored pipeline actions are invalid: {0}")]
    Actions(#[from] ActionDecodeError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineFilter {
    pub event_id: Option<Uuid>,
    pub form_id: Option<Uuid>,
}

impl PipelineFilter {
    pub fn for_event(event_id: Uuid) -> Self {
        Self {
            event_id: Some(event_id),
            form_id: None,
        }
    }

    pub fn on_form(mut self, form_id: Uuid) -> Self {
        self.form_id = Some(form_id);
        self
    }

    pub fn matches(&self, pipeline: &PipelineConfiguration) -> bool {
        self.event_id.map_or(true, |id| pipeline.event_id == id)
            && self.form_id.map_or(true, |id| pipeline.event.form_id() == id)
    }
}

/// Pipeline configurations and their runs.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_pipeline(&self, id: Uuid) -> Result<PipelineConfiguration, StoreError>;

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineConfiguration>, StoreError>;

    /// Assigns the pipeline id (when nil) and action ids, then validates.
    async fn create_pipeline(
        &self,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError>;

    /// Replaces the stored pipeline. The owning event cannot change and
    /// actions keep the ids they were given.
    async fn update_pipeline(
        &self,
        id: Uuid,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError>;

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<Uuid, StoreError>;

    async fn get_pipeline_run(&self, id: Uuid) -> Result<PipelineRun, StoreError>;

    /// Writes `run` only if the stored version still equals `run.version`,
    /// otherwise fails with [`StoreError::Conflict`].
    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StoreError>;
}

/// Event-scoped records the action handlers read and write.
#[async_trait]
pub trait EventResourceStore: Send + Sync {
    async fn get_event_secrets(&self, event_id: Uuid) -> Result<Option<EventSecrets>, StoreError>;

    async fn get_email_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError>;

    async fn get_form_allowed_submitters(
        &self,
        form_id: Uuid,
    ) -> Result<Vec<FormAllowedSubmitter>, StoreError>;

    async fn add_allowed_submitter(
        &self,
        form_id: Uuid,
        submitter: FormAllowedSubmitter,
    ) -> Result<(), StoreError>;
}

fn prepare_new(mut pipeline: PipelineConfiguration) -> Result<PipelineConfiguration, StoreError> {
    if pipeline.id.is_nil() {
        pipeline.id = Uuid::new_v4();
    }

    pipeline.assign_action_ids();
    pipeline.updated_at = Utc::now();
    pipeline.validate()?;

    Ok(pipeline)
}

fn prepare_update(
    existing: &PipelineConfiguration,
    mut pipeline: PipelineConfiguration,
) -> Result<PipelineConfiguration, StoreError> {
    pipeline.id = existing.id;
    pipeline.event_id = existing.event_id;
    pipeline.assign_action_ids();
    pipeline.updated_at = Utc::now();
    pipeline.validate()?;

    Ok(pipeline)
}
