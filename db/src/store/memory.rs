use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{prepare_new, prepare_update, EventResourceStore, PipelineFilter, PipelineStore, StoreError};
use crate::dtos::{EmailTemplate, EventSecrets, FormAllowedSubmitter, PipelineConfiguration, PipelineRun};

/// Process-local store used by tests and single-node development setups.
#[derive(Default)]
pub struct MemoryStore {
    pipelines: RwLock<HashMap<Uuid, PipelineConfiguration>>,
    runs: RwLock<HashMap<Uuid, PipelineRun>>,
    secrets: RwLock<HashMap<Uuid, EventSecrets>>,
    templates: RwLock<HashMap<Uuid, EmailTemplate>>,
    allowed_submitters: RwLock<HashMap<Uuid, Vec<FormAllowedSubmitter>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event_secrets(&self, secrets: EventSecrets) {
        self.secrets.write().await.insert(secrets.event_id, secrets);
    }

    pub async fn insert_email_template(&self, template: EmailTemplate) {
        self.templates.write().await.insert(template.id, template);
    }

    pub async fn runs(&self) -> Vec<PipelineRun> {
        self.runs.read().await.values().cloned().collect()
    }

    pub async fn runs_for_pipeline(&self, pipeline_id: Uuid) -> Vec<PipelineRun> {
        self.runs
            .read()
            .await
            .values()
            .filter(|run| run.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn get_pipeline(&self, id: Uuid) -> Result<PipelineConfiguration, StoreError> {
        self.pipelines
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "pipeline",
                id,
            })
    }

    async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
    ) -> Result<Vec<PipelineConfiguration>, StoreError> {
        let mut pipelines: Vec<_> = self
            .pipelines
            .read()
            .await
            .values()
            .filter(|pipeline| filter.matches(pipeline))
            .cloned()
            .collect();
        pipelines.sort_by_key(|pipeline| pipeline.updated_at);

        Ok(pipelines)
    }

    async fn create_pipeline(
        &self,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError> {
        let pipeline = prepare_new(pipeline)?;
        self.pipelines
            .write()
            .await
            .insert(pipeline.id, pipeline.clone());

        Ok(pipeline)
    }

    async fn update_pipeline(
        &self,
        id: Uuid,
        pipeline: PipelineConfiguration,
    ) -> Result<PipelineConfiguration, StoreError> {
        let mut pipelines = self.pipelines.write().await;
        let existing = pipelines.get(&id).ok_or(StoreError::NotFound {
            entity: "pipeline",
            id,
        })?;

        let pipeline = prepare_update(existing, pipeline)?;
        pipelines.insert(id, pipeline.clone());

        Ok(pipeline)
    }

    async fn create_pipeline_run(&self, run: &PipelineRun) -> Result<Uuid, StoreError> {
        let mut run = run.clone();
        if run.id.is_nil() {
            run.id = Uuid::new_v4();
        }
        run.version = 0;

        let id = run.id;
        self.runs.write().await.insert(id, run);

        Ok(id)
    }

    async fn get_pipeline_run(&self, id: Uuid) -> Result<PipelineRun, StoreError> {
        self.runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "pipeline run",
                id,
            })
    }

    async fn update_pipeline_run(&self, run: &PipelineRun) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let stored = runs.get_mut(&run.id).ok_or(StoreError::NotFound {
            entity: "pipeline run",
            id: run.id,
        })?;

        if stored.version != run.version {
            return Err(StoreError::Conflict(run.id));
        }

        *stored = PipelineRun {
            version: run.version + 1,
            ..run.clone()
        };

        Ok(())
    }
}

#[async_trait]
impl EventResourceStore for MemoryStore {
    async fn get_event_secrets(&self, event_id: Uuid) -> Result<Option<EventSecrets>, StoreError> {
        Ok(self.secrets.read().await.get(&event_id).cloned())
    }

    async fn get_email_template(&self, id: Uuid) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(self.templates.read().await.get(&id).cloned())
    }

    async fn get_form_allowed_submitters(
        &self,
        form_id: Uuid,
    ) -> Result<Vec<FormAllowedSubmitter>, StoreError> {
        Ok(self
            .allowed_submitters
            .read()
            .await
            .get(&form_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_allowed_submitter(
        &self,
        form_id: Uuid,
        submitter: FormAllowedSubmitter,
    ) -> Result<(), StoreError> {
        self.allowed_submitters
            .write()
            .await
            .entry(form_id)
            .or_default()
            .push(submitter);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::{ActionKind, HttpMethod, PipelineAction, PipelineEvent, RunStatus};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn draft(event_id: Uuid, form_id: Uuid) -> PipelineConfiguration {
        PipelineConfiguration {
            id: Uuid::nil(),
            name: "Notify".to_string(),
            event_id,
            updated_at: Utc::now(),
            event: PipelineEvent::FormSubmission {
                on_form_id: form_id,
            },
            actions: vec![PipelineAction {
                id: Uuid::nil(),
                name: "hook".to_string(),
                kind: ActionKind::Webhook {
                    url: "https://example.com/hook".to_string(),
                    method: HttpMethod::Post,
                    headers: BTreeMap::new(),
                },
            }],
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let store = MemoryStore::new();
        let created = store
            .create_pipeline(draft(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();

        assert!(!created.id.is_nil());
        assert!(!created.actions[0].id.is_nil());
        assert_eq!(store.get_pipeline(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_update_keeps_event_and_action_ids() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();
        let created = store
            .create_pipeline(draft(event_id, Uuid::new_v4()))
            .await
            .unwrap();

        let mut edited = created.clone();
        edited.event_id = Uuid::new_v4();
        edited.actions.push(PipelineAction {
            id: Uuid::nil(),
            name: "second hook".to_string(),
            kind: created.actions[0].kind.clone(),
        });

        let updated = store.update_pipeline(created.id, edited).await.unwrap();

        assert_eq!(updated.event_id, event_id);
        assert_eq!(updated.actions[0].id, created.actions[0].id);
        assert!(!updated.actions[1].id.is_nil());
        assert_ne!(updated.actions[1].id, updated.actions[0].id);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_pipeline() {
        let store = MemoryStore::new();
        let mut pipeline = draft(Uuid::new_v4(), Uuid::new_v4());
        pipeline.name = String::new();

        assert!(matches!(
            store.create_pipeline(pipeline).await,
            Err(StoreError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_event_and_form() {
        let store = MemoryStore::new();
        let event_id = Uuid::new_v4();
        let form_id = Uuid::new_v4();

        store.create_pipeline(draft(event_id, form_id)).await.unwrap();
        store
            .create_pipeline(draft(event_id, Uuid::new_v4()))
            .await
            .unwrap();
        store
            .create_pipeline(draft(Uuid::new_v4(), form_id))
            .await
            .unwrap();

        let for_event = store
            .list_pipelines(&PipelineFilter::for_event(event_id))
            .await
            .unwrap();
        let for_form = store
            .list_pipelines(&PipelineFilter::for_event(event_id).on_form(form_id))
            .await
            .unwrap();

        assert_eq!(for_event.len(), 2);
        assert_eq!(for_form.len(), 1);
    }

    #[tokio::test]
    async fn test_run_updates_are_versioned() {
        let store = MemoryStore::new();
        let pipeline = store
            .create_pipeline(draft(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
        let run_id = store
            .create_pipeline_run(&PipelineRun::for_pipeline(&pipeline, Utc::now()))
            .await
            .unwrap();

        let first = store.get_pipeline_run(run_id).await.unwrap();
        let second = store.get_pipeline_run(run_id).await.unwrap();

        let mut running = first.clone();
        running.status = RunStatus::Running;
        store.update_pipeline_run(&running).await.unwrap();

        assert!(matches!(
            store.update_pipeline_run(&second).await,
            Err(StoreError::Conflict(id)) if id == run_id
        ));

        let stored = store.get_pipeline_run(run_id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_missing_run_is_not_found() {
        let store = MemoryStore::new();

        let error = store.get_pipeline_run(Uuid::new_v4()).await.unwrap_err();
        assert!(error.is_not_found());
    }
}
