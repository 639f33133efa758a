use chrono::{DateTime, Utc};
use db::dtos::{PipelineRun, RunStatus};
use db::{PipelineStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

pub const MAX_WRITE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Success,
    Failure(String),
}

impl ActionOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            ActionOutcome::Success => RunStatus::Success,
            ActionOutcome::Failure(_) => RunStatus::Failure,
        }
    }

    pub fn error_msg(&self) -> Option<&str> {
        match self {
            ActionOutcome::Success => None,
            ActionOutcome::Failure(message) => Some(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("action {action_id} is not part of pipeline run {run_id}")]
    UnknownAction { run_id: Uuid, action_id: Uuid },
    #[error("pipeline run {0} was still contended after {1} attempts")]
    Contended(Uuid, usize),
}

/// Records `outcome` on the action's entry and recomputes the run status.
/// Returns false when the run has no entry for `action_id`.
///
/// The run only leaves `Pending`/`Running` once every entry is terminal, and
/// then it is `Failure` if any entry failed.
pub fn apply_outcome(
    run: &mut PipelineRun,
    action_id: Uuid,
    outcome: &ActionOutcome,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let Some(entry) = run
        .action_statuses
        .iter_mut()
        .find(|entry| entry.action_id == action_id)
    else {
        return false;
    };

    entry.status = outcome.status();
    entry.started_at.get_or_insert(started_at);
    entry.completed_at = Some(now);
    entry.error_msg = outcome.error_msg().map(str::to_string);

    run.ran_at.get_or_insert(started_at);

    if run.is_finished() {
        let failed = run
            .action_statuses
            .iter()
            .any(|entry| entry.status == RunStatus::Failure);

        run.status = if failed {
            RunStatus::Failure
        } else {
            RunStatus::Success
        };
        run.completed_at = Some(now);
    } else {
        run.status = RunStatus::Running;
    }

    true
}

/// Folds action completions into their pipeline run. Every write is a
/// fresh read-modify-write guarded by the run's version, retried on
/// conflict, so concurrent workers never lose each other's updates.
pub struct RunStatusAggregator {
    store: Arc<dyn PipelineStore>,
    max_attempts: usize,
}

impl RunStatusAggregator {
    pub fn new(store: Arc<dyn PipelineStore>) -> Self {
        Self {
            store,
            max_attempts: MAX_WRITE_ATTEMPTS,
        }
    }

    pub async fn write_action_processed(
        &self,
        run_id: Uuid,
        action_id: Uuid,
        outcome: &ActionOutcome,
        started_at: DateTime<Utc>,
    ) -> Result<PipelineRun, AggregateError> {
        for attempt in 1..=self.max_attempts {
            let mut run = self.store.get_pipeline_run(run_id).await?;

            if !apply_outcome(&mut run, action_id, outcome, started_at, Utc::now()) {
                return Err(AggregateError::UnknownAction { run_id, action_id });
            }

            match self.store.update_pipeline_run(&run).await {
                Ok(()) => {
                    run.version += 1;

                    if run.status.is_terminal() {
                        info!("Pipeline run {run_id} finished with {:?}", run.status);
                    }

                    return Ok(run);
                }
                Err(StoreError::Conflict(_)) => {
                    debug!("Pipeline run {run_id} changed underneath, attempt {attempt}");
                }
                Err(error) => return Err(error.into()),
            }
        }

        Err(AggregateError::Contended(run_id, self.max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::dtos::{
        ActionKind, HttpMethod, PipelineAction, PipelineConfiguration, PipelineEvent,
    };
    use db::MemoryStore;
    use std::collections::BTreeMap;

    fn pipeline(actions: usize) -> PipelineConfiguration {
        PipelineConfiguration {
            id: Uuid::new_v4(),
            name: "Webhooks".to_string(),
            event_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            event: PipelineEvent::FormSubmission {
                on_form_id: Uuid::new_v4(),
            },
            actions: (0..actions)
                .map(|index| {
                    PipelineAction::new(
                        format!("hook {index}"),
                        ActionKind::Webhook {
                            url: "https://example.com".to_string(),
                            method: HttpMethod::Post,
                            headers: BTreeMap::new(),
                        },
                    )
                })
                .collect(),
            enabled: true,
        }
    }

    #[test]
    fn test_run_stays_running_until_last_action() {
        let pipeline = pipeline(3);
        let mut run = PipelineRun::for_pipeline(&pipeline, Utc::now());
        let now = Utc::now();

        assert!(apply_outcome(&mut run, pipeline.actions[0].id, &ActionOutcome::Success, now, now));
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.ran_at, Some(now));

        let failure = ActionOutcome::Failure("webhook responded with status 500".to_string());
        assert!(apply_outcome(&mut run, pipeline.actions[2].id, &failure, now, now));
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.completed_at, None);

        assert!(apply_outcome(&mut run, pipeline.actions[1].id, &ActionOutcome::Success, now, now));
        assert_eq!(run.status, RunStatus::Failure);
        assert_eq!(run.completed_at, Some(now));
        assert_eq!(
            run.action_status(pipeline.actions[2].id)
                .and_then(|entry| entry.error_msg.as_deref()),
            Some("webhook responded with status 500")
        );
        assert_eq!(run.action_statuses.len(), 3);
    }

    #[test]
    fn test_single_success_completes_run() {
        let pipeline = pipeline(1);
        let mut run = PipelineRun::for_pipeline(&pipeline, Utc::now());
        let now = Utc::now();

        assert!(apply_outcome(&mut run, pipeline.actions[0].id, &ActionOutcome::Success, now, now));

        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.action_statuses[0].error_msg, None);
    }

    #[test]
    fn test_reapplying_outcome_is_idempotent() {
        let pipeline = pipeline(2);
        let mut run = PipelineRun::for_pipeline(&pipeline, Utc::now());
        let now = Utc::now();
        let failure = ActionOutcome::Failure("boom".to_string());

        apply_outcome(&mut run, pipeline.actions[0].id, &failure, now, now);
        let once = run.clone();
        apply_outcome(&mut run, pipeline.actions[0].id, &failure, now, now);

        assert_eq!(run, once);
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let pipeline = pipeline(1);
        let mut run = PipelineRun::for_pipeline(&pipeline, Utc::now());
        let before = run.clone();

        assert!(!apply_outcome(
            &mut run,
            Uuid::new_v4(),
            &ActionOutcome::Success,
            Utc::now(),
            Utc::now()
        ));
        assert_eq!(run, before);
    }

    #[tokio::test]
    async fn test_concurrent_completions_resolve_run() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(4);
        let run = PipelineRun::for_pipeline(&pipeline, Utc::now());
        let run_id = store.create_pipeline_run(&run).await.unwrap();
        let aggregator = Arc::new(RunStatusAggregator::new(store.clone()));

        let tasks: Vec<_> = pipeline
            .actions
            .iter()
            .map(|action| {
                let aggregator = aggregator.clone();
                let action_id = action.id;

                tokio::spawn(async move {
                    aggregator
                        .write_action_processed(run_id, action_id, &ActionOutcome::Success, Utc::now())
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let run = store.get_pipeline_run(run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert!(run
            .action_statuses
            .iter()
            .all(|entry| entry.status == RunStatus::Success));
        assert_eq!(run.version, 4);
    }

    #[tokio::test]
    async fn test_missing_run_is_store_error() {
        let aggregator = RunStatusAggregator::new(Arc::new(MemoryStore::new()));

        let error = aggregator
            .write_action_processed(
                Uuid::new_v4(),
                Uuid::new_v4(),
                &ActionOutcome::Success,
                Utc::now(),
            )
            .await
            .unwrap_err();

        assert!(matches!(error, AggregateError::Store(ref error) if error.is_not_found()));
    }
}
