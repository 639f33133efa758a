use broker::BrokerError;
use db::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("action {action_id} ({action_name}): {error}")]
pub struct EnqueueFailure {
    pub action_id: Uuid,
    pub action_name: String,
    #[source]
    pub error: BrokerError,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to record pipeline run: {0}")]
    CreateRun(#[source] StoreError),
    #[error("failed to load pipelines: {0}")]
    ListPipelines(#[source] StoreError),
    #[error("failed to encode action message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{} of the actions of run {run_id} could not be enqueued", failures.len())]
    PartialEnqueue {
        run_id: Uuid,
        failures: Vec<EnqueueFailure>,
    },
    #[error("pipeline run quota exceeded for event {0}")]
    QuotaExceeded(Uuid),
}
