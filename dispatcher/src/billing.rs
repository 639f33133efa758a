use async_trait::async_trait;
use uuid::Uuid;

/// Quota check consulted once per pipeline run before anything is written.
#[async_trait]
pub trait BillingGate: Send + Sync {
    async fn allow_pipeline_run(&self, event_id: Uuid) -> bool;
}

pub struct AllowAll;

#[async_trait]
impl BillingGate for AllowAll {
    async fn allow_pipeline_run(&self, _event_id: Uuid) -> bool {
        true
    }
}
