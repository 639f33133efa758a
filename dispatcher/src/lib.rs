mod billing;
mod error;

pub use billing::{AllowAll, BillingGate};
pub use error::{DispatchError, EnqueueFailure};

use broker::{Producer, TopicMessage};
use chrono::Utc;
use db::dtos::{ActionMessage, EventKind, PipelineConfiguration, PipelineRun, TriggerData};
use db::{PipelineFilter, PipelineStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one firing. `run_id` is `None` when the pipeline was disabled.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TriggerReport {
    pub pipeline_id: Uuid,
    pub run_id: Option<Uuid>,
    pub produced: usize,
}

/// Turns domain events into pipeline runs and action messages. It only
/// waits for enqueueing, never for the actions themselves.
pub struct Dispatcher {
    store: Arc<dyn PipelineStore>,
    producer: Arc<dyn Producer>,
    billing: Arc<dyn BillingGate>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn PipelineStore>, producer: Arc<dyn Producer>) -> Self {
        Self {
            store,
            producer,
            billing: Arc::new(AllowAll),
        }
    }

    pub fn with_billing_gate(mut self, billing: Arc<dyn BillingGate>) -> Self {
        self.billing = billing;
        self
    }

    /// Records a run for `pipeline` and enqueues one message per action, in
    /// configuration order. A failed enqueue does not stop the remaining
    /// actions; all failures are reported together afterwards.
    pub async fn trigger(
        &self,
        pipeline: &PipelineConfiguration,
        data: TriggerData,
    ) -> Result<TriggerReport, DispatchError> {
        let mut report = TriggerReport {
            pipeline_id: pipeline.id,
            ..Default::default()
        };

        if !pipeline.enabled {
            debug!("Pipeline {} is disabled, skipping trigger", pipeline.id);
            return Ok(report);
        }

        let run = PipelineRun::for_pipeline(pipeline, Utc::now());
        let run_id = self
            .store
            .create_pipeline_run(&run)
            .await
            .map_err(DispatchError::CreateRun)?;
        report.run_id = Some(run_id);

        let mut failures = Vec::new();

        for action in &pipeline.actions {
            let message = ActionMessage::for_action(pipeline, action, run_id, data.clone());
            let payload = serde_json::to_vec(&message)?;

            match self
                .producer
                .produce(&TopicMessage::keyed(run_id.to_string(), payload))
                .await
            {
                Ok(()) => report.produced += 1,
                Err(error) => {
                    error!("Failed to enqueue action {} of run {run_id}: {error:?}", action.id);
                    failures.push(EnqueueFailure {
                        action_id: action.id,
                        action_name: action.name.clone(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(DispatchError::PartialEnqueue { run_id, failures });
        }

        info!(
            "Triggered pipeline {} as run {run_id} with {} actions",
            pipeline.id, report.produced
        );

        Ok(report)
    }

    pub async fn on_form_submission(
        &self,
        event_id: Uuid,
        form_id: Uuid,
        data: TriggerData,
    ) -> Result<Vec<TriggerReport>, DispatchError> {
        self.on_event(EventKind::FormSubmission, event_id, form_id, data)
            .await
    }

    pub async fn on_field_change(
        &self,
        event_id: Uuid,
        form_id: Uuid,
        data: TriggerData,
    ) -> Result<Vec<TriggerReport>, DispatchError> {
        self.on_event(EventKind::FieldChange, event_id, form_id, data)
            .await
    }

    /// Pipelines are re-read on every call so edits apply to the next firing.
    async fn on_event(
        &self,
        kind: EventKind,
        event_id: Uuid,
        form_id: Uuid,
        data: TriggerData,
    ) -> Result<Vec<TriggerReport>, DispatchError> {
        let filter = PipelineFilter::for_event(event_id).on_form(form_id);
        let pipelines = self
            .store
            .list_pipelines(&filter)
            .await
            .map_err(DispatchError::ListPipelines)?;

        let mut reports = Vec::new();

        let triggered = pipelines
            .iter()
            .filter(|pipeline| pipeline.enabled)
            .filter(|pipeline| pipeline.event.is_triggered_by(kind, form_id, &data));

        for pipeline in triggered {
            if !self.billing.allow_pipeline_run(event_id).await {
                warn!("Pipeline run quota exceeded for event {event_id}");
                return Err(DispatchError::QuotaExceeded(event_id));
            }

            reports.push(self.trigger(pipeline, data.clone()).await?);
        }

        debug!("{kind} on form {form_id} triggered {} pipelines", reports.len());

        Ok(reports)
    }
}
