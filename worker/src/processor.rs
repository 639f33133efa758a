use async_trait::async_trait;
use broker::{HandlerError, MessageHandler};
use chrono::Utc;
use db::dtos::{ActionMessage, ActionType, RunStatus};
use db::PipelineStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::{ActionOutcome, AggregateError, RunStatusAggregator};
use crate::registry::HandlerRegistry;

/// What happened to one delivered message. Every variant is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// The outcome was written; carries the run status afterwards.
    Recorded(RunStatus),
    /// The action already has a terminal status; nothing was executed.
    Duplicate,
    /// The message cannot be tied to a run entry and was discarded.
    Dropped,
}

/// The routing fields of a message, each decoded on its own so that one bad
/// field does not hide the others.
struct RoutingHeader {
    action_type: Result<ActionType, String>,
    action_id: Result<Uuid, String>,
    pipeline_id: Result<Uuid, String>,
    pipeline_run_id: Result<Uuid, String>,
}

impl RoutingHeader {
    fn parse(payload: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|error| format!("message is not valid JSON: {error}"))?;
        let Value::Object(fields) = value else {
            return Err("message is not a JSON object".to_string());
        };

        let action_type = match fields.get("type") {
            Some(Value::String(name)) => name
                .parse::<ActionType>()
                .map_err(|error| error.to_string()),
            Some(_) => Err("action type must be a string".to_string()),
            None => Err("missing action type".to_string()),
        };

        Ok(Self {
            action_type,
            action_id: uuid_field(&fields, "actionID"),
            pipeline_id: uuid_field(&fields, "pipelineID"),
            pipeline_run_id: uuid_field(&fields, "pipelineRunID"),
        })
    }
}

fn uuid_field(fields: &Map<String, Value>, name: &str) -> Result<Uuid, String> {
    match fields.get(name) {
        Some(Value::String(raw)) => match Uuid::parse_str(raw) {
            Ok(id) if id.is_nil() => Err(format!("{name} is nil")),
            Ok(id) => Ok(id),
            Err(error) => Err(format!("invalid {name} {raw:?}: {error}")),
        },
        Some(_) => Err(format!("{name} must be a string")),
        None => Err(format!("missing {name}")),
    }
}

/// Consumes action messages: routes each to its handler and records the
/// result on the pipeline run. Malformed messages and handler failures are
/// recorded and acknowledged; only a failed status write is handed back to
/// the broker for redelivery.
pub struct ActionProcessor {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn PipelineStore>,
    aggregator: RunStatusAggregator,
}

impl ActionProcessor {
    pub fn new(registry: Arc<HandlerRegistry>, store: Arc<dyn PipelineStore>) -> Self {
        Self {
            registry,
            aggregator: RunStatusAggregator::new(store.clone()),
            store,
        }
    }

    pub async fn process(&self, payload: &[u8]) -> Result<Processed, AggregateError> {
        let header = match RoutingHeader::parse(payload) {
            Ok(header) => header,
            Err(error) => {
                warn!("Dropping unreadable action message: {error}");
                return Ok(Processed::Dropped);
            }
        };

        let (run_id, action_id) = match (&header.pipeline_run_id, &header.action_id) {
            (Ok(run_id), Ok(action_id)) => (*run_id, *action_id),
            (Err(error), _) | (_, Err(error)) => {
                warn!("Dropping action message without a usable run entry: {error}");
                return Ok(Processed::Dropped);
            }
        };

        match self.store.get_pipeline_run(run_id).await {
            Ok(run) => match run.action_status(action_id) {
                Some(entry) if entry.status.is_terminal() => {
                    info!("Action {action_id} of run {run_id} already processed, skipping");
                    return Ok(Processed::Duplicate);
                }
                Some(_) => {}
                None => {
                    warn!("Action {action_id} is not part of run {run_id}, dropping");
                    return Ok(Processed::Dropped);
                }
            },
            Err(error) if error.is_not_found() => {
                warn!("Pipeline run {run_id} does not exist, dropping action {action_id}");
                return Ok(Processed::Dropped);
            }
            Err(error) => return Err(error.into()),
        }

        let started_at = Utc::now();
        let outcome = match self.execute(&header, payload).await {
            Ok(()) => ActionOutcome::Success,
            Err(error) => {
                warn!("Action {action_id} of run {run_id} failed: {error}");
                ActionOutcome::Failure(error)
            }
        };

        match self
            .aggregator
            .write_action_processed(run_id, action_id, &outcome, started_at)
            .await
        {
            Ok(run) => {
                debug!("Run {run_id} is now {:?}", run.status);
                Ok(Processed::Recorded(run.status))
            }
            Err(AggregateError::UnknownAction { .. }) => Ok(Processed::Dropped),
            Err(error) => Err(error),
        }
    }

    /// Runs the handler for the message and flattens every failure into the
    /// message stored on the run entry.
    async fn execute(&self, header: &RoutingHeader, payload: &[u8]) -> Result<(), String> {
        let action_type = header.action_type.clone()?;
        if let Err(error) = &header.pipeline_id {
            return Err(error.clone());
        }

        let handler = self
            .registry
            .get(action_type)
            .ok_or_else(|| format!("no handler found for action type {action_type}"))?;

        let message: ActionMessage = serde_json::from_slice(payload)
            .map_err(|error| format!("failed to decode {action_type} message: {error}"))?;

        handler
            .handle_action(&message)
            .await
            .map_err(|error| error.to_string())
    }
}

#[async_trait]
impl MessageHandler for ActionProcessor {
    async fn handle_message(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.process(payload).await.map(|_| ()).map_err(|error| {
            error!("Failed to record action outcome: {error:?}");
            HandlerError::new(error.to_string())
        })
    }
}
