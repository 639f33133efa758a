use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PipelineConfiguration;

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "run_status", rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Failure,
    Success,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineActionStatus {
    #[serde(rename = "actionID")]
    pub action_id: Uuid,
    pub status: RunStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

/// One firing of a pipeline. `action_statuses` mirrors the pipeline's actions
/// at trigger time and never changes length afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    #[serde(default)]
    pub id: Uuid,
    #[serde(rename = "pipelineID")]
    pub pipeline_id: Uuid,
    pub triggered_at: DateTime<Utc>,
    #[serde(default)]
    pub ran_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub action_statuses: Vec<PipelineActionStatus>,
    /// Bumped by the store on every write; updates must carry the version
    /// they read.
    #[serde(default)]
    pub version: i64,
}

impl PipelineRun {
    pub fn for_pipeline(pipeline: &PipelineConfiguration, triggered_at: DateTime<Utc>) -> Self {
        let action_statuses = pipeline
            .actions
            .iter()
            .map(|action| PipelineActionStatus {
                action_id: action.id,
                status: RunStatus::Pending,
                started_at: None,
                completed_at: None,
                error_msg: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            triggered_at,
            ran_at: None,
            completed_at: None,
            status: RunStatus::Pending,
            action_statuses,
            version: 0,
        }
    }

    pub fn action_status(&self, action_id: Uuid) -> Option<&PipelineActionStatus> {
        self.action_statuses
            .iter()
            .find(|status| status.action_id == action_id)
    }

    pub fn is_finished(&self) -> bool {
        self.action_statuses
            .iter()
            .all(|status| status.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::{ActionKind, PipelineAction, PipelineEvent};
    use serde_json::json;

    #[test]
    fn test_for_pipeline_mirrors_actions() {
        let actions: Vec<_> = (0..3)
            .map(|i| {
                PipelineAction::new(
                    format!("grant {i}"),
                    ActionKind::AllowFormAccess {
                        to_form_id: Uuid::new_v4(),
                        email_field_id: "email".to_string(),
                        expires_in_hours: None,
                    },
                )
            })
            .collect();

        let pipeline = PipelineConfiguration {
            id: Uuid::new_v4(),
            name: "Grant access".to_string(),
            event_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            event: PipelineEvent::FormSubmission {
                on_form_id: Uuid::new_v4(),
            },
            actions,
            enabled: true,
        };

        let run = PipelineRun::for_pipeline(&pipeline, Utc::now());

        assert_eq!(run.pipeline_id, pipeline.id);
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.action_statuses.len(), 3);
        for (status, action) in run.action_statuses.iter().zip(&pipeline.actions) {
            assert_eq!(status.action_id, action.id);
            assert_eq!(status.status, RunStatus::Pending);
        }
        assert!(!run.is_finished());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(RunStatus::Failure).unwrap(), json!("Failure"));
        assert!(RunStatus::Success.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
