use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Comparison, TriggerData};

/// Domain events a pipeline can listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FormSubmission,
    FieldChange,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::FormSubmission => f.write_str("FormSubmission"),
            EventKind::FieldChange => f.write_str("FieldChange"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChangeCondition {
    pub comparison: Comparison,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    FormSubmission {
        #[serde(rename = "onFormID")]
        on_form_id: Uuid,
    },
    FieldChange {
        #[serde(rename = "onFormID")]
        on_form_id: Uuid,
        #[serde(rename = "onFieldID")]
        on_field_id: String,
        condition: FieldChangeCondition,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::FormSubmission { .. } => EventKind::FormSubmission,
            PipelineEvent::FieldChange { .. } => EventKind::FieldChange,
        }
    }

    pub fn form_id(&self) -> Uuid {
        match self {
            PipelineEvent::FormSubmission { on_form_id }
            | PipelineEvent::FieldChange { on_form_id, .. } => *on_form_id,
        }
    }

    /// Whether a `kind` event on `form_id` carrying `data` fires this trigger.
    ///
    /// A field change only fires when the watched field is present in `data`
    /// and satisfies the condition.
    pub fn is_triggered_by(&self, kind: EventKind, form_id: Uuid, data: &TriggerData) -> bool {
        if self.kind() != kind || self.form_id() != form_id {
            return false;
        }

        match self {
            PipelineEvent::FormSubmission { .. } => true,
            PipelineEvent::FieldChange {
                on_field_id,
                condition,
                ..
            } => data
                .get(on_field_id)
                .is_some_and(|value| condition.comparison.compare(value, &condition.value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> TriggerData {
        value.as_object().cloned().unwrap()
    }

    fn status_change(form_id: Uuid, comparison: Comparison) -> PipelineEvent {
        PipelineEvent::FieldChange {
            on_form_id: form_id,
            on_field_id: "status".to_string(),
            condition: FieldChangeCondition {
                comparison,
                value: "accepted".to_string(),
            },
        }
    }

    #[test]
    fn test_form_submission_matches_form() {
        let form_id = Uuid::new_v4();
        let event = PipelineEvent::FormSubmission {
            on_form_id: form_id,
        };

        assert!(event.is_triggered_by(EventKind::FormSubmission, form_id, &TriggerData::new()));
        assert!(!event.is_triggered_by(
            EventKind::FormSubmission,
            Uuid::new_v4(),
            &TriggerData::new()
        ));
        assert!(!event.is_triggered_by(EventKind::FieldChange, form_id, &TriggerData::new()));
    }

    #[test]
    fn test_field_change_condition() {
        let form_id = Uuid::new_v4();
        let eq = status_change(form_id, Comparison::Eq);
        let neq = status_change(form_id, Comparison::Neq);

        let accepted = data(json!({ "status": "accepted" }));
        let waitlisted = data(json!({ "status": "waitlisted" }));
        let missing = data(json!({ "name": "Ada" }));
        let numeric = data(json!({ "status": 1 }));

        assert!(eq.is_triggered_by(EventKind::FieldChange, form_id, &accepted));
        assert!(!eq.is_triggered_by(EventKind::FieldChange, form_id, &waitlisted));
        assert!(neq.is_triggered_by(EventKind::FieldChange, form_id, &waitlisted));
        assert!(!eq.is_triggered_by(EventKind::FieldChange, form_id, &missing));
        assert!(!neq.is_triggered_by(EventKind::FieldChange, form_id, &missing));
        assert!(!eq.is_triggered_by(EventKind::FieldChange, form_id, &numeric));
        assert!(neq.is_triggered_by(EventKind::FieldChange, form_id, &numeric));
    }

    #[test]
    fn test_wire_format() {
        let form_id = Uuid::new_v4();
        let event = status_change(form_id, Comparison::Eq);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "FieldChange",
                "onFormID": form_id.to_string(),
                "onFieldID": "status",
                "condition": { "comparison": "eq", "value": "accepted" },
            })
        );

        assert!(serde_json::from_value::<PipelineEvent>(json!({
            "type": "FormDeleted",
            "onFormID": form_id.to_string(),
        }))
        .is_err());
    }
}
