use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{ActionKind, ActionType, HttpMethod, PipelineAction, PipelineConfiguration, TriggerData};

/// Payload placed on the broker, one per action of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    #[serde(rename = "actionID")]
    pub action_id: Uuid,
    #[serde(rename = "pipelineID")]
    pub pipeline_id: Uuid,
    #[serde(rename = "pipelineRunID")]
    pub pipeline_run_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub data: TriggerData,
    #[serde(flatten)]
    pub payload: ActionPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActionPayload {
    SendEmail {
        #[serde(rename = "emailTemplateID")]
        email_template_id: Uuid,
        #[serde(rename = "eventID")]
        event_id: Uuid,
        #[serde(rename = "emailFieldID")]
        email_field_id: String,
    },
    AllowFormAccess {
        #[serde(rename = "toFormID")]
        to_form_id: Uuid,
        #[serde(rename = "emailFieldID")]
        email_field_id: String,
        #[serde(
            rename = "expiresInHours",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        expires_in_hours: Option<u32>,
    },
    Webhook {
        url: String,
        method: HttpMethod,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

impl ActionMessage {
    pub fn for_action(
        pipeline: &PipelineConfiguration,
        action: &PipelineAction,
        pipeline_run_id: Uuid,
        data: TriggerData,
    ) -> Self {
        let payload = match &action.kind {
            ActionKind::SendEmail {
                email_template_id,
                email_field_id,
            } => ActionPayload::SendEmail {
                email_template_id: *email_template_id,
                event_id: pipeline.event_id,
                email_field_id: email_field_id.clone(),
            },
            ActionKind::AllowFormAccess {
                to_form_id,
                email_field_id,
                expires_in_hours,
            } => ActionPayload::AllowFormAccess {
                to_form_id: *to_form_id,
                email_field_id: email_field_id.clone(),
                expires_in_hours: *expires_in_hours,
            },
            ActionKind::Webhook {
                url,
                method,
                headers,
            } => ActionPayload::Webhook {
                url: url.clone(),
                method: *method,
                headers: headers.clone(),
            },
        };

        Self {
            action_id: action.id,
            pipeline_id: pipeline.id,
            pipeline_run_id,
            name: action.name.clone(),
            data,
            payload,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self.payload {
            ActionPayload::SendEmail { .. } => ActionType::SendEmail,
            ActionPayload::AllowFormAccess { .. } => ActionType::AllowFormAccess,
            ActionPayload::Webhook { .. } => ActionType::Webhook,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::PipelineEvent;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_send_email_message_wire_format() {
        let template_id = Uuid::new_v4();
        let action = PipelineAction::new(
            "Confirmation",
            ActionKind::SendEmail {
                email_template_id: template_id,
                email_field_id: "email".to_string(),
            },
        );
        let pipeline = PipelineConfiguration {
            id: Uuid::new_v4(),
            name: "Welcome".to_string(),
            event_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            event: PipelineEvent::FormSubmission {
                on_form_id: Uuid::new_v4(),
            },
            actions: vec![action.clone()],
            enabled: true,
        };
        let run_id = Uuid::new_v4();
        let data = json!({ "email": "ada@example.com" }).as_object().cloned().unwrap();

        let message = ActionMessage::for_action(&pipeline, &action, run_id, data);

        assert_eq!(message.action_type(), ActionType::SendEmail);
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "type": "SendEmail",
                "actionID": action.id,
                "pipelineID": pipeline.id,
                "pipelineRunID": run_id,
                "name": "Confirmation",
                "emailTemplateID": template_id,
                "eventID": pipeline.event_id,
                "emailFieldID": "email",
                "data": { "email": "ada@example.com" },
            })
        );
    }

    #[test]
    fn test_decode_webhook_message() {
        let message: ActionMessage = serde_json::from_value(json!({
            "type": "Webhook",
            "actionID": Uuid::new_v4(),
            "pipelineID": Uuid::new_v4(),
            "pipelineRunID": Uuid::new_v4(),
            "name": "Notify",
            "url": "https://hooks.example.com/in",
            "method": "POST",
        }))
        .unwrap();

        assert_eq!(message.action_type(), ActionType::Webhook);
        assert!(message.data.is_empty());
    }
}
