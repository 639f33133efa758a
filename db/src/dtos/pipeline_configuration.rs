use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use super::{ActionKind, PipelineAction, PipelineEvent};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pipeline name is required")]
    EmptyName,
    #[error("pipeline must belong to an event")]
    MissingEventId,
    #[error("action at position {0} has no id")]
    MissingActionId(usize),
    #[error("action id {0} is used more than once")]
    DuplicateActionId(Uuid),
    #[error("action {0} has no name")]
    EmptyActionName(Uuid),
    #[error("action {0} needs an email field")]
    MissingEmailField(Uuid),
    #[error("action {0} has an invalid webhook url: {1}")]
    InvalidWebhookUrl(Uuid, String),
    #[error("action {0} must expire at least one hour after the run")]
    InvalidExpiry(Uuid),
}

/// An automation rule: one trigger and the ordered actions it fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfiguration {
    #[serde(default)]
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "eventID")]
    pub event_id: Uuid,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    pub event: PipelineEvent,
    #[serde(default)]
    pub actions: Vec<PipelineAction>,
    #[serde(default)]
    pub enabled: bool,
}

impl PipelineConfiguration {
    pub fn action(&self, action_id: Uuid) -> Option<&PipelineAction> {
        self.actions.iter().find(|action| action.id == action_id)
    }

    /// Gives every action without an id a fresh one. Existing ids are kept.
    /// Returns how many ids were assigned.
    pub fn assign_action_ids(&mut self) -> usize {
        let mut assigned = 0;

        for action in self.actions.iter_mut().filter(|action| action.id.is_nil()) {
            action.id = Uuid::new_v4();
            assigned += 1;
        }

        assigned
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }

        if self.event_id.is_nil() {
            return Err(ValidationError::MissingEventId);
        }

        let mut seen = HashSet::new();

        for (position, action) in self.actions.iter().enumerate() {
            if action.id.is_nil() {
                return Err(ValidationError::MissingActionId(position));
            }

            if !seen.insert(action.id) {
                return Err(ValidationError::DuplicateActionId(action.id));
            }

            if action.name.trim().is_empty() {
                return Err(ValidationError::EmptyActionName(action.id));
            }

            match &action.kind {
                ActionKind::SendEmail { email_field_id, .. }
                | ActionKind::AllowFormAccess { email_field_id, .. }
                    if email_field_id.trim().is_empty() =>
                {
                    return Err(ValidationError::MissingEmailField(action.id));
                }
                ActionKind::AllowFormAccess {
                    expires_in_hours: Some(0),
                    ..
                } => return Err(ValidationError::InvalidExpiry(action.id)),
                ActionKind::Webhook { url, .. } if !is_http_url(url) => {
                    return Err(ValidationError::InvalidWebhookUrl(action.id, url.clone()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn is_http_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|host| !host.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtos::HttpMethod;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn pipeline(actions: Vec<PipelineAction>) -> PipelineConfiguration {
        PipelineConfiguration {
            id: Uuid::new_v4(),
            name: "Welcome flow".to_string(),
            event_id: Uuid::new_v4(),
            updated_at: Utc::now(),
            event: PipelineEvent::FormSubmission {
                on_form_id: Uuid::new_v4(),
            },
            actions,
            enabled: true,
        }
    }

    fn webhook(url: &str) -> PipelineAction {
        PipelineAction::new(
            "Notify",
            ActionKind::Webhook {
                url: url.to_string(),
                method: HttpMethod::Post,
                headers: BTreeMap::new(),
            },
        )
    }

    #[test]
    fn test_assign_action_ids_keeps_existing() {
        let mut config = pipeline(vec![webhook("https://a.example.com"), webhook("https://b.example.com")]);
        let kept = config.actions[0].id;
        config.actions[1].id = Uuid::nil();

        assert_eq!(config.assign_action_ids(), 1);
        assert_eq!(config.actions[0].id, kept);
        assert!(!config.actions[1].id.is_nil());
        assert_eq!(config.assign_action_ids(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(pipeline(vec![webhook("https://example.com")]).validate().is_ok());

        let mut config = pipeline(vec![webhook("https://example.com")]);
        config.name = "  ".to_string();
        assert_eq!(config.validate(), Err(ValidationError::EmptyName));

        let mut config = pipeline(vec![webhook("https://example.com")]);
        config.actions[0].id = Uuid::nil();
        assert_eq!(config.validate(), Err(ValidationError::MissingActionId(0)));

        let mut config = pipeline(vec![webhook("https://a.example.com"), webhook("https://b.example.com")]);
        config.actions[1].id = config.actions[0].id;
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateActionId(config.actions[0].id))
        );

        for url in ["ftp://example.com", "http://", "example.com/hooks"] {
            let config = pipeline(vec![webhook(url)]);
            assert!(matches!(
                config.validate(),
                Err(ValidationError::InvalidWebhookUrl(_, _))
            ));
        }
        assert_eq!(pipeline(vec![webhook("https://example.com/hooks")]).validate(), Ok(()));

        let config = pipeline(vec![PipelineAction::new(
            "Grant",
            ActionKind::AllowFormAccess {
                to_form_id: Uuid::new_v4(),
                email_field_id: "email".to_string(),
                expires_in_hours: Some(0),
            },
        )]);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidExpiry(_))));
    }

    #[test]
    fn test_decode_defaults() {
        let event_id = Uuid::new_v4();
        let form_id = Uuid::new_v4();

        let config: PipelineConfiguration = serde_json::from_value(json!({
            "name": "Accepted",
            "eventID": event_id,
            "event": { "type": "FormSubmission", "onFormID": form_id },
        }))
        .unwrap();

        assert!(config.id.is_nil());
        assert!(config.actions.is_empty());
        assert!(!config.enabled);
        assert_eq!(config.event.form_id(), form_id);
    }
}
