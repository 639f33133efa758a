mod allow_form_access;
mod send_email;
mod webhook;

pub use allow_form_access::AllowFormAccessHandler;
pub use send_email::{compose_email, Mailer, OutgoingEmail, SendEmailHandler, SmtpMailer};
pub use webhook::WebhookHandler;

use async_trait::async_trait;
use db::dtos::{ActionMessage, ActionType, TriggerData};
use db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("event secrets not found")]
    RequiredSecretNotFound,
    #[error("email template not found")]
    EmailTemplateNotFound,
    #[error("no email found in the form data")]
    NoToEmailFound,
    #[error("invalid email address {0:?}: {1}")]
    InvalidAddress(String, String),
    #[error("failed to send email: {0}")]
    Smtp(String),
    #[error("webhook responded with status {0}")]
    WebhookStatus(u16),
    #[error("webhook request failed: {0}")]
    WebhookTransport(#[from] reqwest::Error),
    #[error("invalid action type for {0} handler")]
    WrongActionType(ActionType),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes one kind of action. Handlers are shared between concurrently
/// processed messages and hold no per-message state.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle_action(&self, action: &ActionMessage) -> Result<(), ActionError>;
}

/// Reads the recipient address out of the trigger-time form data.
pub(crate) fn resolve_email(data: &TriggerData, field_id: &str) -> Result<String, ActionError> {
    data.get(field_id)
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|email| !email.is_empty())
        .map(str::to_string)
        .ok_or(ActionError::NoToEmailFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_email() {
        let data = json!({"email": " ada@example.com ", "age": 36, "blank": ""})
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(resolve_email(&data, "email").unwrap(), "ada@example.com");
        assert!(matches!(
            resolve_email(&data, "age"),
            Err(ActionError::NoToEmailFound)
        ));
        assert!(matches!(
            resolve_email(&data, "blank"),
            Err(ActionError::NoToEmailFound)
        ));
        assert!(matches!(
            resolve_email(&data, "missing"),
            Err(ActionError::NoToEmailFound)
        ));
    }
}
