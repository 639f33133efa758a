use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use db::dtos::{ActionMessage, ActionPayload, ActionType, FormAllowedSubmitter};
use db::EventResourceStore;
use std::sync::Arc;
use tracing::{debug, info};

use super::{resolve_email, ActionError, ActionHandler};

/// Grants the submitter of one form access to another, optionally time boxed.
pub struct AllowFormAccessHandler {
    store: Arc<dyn EventResourceStore>,
}

impl AllowFormAccessHandler {
    pub fn new(store: Arc<dyn EventResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for AllowFormAccessHandler {
    async fn handle_action(&self, action: &ActionMessage) -> Result<(), ActionError> {
        let ActionPayload::AllowFormAccess {
            to_form_id,
            email_field_id,
            expires_in_hours,
        } = &action.payload
        else {
            return Err(ActionError::WrongActionType(ActionType::AllowFormAccess));
        };

        let email = resolve_email(&action.data, email_field_id)?;
        let now = Utc::now();

        let submitters = self.store.get_form_allowed_submitters(*to_form_id).await?;
        if submitters
            .iter()
            .any(|submitter| submitter.email == email && submitter.is_active(now))
        {
            debug!("{email} already has access to form {to_form_id}");
            return Ok(());
        }

        let expires_at = expires_in_hours
            .filter(|hours| *hours > 0)
            .map(|hours| now + TimeDelta::hours(i64::from(hours)));

        self.store
            .add_allowed_submitter(*to_form_id, FormAllowedSubmitter { email, expires_at })
            .await?;
        info!("Granted access to form {to_form_id} for run {}", action.pipeline_run_id);

        Ok(())
    }
}
