use db::dtos::ActionType;
use db::EventResourceStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::handlers::{
    ActionError, ActionHandler, AllowFormAccessHandler, Mailer, SendEmailHandler, WebhookHandler,
};

/// Maps each action type to the handler that executes it. Fixed once built.
pub struct HandlerRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistryBuilder {
    /// Registers `handler` for `action_type`, replacing any earlier one.
    pub fn register(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.insert(action_type, handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// The registry with a handler for every action type.
    pub fn standard(
        store: Arc<dyn EventResourceStore>,
        mailer: Arc<dyn Mailer>,
        webhook_timeout: Duration,
    ) -> Result<Self, ActionError> {
        Ok(Self::builder()
            .register(
                ActionType::SendEmail,
                Arc::new(SendEmailHandler::new(store.clone(), mailer)),
            )
            .register(
                ActionType::AllowFormAccess,
                Arc::new(AllowFormAccessHandler::new(store)),
            )
            .register(
                ActionType::Webhook,
                Arc::new(WebhookHandler::new(webhook_timeout)?),
            )
            .build())
    }

    pub fn get(&self, action_type: ActionType) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::SmtpMailer;
    use db::MemoryStore;

    #[test]
    fn test_standard_registry_covers_every_type() {
        let registry = HandlerRegistry::standard(
            Arc::new(MemoryStore::new()),
            Arc::new(SmtpMailer),
            Duration::from_secs(10),
        )
        .unwrap();

        assert_eq!(registry.len(), ActionType::ALL.len());
        for action_type in ActionType::ALL {
            assert!(registry.get(action_type).is_some(), "{action_type} missing");
        }
    }

    #[test]
    fn test_builder_registers_only_given_types() {
        let registry = HandlerRegistry::builder()
            .register(
                ActionType::AllowFormAccess,
                Arc::new(AllowFormAccessHandler::new(Arc::new(MemoryStore::new()))),
            )
            .build();

        assert_eq!(registry.len(), 1);
        assert!(registry.get(ActionType::SendEmail).is_none());
        assert!(registry.get(ActionType::AllowFormAccess).is_some());
    }
}
