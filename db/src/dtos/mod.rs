mod action_message;
mod comparison;
mod event_resources;
mod pipeline_action;
mod pipeline_configuration;
mod pipeline_event;
mod pipeline_run;

pub use action_message::*;
pub use comparison::*;
pub use event_resources::*;
pub use pipeline_action::*;
pub use pipeline_configuration::*;
pub use pipeline_event::*;
pub use pipeline_run::*;

/// Form field values captured when a pipeline fired, keyed by field id.
pub type TriggerData = serde_json::Map<String, serde_json::Value>;
