pub mod aggregator;
pub mod config;
pub mod handlers;
pub mod processor;
pub mod registry;

pub use aggregator::{apply_outcome, ActionOutcome, AggregateError, RunStatusAggregator};
pub use config::WorkerConfig;
pub use handlers::{ActionError, ActionHandler};
pub use processor::{ActionProcessor, Processed};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
