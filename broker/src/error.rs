use thiserror::Error;

use crate::BrokerType;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{0} must be set when MESSAGE_BROKER_TYPE is {1}")]
    MissingConfig(&'static str, BrokerType),
    #[error("unknown message broker type: {0}")]
    UnknownBrokerType(String),
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
    #[error("sqs error: {0}")]
    Sqs(String),
    #[error("nats error: {0}")]
    Nats(String),
    #[error("lambda runtime error: {0}")]
    Lambda(String),
    #[error("producer is closed")]
    Closed,
}

/// Returned by a [`crate::MessageHandler`] when a message must not be
/// acknowledged and should be delivered again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
