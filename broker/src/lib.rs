mod config;
mod error;
mod kafka;
mod memory;
mod nats;
mod sqs;

pub use config::*;
pub use error::{BrokerError, HandlerError};
pub use kafka::{KafkaConsumer, KafkaProducer};
pub use memory::InMemoryBroker;
pub use nats::{NatsConsumer, NatsProducer};
pub use sqs::{handle_event as handle_sqs_event, SqsConsumer, SqsProducer};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A message as handed to a transport. The key only influences placement
/// (Kafka partition); consumers never see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

impl TopicMessage {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { key: None, payload }
    }

    pub fn keyed(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: Some(key.into()),
            payload,
        }
    }
}

#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, message: &TopicMessage) -> Result<(), BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Processes one delivered payload. Returning an error leaves the message
/// unacknowledged so the transport delivers it again.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

#[async_trait(?Send)]
pub trait Consumer {
    /// Runs until `cancel` fires. A message that is already being handled is
    /// always finished before returning.
    async fn consume(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError>;
}

pub async fn connect_producer(config: &BrokerConfig) -> Result<Arc<dyn Producer>, BrokerError> {
    config.validate()?;
    info!("Connecting {} producer", config.broker_type);

    let producer: Arc<dyn Producer> = match config.broker_type {
        BrokerType::Kafka => Arc::new(KafkaProducer::new(config)?),
        BrokerType::Sqs => Arc::new(SqsProducer::connect(config).await?),
        BrokerType::Nats => Arc::new(NatsProducer::connect(config).await?),
    };

    Ok(producer)
}

pub async fn connect_consumer(config: &BrokerConfig) -> Result<Box<dyn Consumer>, BrokerError> {
    config.validate()?;
    info!("Connecting {} consumer", config.broker_type);

    let consumer: Box<dyn Consumer> = match config.broker_type {
        BrokerType::Kafka => Box::new(KafkaConsumer::new(config)?),
        BrokerType::Sqs => Box::new(SqsConsumer),
        BrokerType::Nats => Box::new(NatsConsumer::connect(config).await?),
    };

    Ok(consumer)
}
