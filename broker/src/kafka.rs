use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as _, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::Offset;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{BrokerConfig, BrokerError, Consumer, MessageHandler, Producer, TopicMessage};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaProducer {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", config.kafka_broker_urls.join(","))
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.send.max.retries", "5")
            .create()?;

        Ok(Self {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(&self, message: &TopicMessage) -> Result<(), BrokerError> {
        let mut record = FutureRecord::<str, [u8]>::to(&self.topic).payload(&message.payload);

        if let Some(key) = &message.key {
            record = record.key(key.as_str());
        }

        let (partition, offset) = self
            .producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(error, _)| BrokerError::Kafka(error))?;

        debug!("Produced message to {} [{partition}] at offset {offset}", self.topic);

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.producer.flush(FLUSH_TIMEOUT)?;

        Ok(())
    }
}

/// Consumer-group member. Offsets are committed only after the handler
/// succeeds; a failed message is sought back to and retried.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaConsumer {
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.kafka_broker_urls.join(","))
            .set("group.id", &config.kafka_consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("partition.assignment.strategy", "roundrobin")
            .create()?;

        consumer.subscribe(&[config.kafka_topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait(?Send)]
impl Consumer for KafkaConsumer {
    async fn consume(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        info!("Consuming topic {}", self.topic);

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = self.consumer.recv() => message,
            };

            let message = match message {
                Ok(message) => message,
                Err(error) => {
                    error!("Failed to receive Kafka message: {error:?}");
                    if !back_off(&cancel).await {
                        break;
                    }
                    continue;
                }
            };

            let payload = message.payload().unwrap_or_default();

            match handler.handle_message(payload).await {
                Ok(()) => {
                    if let Err(error) = self.consumer.commit_message(&message, CommitMode::Async) {
                        error!("Failed to commit offset {}: {error:?}", message.offset());
                    }
                }
                Err(error) => {
                    warn!(
                        "Message at {} [{}] offset {} was not processed, retrying: {error}",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    );

                    if let Err(error) = self.consumer.seek(
                        message.topic(),
                        message.partition(),
                        Offset::Offset(message.offset()),
                        SEND_TIMEOUT,
                    ) {
                        error!("Failed to rewind partition {}: {error:?}", message.partition());
                    }

                    if !back_off(&cancel).await {
                        break;
                    }
                }
            }
        }

        info!("Kafka consumer stopped");

        Ok(())
    }
}

/// Waits out the retry delay. Returns `false` when cancelled first.
async fn back_off(cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(RETRY_DELAY) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_back_off_waits_retry_delay() {
        let started = Instant::now();

        assert!(back_off(&CancellationToken::new()).await);
        assert!(started.elapsed() >= RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_back_off_stops_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Instant::now();

        assert!(!back_off(&cancel).await);
        assert!(started.elapsed() < RETRY_DELAY);
    }
}
