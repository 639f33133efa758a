use async_nats::jetstream::{self, consumer::pull, consumer::AckPolicy, stream, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{BrokerConfig, BrokerError, BrokerType, Consumer, MessageHandler, Producer, TopicMessage};

fn nats_error(error: impl std::fmt::Display) -> BrokerError {
    BrokerError::Nats(error.to_string())
}

async fn connect_stream(
    config: &BrokerConfig,
) -> Result<(jetstream::Context, stream::Stream), BrokerError> {
    let url = config
        .nats_url
        .clone()
        .ok_or(BrokerError::MissingConfig("NATS_URL", BrokerType::Nats))?;

    let client = async_nats::connect(url).await.map_err(nats_error)?;
    let jetstream = jetstream::new(client);

    let stream = jetstream
        .get_or_create_stream(stream::Config {
            name: config.nats_stream.clone(),
            subjects: vec![config.nats_subject.clone()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        })
        .await
        .map_err(nats_error)?;

    Ok((jetstream, stream))
}

pub struct NatsProducer {
    jetstream: jetstream::Context,
    subject: String,
}

impl NatsProducer {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let (jetstream, _) = connect_stream(config).await?;

        Ok(Self {
            jetstream,
            subject: config.nats_subject.clone(),
        })
    }
}

#[async_trait]
impl Producer for NatsProducer {
    async fn produce(&self, message: &TopicMessage) -> Result<(), BrokerError> {
        self.jetstream
            .publish(self.subject.clone(), message.payload.clone().into())
            .await
            .map_err(nats_error)?
            .await
            .map_err(nats_error)?;

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Durable pull consumer on a work-queue stream; a message is acked only
/// after the handler succeeds and nak'ed otherwise.
pub struct NatsConsumer {
    consumer: jetstream::consumer::PullConsumer,
}

impl NatsConsumer {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let (_, stream) = connect_stream(config).await?;

        let consumer = stream
            .get_or_create_consumer(
                &config.nats_durable,
                pull::Config {
                    durable_name: Some(config.nats_durable.clone()),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(nats_error)?;

        Ok(Self { consumer })
    }
}

#[async_trait(?Send)]
impl Consumer for NatsConsumer {
    async fn consume(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        let mut messages = self.consumer.messages().await.map_err(nats_error)?;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = messages.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(error)) => {
                    error!("Failed to receive NATS message: {error:?}");
                    continue;
                }
                None => break,
            };

            let result = match handler.handle_message(&message.payload).await {
                Ok(()) => message.ack().await,
                Err(error) => {
                    warn!("NATS message on {} was not processed: {error}", message.subject);
                    message.ack_with(AckKind::Nak(None)).await
                }
            };

            if let Err(error) = result {
                error!("Failed to acknowledge NATS message: {error:?}");
            }
        }

        info!("NATS consumer stopped");

        Ok(())
    }
}
