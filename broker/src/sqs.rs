use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_lambda_events::event::sqs::{BatchItemFailure, SqsBatchResponse, SqsEvent};
use lambda_runtime::{service_fn, LambdaEvent};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{BrokerConfig, BrokerError, BrokerType, Consumer, MessageHandler, Producer, TopicMessage};

pub struct SqsProducer {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsProducer {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let region = config
            .sqs_aws_region
            .clone()
            .ok_or(BrokerError::MissingConfig("SQS_AWS_REGION", BrokerType::Sqs))?;
        let queue_url = config
            .sqs_queue_url
            .clone()
            .ok_or(BrokerError::MissingConfig("SQS_QUEUE_URL", BrokerType::Sqs))?;

        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        Ok(Self {
            client: aws_sdk_sqs::Client::new(&shared_config),
            queue_url,
        })
    }
}

#[async_trait]
impl Producer for SqsProducer {
    async fn produce(&self, message: &TopicMessage) -> Result<(), BrokerError> {
        let body = String::from_utf8(message.payload.clone())
            .map_err(|error| BrokerError::Sqs(format!("message body is not UTF-8: {error}")))?;

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        if self.queue_url.ends_with(".fifo") {
            if let Some(key) = &message.key {
                request = request.message_group_id(key);
            }
        }

        let output = request
            .send()
            .await
            .map_err(|error| BrokerError::Sqs(error.to_string()))?;

        debug!("Sent SQS message {:?}", output.message_id());

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Lambda-driven consumer. Each invocation carries one batch; the response
/// names the records that failed so that only those are redelivered.
pub struct SqsConsumer;

#[async_trait(?Send)]
impl Consumer for SqsConsumer {
    async fn consume(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        info!("Waiting for SQS batches from the Lambda runtime");

        let service = service_fn(move |event: LambdaEvent<SqsEvent>| {
            let handler = handler.clone();

            async move {
                Ok::<SqsBatchResponse, lambda_runtime::Error>(
                    handle_event(handler.as_ref(), event.payload).await,
                )
            }
        });

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("SQS consumer stopped");
                Ok(())
            }
            result = lambda_runtime::run(service) => {
                result.map_err(|error| BrokerError::Lambda(error.to_string()))
            }
        }
    }
}

/// Feeds every record of one batch to `handler`, in order.
pub async fn handle_event(handler: &dyn MessageHandler, event: SqsEvent) -> SqsBatchResponse {
    let mut response = SqsBatchResponse::default();

    for record in event.records {
        let Some(message_id) = record.message_id else {
            error!("SQS record without a message id, it cannot be reported as failed");
            continue;
        };
        let body = record.body.unwrap_or_default();

        if let Err(error) = handler.handle_message(body.as_bytes()).await {
            warn!("SQS message {message_id} was not processed: {error}");

            let mut failure = BatchItemFailure::default();
            failure.item_identifier = message_id;
            response.batch_item_failures.push(failure);
        }
    }

    response
}
