use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{BrokerError, Consumer, MessageHandler, Producer, TopicMessage};

/// Single-process queue implementing both sides of the broker. Messages a
/// handler rejects go back to the end of the queue.
#[derive(Default)]
pub struct InMemoryBroker {
    queue: Mutex<VecDeque<TopicMessage>>,
    produced: Mutex<Vec<TopicMessage>>,
    notify: Notify,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message ever produced, in order.
    pub async fn produced(&self) -> Vec<TopicMessage> {
        self.produced.lock().await.clone()
    }

    pub async fn pending(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Pushes a raw payload straight onto the queue, bypassing `produce`.
    pub async fn inject(&self, message: TopicMessage) {
        self.queue.lock().await.push_back(message);
        self.notify.notify_one();
    }

    /// Delivers each message queued right now exactly once and returns how
    /// many were acknowledged.
    pub async fn drain(&self, handler: &dyn MessageHandler) -> usize {
        let batch: Vec<_> = self.queue.lock().await.drain(..).collect();
        let mut acked = 0;

        for message in batch {
            if self.deliver(handler, message).await {
                acked += 1;
            }
        }

        acked
    }

    async fn deliver(&self, handler: &dyn MessageHandler, message: TopicMessage) -> bool {
        match handler.handle_message(&message.payload).await {
            Ok(()) => true,
            Err(error) => {
                warn!("Message was not processed, requeueing: {error}");
                self.queue.lock().await.push_back(message);
                false
            }
        }
    }
}

#[async_trait]
impl Producer for InMemoryBroker {
    async fn produce(&self, message: &TopicMessage) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }

        self.produced.lock().await.push(message.clone());
        self.inject(message.clone()).await;

        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Release);

        Ok(())
    }
}

#[async_trait(?Send)]
impl Consumer for InMemoryBroker {
    async fn consume(
        &self,
        cancel: CancellationToken,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BrokerError> {
        while !cancel.is_cancelled() {
            let next = self.queue.lock().await.pop_front();

            match next {
                Some(message) => {
                    if !self.deliver(handler.as_ref(), message).await {
                        tokio::task::yield_now().await;
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HandlerError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct FlakyHandler {
        calls: AtomicUsize,
        delivered: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl MessageHandler for FlakyHandler {
        async fn handle_message(&self, payload: &[u8]) -> Result<(), HandlerError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(HandlerError::new("first delivery fails"));
            }

            self.delivered.lock().await.push(payload.to_vec());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_rejected_message_is_redelivered() {
        let broker = InMemoryBroker::new();
        let handler = FlakyHandler::default();

        broker.produce(&TopicMessage::new(b"one".to_vec())).await.unwrap();
        broker.produce(&TopicMessage::keyed("run", b"two".to_vec())).await.unwrap();

        assert_eq!(broker.drain(&handler).await, 1);
        assert_eq!(broker.pending().await, 1);
        assert_eq!(broker.drain(&handler).await, 1);
        assert_eq!(broker.pending().await, 0);

        let delivered = handler.delivered.lock().await.clone();
        assert_eq!(delivered, vec![b"two".to_vec(), b"one".to_vec()]);
        assert_eq!(broker.produced().await.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_producer_rejects() {
        let broker = InMemoryBroker::new();
        broker.close().await.unwrap();

        let result = broker.produce(&TopicMessage::new(Vec::new())).await;

        assert!(matches!(result, Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn test_consume_until_cancelled() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(FlakyHandler::default());
        let cancel = CancellationToken::new();

        broker.produce(&TopicMessage::new(b"a".to_vec())).await.unwrap();
        broker.produce(&TopicMessage::new(b"b".to_vec())).await.unwrap();

        let stopper = cancel.clone();
        let watched = handler.clone();
        tokio::spawn(async move {
            while watched.delivered.lock().await.len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            stopper.cancel();
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            broker.consume(cancel, handler.clone()),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(broker.pending().await, 0);
    }
}
