//! In-process broker transport.
//!
//! Backs single-process deployments and the integration tests without a
//! RabbitMQ instance. The queue is not shared across processes. The
//! ack/nack/stop contract matches the AMQP transport; counters expose the
//! accounting so tests can assert on it.

use super::error::Result;
use super::{Broker, TaskProcessor};
use crate::config::Config;
use crate::core::TaskSignature;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A message at rest in the queue: the transport-level routing key plus the
/// encoded signature.
#[derive(Debug, Clone)]
struct QueuedMessage {
    routing_key: String,
    payload: Vec<u8>,
}

/// An in-process broker over a notified queue.
pub struct InMemoryBroker {
    config: Config,
    queue: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    stop: Mutex<CancellationToken>,
    acked: AtomicUsize,
    nacked: AtomicUsize,
}

impl InMemoryBroker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            stop: Mutex::new(CancellationToken::new()),
            acked: AtomicUsize::new(0),
            nacked: AtomicUsize::new(0),
        }
    }

    /// Number of messages currently at rest in the queue.
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliveries acknowledged so far.
    pub fn acked(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }

    /// Deliveries rejected (malformed payloads) so far.
    pub fn nacked(&self) -> usize {
        self.nacked.load(Ordering::SeqCst)
    }

    /// Transport-level routing keys of the messages currently queued, in
    /// delivery order.
    pub fn queued_routing_keys(&self) -> Vec<String> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|m| m.routing_key.clone())
            .collect()
    }

    /// Decoded signatures of the messages currently queued, in delivery
    /// order. Malformed payloads are skipped.
    pub fn queued_signatures(&self) -> Vec<TaskSignature> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Enqueues raw bytes, bypassing signature encoding. Lets tests inject
    /// malformed payloads the way a misbehaving producer would.
    pub fn publish_raw(&self, routing_key: impl Into<String>, payload: Vec<u8>) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(QueuedMessage {
                routing_key: routing_key.into(),
                payload,
            });
        self.notify.notify_one();
    }

    fn reset_stop_token(&self) -> CancellationToken {
        let mut guard = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = CancellationToken::new();
        guard.clone()
    }

    async fn next_message(&self) -> QueuedMessage {
        loop {
            {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(message) = queue.pop_front() {
                    if !queue.is_empty() {
                        // Coalesced notifications: keep the consumer awake
                        // while work remains.
                        self.notify.notify_one();
                    }
                    return message;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, signature: &mut TaskSignature) -> Result<()> {
        signature.ensure_uuid();
        signature.adjust_routing_key(
            &self.config.exchange_type,
            &self.config.binding_key,
            &self.config.default_queue,
        );
        let payload = serde_json::to_vec(signature)?;
        debug!("queued task {} to {}", signature.uuid, signature.routing_key);
        self.publish_raw(signature.routing_key.clone(), payload);
        Ok(())
    }

    async fn start_consuming(
        &self,
        consumer_tag: &str,
        processor: Arc<dyn TaskProcessor>,
    ) -> Result<()> {
        let stop = self.reset_stop_token();
        info!("consumer {} waiting for messages", consumer_tag);

        loop {
            let message = tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("consumer {} stopping", consumer_tag);
                    return Ok(());
                }

                message = self.next_message() => message,
            };

            match serde_json::from_slice::<TaskSignature>(&message.payload) {
                Err(e) => {
                    warn!("dropping malformed message: {}", e);
                    self.nacked.fetch_add(1, Ordering::SeqCst);
                }
                Ok(signature) => {
                    self.acked.fetch_add(1, Ordering::SeqCst);
                    processor.process(signature).await;
                }
            }
        }
    }

    fn stop_consuming(&self) {
        self.stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex as AsyncMutex;

    struct Recorder {
        seen: AsyncMutex<Vec<TaskSignature>>,
    }

    #[async_trait]
    impl TaskProcessor for Recorder {
        async fn process(&self, signature: TaskSignature) {
            self.seen.lock().await.push(signature);
        }
    }

    fn broker() -> InMemoryBroker {
        InMemoryBroker::new(Config::default())
    }

    #[tokio::test]
    async fn test_publish_assigns_uuid_and_routing_key() {
        let broker = broker();
        let mut sig = TaskSignature::new("add").arg(1i64);
        broker.publish(&mut sig).await.unwrap();

        assert!(!sig.uuid.is_empty());
        // Default config uses a direct exchange, so the binding key wins.
        assert_eq!(sig.routing_key, Config::default().binding_key);
        assert_eq!(broker.queued_routing_keys(), vec![sig.routing_key.clone()]);
        assert_eq!(broker.pending(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_nacked_and_skipped() {
        let broker = Arc::new(broker());
        broker.publish_raw("q", b"not json".to_vec());
        let mut sig = TaskSignature::new("add");
        broker.publish(&mut sig).await.unwrap();

        let recorder = Arc::new(Recorder {
            seen: AsyncMutex::new(Vec::new()),
        });

        let consumer = {
            let broker = broker.clone();
            let recorder = recorder.clone();
            tokio::spawn(async move { broker.start_consuming("test", recorder).await })
        };

        // Wait until the well-formed signature got through.
        while broker.acked() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        broker.stop_consuming();
        consumer.await.unwrap().unwrap();

        assert_eq!(broker.nacked(), 1);
        assert_eq!(broker.acked(), 1);
        assert_eq!(recorder.seen.lock().await.len(), 1);
    }

    struct GatedProcessor {
        started: tokio::sync::mpsc::UnboundedSender<()>,
        gate: Arc<tokio::sync::Semaphore>,
    }

    #[async_trait]
    impl TaskProcessor for GatedProcessor {
        async fn process(&self, _signature: TaskSignature) {
            let _ = self.started.send(());
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
    }

    #[tokio::test]
    async fn test_stop_mid_queue_leaves_remaining_messages() {
        let broker = Arc::new(broker());
        for _ in 0..3 {
            let mut sig = TaskSignature::new("add");
            broker.publish(&mut sig).await.unwrap();
        }

        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel();
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let processor = Arc::new(GatedProcessor {
            started: started_tx,
            gate: gate.clone(),
        });

        let consumer = {
            let broker = broker.clone();
            tokio::spawn(async move { broker.start_consuming("test", processor).await })
        };

        // Stop while the first delivery is in flight; it must finish, the
        // rest must stay queued.
        started_rx.recv().await.unwrap();
        broker.stop_consuming();
        gate.add_permits(1);
        consumer.await.unwrap().unwrap();

        assert_eq!(broker.acked(), 1);
        assert_eq!(broker.pending(), 2);
    }
}
