//! AMQP reference transport.
//!
//! Publishing opens a fresh connection per message, which keeps publishing
//! trivially thread-safe at the cost of a connection handshake; deployments
//! that publish at volume should front this with their own pooling.
//! Consuming declares a durable exchange and queue, binds them under the
//! configured binding key, caps un-acked deliveries at a small prefetch
//! window, and hands decoded signatures to the processor one at a time.

use super::error::{BrokerError, Result};
use super::{Broker, TaskProcessor};
use crate::config::Config;
use crate::core::TaskSignature;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum un-acked deliveries in flight per consumer.
const PREFETCH_COUNT: u16 = 3;

/// AMQP delivery mode for messages that survive a broker restart.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Maps a configured exchange type onto the protocol exchange kind.
fn exchange_kind(exchange_type: &str) -> ExchangeKind {
    match exchange_type {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// The AMQP broker transport.
pub struct AmqpBroker {
    config: Config,
    stop: Mutex<CancellationToken>,
}

impl AmqpBroker {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stop: Mutex::new(CancellationToken::new()),
        }
    }

    /// Dials the broker, opens a channel, declares the exchange and the
    /// default queue, and binds them. Faults here are connection-class and
    /// therefore retryable.
    async fn open(&self) -> Result<(Connection, Channel)> {
        let connection =
            Connection::connect(&self.config.broker, ConnectionProperties::default())
                .await
                .map_err(|e| BrokerError::Transport(format!("dial: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Transport(format!("channel: {e}")))?;

        channel
            .exchange_declare(
                &self.config.exchange,
                exchange_kind(&self.config.exchange_type),
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Transport(format!("exchange declare: {e}")))?;

        channel
            .queue_declare(
                &self.config.default_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Transport(format!("queue declare: {e}")))?;

        channel
            .queue_bind(
                &self.config.default_queue,
                &self.config.exchange,
                &self.config.binding_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Transport(format!("queue bind: {e}")))?;

        Ok((connection, channel))
    }

    /// Releases the channel and connection. Close failures on teardown
    /// paths are logged, not propagated.
    async fn close(connection: Connection, channel: Channel) {
        if let Err(e) = channel.close(200, "bye").await {
            debug!("channel close: {}", e);
        }
        if let Err(e) = connection.close(200, "bye").await {
            debug!("connection close: {}", e);
        }
    }

    /// Replaces the stop token so a stopped broker can consume again.
    fn reset_stop_token(&self) -> CancellationToken {
        let mut guard = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = CancellationToken::new();
        guard.clone()
    }

    async fn consume(
        &self,
        channel: &Channel,
        consumer_tag: &str,
        processor: Arc<dyn TaskProcessor>,
        stop: CancellationToken,
    ) -> Result<()> {
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Protocol(format!("channel qos: {e}")))?;

        let mut consumer = channel
            .basic_consume(
                &self.config.default_queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Protocol(format!("queue consume: {e}")))?;

        info!("consumer {} waiting for messages", consumer_tag);

        loop {
            let delivery = tokio::select! {
                biased;

                _ = stop.cancelled() => {
                    info!("consumer {} stopping", consumer_tag);
                    return Ok(());
                }

                delivery = consumer.next() => delivery,
            };

            let delivery = match delivery {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    return Err(BrokerError::Transport(format!("delivery: {e}")))
                }
                None => {
                    return Err(BrokerError::Transport(
                        "consumer stream closed".to_string(),
                    ))
                }
            };

            match serde_json::from_slice::<TaskSignature>(&delivery.data) {
                Err(e) => {
                    // Redelivery cannot fix malformed bytes. A nack that
                    // fails because the transport is gone is dropped
                    // silently.
                    warn!("dropping malformed message: {}", e);
                    let _ = delivery
                        .nack(BasicNackOptions {
                            requeue: false,
                            ..Default::default()
                        })
                        .await;
                }
                Ok(signature) => {
                    delivery
                        .ack(BasicAckOptions::default())
                        .await
                        .map_err(|e| BrokerError::Transport(format!("ack: {e}")))?;
                    processor.process(signature).await;
                }
            }
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn publish(&self, signature: &mut TaskSignature) -> Result<()> {
        let (connection, channel) = self.open().await?;

        signature.ensure_uuid();
        signature.adjust_routing_key(
            &self.config.exchange_type,
            &self.config.binding_key,
            &self.config.default_queue,
        );

        let publish_result = async {
            let payload = serde_json::to_vec(signature)?;
            channel
                .basic_publish(
                    &self.config.exchange,
                    &signature.routing_key,
                    BasicPublishOptions::default(),
                    &payload,
                    BasicProperties::default()
                        .with_content_type("application/json".into())
                        .with_delivery_mode(DELIVERY_MODE_PERSISTENT),
                )
                .await
                .map_err(|e| BrokerError::Transport(format!("publish: {e}")))?
                .await
                .map_err(|e| BrokerError::Transport(format!("publish confirm: {e}")))?;
            debug!("published task {} to {}", signature.uuid, signature.routing_key);
            Ok(())
        }
        .await;

        Self::close(connection, channel).await;
        publish_result
    }

    async fn start_consuming(
        &self,
        consumer_tag: &str,
        processor: Arc<dyn TaskProcessor>,
    ) -> Result<()> {
        let stop = self.reset_stop_token();
        let (connection, channel) = self.open().await?;

        let consume_result = self
            .consume(&channel, consumer_tag, processor, stop)
            .await;

        Self::close(connection, channel).await;
        consume_result
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

    #[test]
    fn test_exchange_kind_mapping() {
        assert!(matches!(exchange_kind("direct"), ExchangeKind::Direct));
        assert!(matches!(exchange_kind("fanout"), ExchangeKind::Fanout));
        assert!(matches!(exchange_kind("topic"), ExchangeKind::Topic));
        assert!(matches!(exchange_kind("x-delayed"), ExchangeKind::Custom(_)));
    }
}
