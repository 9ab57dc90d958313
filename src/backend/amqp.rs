//! AMQP result backend.
//!
//! One durable, auto-delete queue per task UUID, bound to the configured
//! exchange under the UUID as routing key, with a message TTL of
//! `results_expire_in`. Works with nothing but the broker already in the
//! deployment, but creates a queue per task — fine for hundreds of
//! concurrent tasks, pathological beyond a few thousand. Use the memcache
//! backend at scale.

use super::error::{BackendError, Result};
use super::Backend;
use crate::config::Config;
use crate::core::TaskState;
use async_trait::async_trait;
use lapin::options::{
    BasicGetOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::debug;

/// AMQP delivery mode for messages that survive a broker restart.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// The AMQP result backend.
pub struct AmqpBackend {
    config: Config,
}

impl AmqpBackend {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    async fn open(&self) -> Result<(Connection, Channel)> {
        let connection =
            Connection::connect(&self.config.broker, ConnectionProperties::default())
                .await
                .map_err(|e| BackendError::Transport(format!("dial: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BackendError::Transport(format!("channel: {e}")))?;

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
            .map_err(|e| BackendError::Transport(format!("exchange declare: {e}")))?;

        Ok((connection, channel))
    }

    async fn close(connection: Connection, channel: Channel) {
        if let Err(e) = channel.close(200, "bye").await {
            debug!("channel close: {}", e);
        }
        if let Err(e) = connection.close(200, "bye").await {
            debug!("connection close: {}", e);
        }
    }

    /// Declares the per-task state queue and binds it under the UUID.
    async fn declare_state_queue(&self, channel: &Channel, task_uuid: &str) -> Result<()> {
        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-message-ttl".into(),
            AMQPValue::LongLongInt((self.config.results_expire_in as i64) * 1000),
        );

        channel
            .queue_declare(
                task_uuid,
                QueueDeclareOptions {
                    durable: true,
                    auto_delete: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map_err(|e| BackendError::Transport(format!("queue declare: {e}")))?;

        channel
            .queue_bind(
                task_uuid,
                &self.config.exchange,
                task_uuid,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BackendError::Transport(format!("queue bind: {e}")))?;

        Ok(())
    }

    async fn publish_state(&self, channel: &Channel, state: &TaskState) -> Result<()> {
        let payload = serde_json::to_vec(state)?;
        channel
            .basic_publish(
                &self.config.exchange,
                &state.task_uuid,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT),
            )
            .await
            .map_err(|e| BackendError::Transport(format!("publish: {e}")))?
            .await
            .map_err(|e| BackendError::Transport(format!("publish confirm: {e}")))?;
        Ok(())
    }
}

fn exchange_kind(exchange_type: &str) -> ExchangeKind {
    match exchange_type {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "topic" => ExchangeKind::Topic,
        "headers" => ExchangeKind::Headers,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

#[async_trait]
impl Backend for AmqpBackend {
    async fn set_state(&self, state: &TaskState) -> Result<()> {
        let (connection, channel) = self.open().await?;

        let result = async {
            self.declare_state_queue(&channel, &state.task_uuid).await?;
            debug!("storing state {} for task {}", state.state, state.task_uuid);
            self.publish_state(&channel, state).await
        }
        .await;

        Self::close(connection, channel).await;
        result
    }

    async fn get_state(&self, task_uuid: &str) -> Result<TaskState> {
        let (connection, channel) = self.open().await?;

        let result = async {
            self.declare_state_queue(&channel, task_uuid).await?;

            // Drain the queue keeping the newest record; writes are FIFO,
            // so the last message wins.
            let mut latest: Option<Vec<u8>> = None;
            loop {
                let message = channel
                    .basic_get(
                        task_uuid,
                        BasicGetOptions {
                            no_ack: true,
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| BackendError::Transport(format!("get: {e}")))?;
                match message {
                    Some(message) => latest = Some(message.delivery.data),
                    None => break,
                }
            }

            let Some(payload) = latest else {
                return Ok(TaskState::pending(task_uuid));
            };
            let state: TaskState = serde_json::from_slice(&payload)?;

            // The drain consumed the record; put the freshest one back so
            // later reads still observe it.
            self.publish_state(&channel, &state).await?;
            Ok(state)
        }
        .await;

        Self::close(connection, channel).await;
        result
    }

    async fn purge_state(&self, task_uuid: &str) -> Result<()> {
        let (connection, channel) = self.open().await?;

        let result = channel
            .queue_delete(task_uuid, QueueDeleteOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BackendError::Transport(format!("queue delete: {e}")));

        Self::close(connection, channel).await;
        result
    }
}
