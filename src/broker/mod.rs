//! Message broker abstraction.
//!
//! A [`Broker`] moves encoded [`TaskSignature`]s between producers and
//! workers. Transports are pluggable behind the trait; the reference
//! transport is AMQP ([`AmqpBroker`]), and an in-process transport
//! ([`InMemoryBroker`]) serves single-process deployments and tests.
//!
//! Every transport implementation upholds the same contract:
//!
//! 1. at most a small, fixed number of un-acked deliveries in flight
//!    (backpressure);
//! 2. a delivery is acked only after its signature decoded and was handed
//!    to the processor; malformed payloads are nacked without requeue;
//! 3. consume faults report whether retrying makes sense
//!    ([`BrokerError::is_retryable`]);
//! 4. published messages are persistent and `application/json`-typed where
//!    the transport supports it;
//! 5. [`Broker::stop_consuming`] stops the consume loop at its next
//!    suspension point, after any in-flight task finished, and releases
//!    transport resources on every exit path.

mod amqp;
mod error;
mod memory;

pub use amqp::AmqpBroker;
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;

use crate::core::TaskSignature;
use async_trait::async_trait;
use std::sync::Arc;

/// A common interface for all broker transports.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a signature.
    ///
    /// Assigns a UUID iff the signature carries none and fills in the
    /// routing key per the exchange rules before encoding, mutating the
    /// caller's signature so both survive for result lookup.
    async fn publish(&self, signature: &mut TaskSignature) -> Result<()>;

    /// Enters the consume loop, handing each decoded delivery to the
    /// processor, until [`stop_consuming`](Broker::stop_consuming) is
    /// called or a fault occurs. Whether a fault is worth retrying is
    /// reported via [`BrokerError::is_retryable`].
    async fn start_consuming(
        &self,
        consumer_tag: &str,
        processor: Arc<dyn TaskProcessor>,
    ) -> Result<()>;

    /// Requests the consume loop to exit at its next suspension point.
    /// In-flight deliveries finish (and ack) before the loop returns.
    fn stop_consuming(&self);
}

/// Can process a delivered task. This will almost always be a
/// [`Worker`](crate::worker::Worker).
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Processes one decoded delivery to completion.
    ///
    /// Never fails the delivery: every outcome is recorded in the result
    /// backend and, where configured, fanned out to continuations.
    async fn process(&self, signature: TaskSignature);
}
