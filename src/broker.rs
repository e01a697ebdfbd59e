//! Broker abstraction.
//!
//! The load generator only needs the primitive AMQP 0-9-1 operations:
//! declare, bind/unbind, publish, consume, purge, delete. Everything above
//! `src/amqp.rs` programs against this trait, which keeps the workers and
//! the lifecycle controller testable against the in-memory mock below.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// Stream of delivered message payloads for one subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connect to broker: {0}")]
    Connect(String),
    #[error("open channel: {0}")]
    Channel(String),
    #[error("declare {entity}: {reason}")]
    Declare { entity: String, reason: String },
    #[error("bind {queue} to {exchange} with key {routing_key}: {reason}")]
    Bind {
        queue: String,
        exchange: String,
        routing_key: String,
        reason: String,
    },
    #[error("unbind {queue} from {exchange} with key {routing_key}: {reason}")]
    Unbind {
        queue: String,
        exchange: String,
        routing_key: String,
        reason: String,
    },
    #[error("publish to {exchange} with key {routing_key}: {reason}")]
    Publish {
        exchange: String,
        routing_key: String,
        reason: String,
    },
    #[error("consume from {queue}: {reason}")]
    Consume { queue: String, reason: String },
    #[error("purge {queue}: {reason}")]
    Purge { queue: String, reason: String },
    #[error("delete {entity}: {reason}")]
    Delete { entity: String, reason: String },
}

/// Primitive broker operations used by the load generator.
///
/// `open_channel` hands out an independent channel over the same connection
/// so that each worker task gets its own wire-level session.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn Broker>, BrokerError>;

    /// Declares a durable direct exchange.
    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError>;

    /// Declares a durable queue (quorum type where the broker supports it).
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Publishes non-mandatory, non-immediate on a confirm-capable channel.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError>;

    /// Subscribes in push mode with auto-acknowledgement under the given
    /// prefetch limit.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, BrokerError>;

    /// Removes all ready messages from the queue, returning how many.
    async fn purge_queue(&self, queue: &str) -> Result<u64, BrokerError>;

    /// Deletes the queue, returning the number of messages it still held.
    async fn delete_queue(&self, queue: &str) -> Result<u64, BrokerError>;

    async fn delete_exchange(&self, name: &str) -> Result<(), BrokerError>;
}
