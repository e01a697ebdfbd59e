//! `lapin`-backed broker implementation.
//!
//! One connection is shared by the whole run; every worker task opens its
//! own channel via [`Broker::open_channel`] so publishes and consumes never
//! interleave on the same wire-level session.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, ExchangeDeleteOptions, QueueBindOptions, QueueDeclareOptions,
    QueueDeleteOptions, QueuePurgeOptions,
};
use lapin::tcp::{OwnedIdentity, OwnedTLSConfig};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::warn;

use crate::broker::{Broker, BrokerError, DeliveryStream};

/// TLS material read from disk before connecting.
#[derive(Debug, Default)]
pub struct TlsMaterial {
    /// Extra trusted certificate chain, PEM-encoded.
    pub cert_chain: Option<String>,
    /// Client identity presented during the handshake, PKCS#12-encoded.
    pub identity: Option<Vec<u8>>,
}

impl TlsMaterial {
    fn is_empty(&self) -> bool {
        self.cert_chain.is_none() && self.identity.is_none()
    }
}

fn owned_tls_config(material: TlsMaterial) -> OwnedTLSConfig {
    OwnedTLSConfig {
        identity: material.identity.map(|der| OwnedIdentity {
            der,
            password: String::new(),
        }),
        cert_chain: material.cert_chain,
    }
}

pub struct AmqpBroker {
    connection: Arc<Connection>,
    channel: Channel,
}

impl AmqpBroker {
    /// Connects to the broker and opens the initial channel.
    ///
    /// `uri` is a full `amqp://` or `amqps://` URI including credentials
    /// and vhost. `tls` only matters for `amqps://`; when empty, the
    /// platform defaults are used.
    pub async fn connect(uri: &str, tls: TlsMaterial) -> Result<Self, BrokerError> {
        let options = ConnectionProperties::default();
        let connection = if tls.is_empty() {
            Connection::connect(uri, options).await
        } else {
            Connection::connect_with_config(uri, options, owned_tls_config(tls)).await
        }
        .map_err(|e| BrokerError::Connect(e.to_string()))?;
        let connection = Arc::new(connection);
        let channel = open_confirm_channel(&connection).await?;
        Ok(Self {
            connection,
            channel,
        })
    }
}

async fn open_confirm_channel(connection: &Arc<Connection>) -> Result<Channel, BrokerError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::Channel(e.to_string()))?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| BrokerError::Channel(e.to_string()))?;
    Ok(channel)
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn open_channel(&self) -> Result<Box<dyn Broker>, BrokerError> {
        let channel = open_confirm_channel(&self.connection).await?;
        Ok(Box::new(AmqpBroker {
            connection: Arc::clone(&self.connection),
            channel,
        }))
    }

    async fn declare_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare {
                entity: name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        let mut args = FieldTable::default();
        args.insert("x-queue-type".into(), AMQPValue::LongString("quorum".into()));
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Declare {
                entity: name.to_string(),
                reason: e.to_string(),
            })
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Bind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn unbind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_unbind(queue, exchange, routing_key, FieldTable::default())
            .await
            .map_err(|e| BrokerError::Unbind {
                queue: queue.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        // Confirm mode is enabled on the channel; individual confirmations
        // are not awaited so one slow ack cannot stall the publish loop.
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map(|_confirm| ())
            .map_err(|e| BrokerError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, BrokerError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        let queue_name = queue.to_string();
        let stream = consumer.filter_map(move |delivery| {
            let queue_name = queue_name.clone();
            async move {
                match delivery {
                    Ok(delivery) => Some(delivery.data),
                    Err(e) => {
                        warn!(queue = %queue_name, error = %e, "delivery failed");
                        None
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn purge_queue(&self, queue: &str) -> Result<u64, BrokerError> {
        let purged = self
            .channel
            .queue_purge(queue, QueuePurgeOptions::default())
            .await
            .map_err(|e| BrokerError::Purge {
                queue: queue.to_string(),
                reason: e.to_string(),
            })?;
        Ok(purged as u64)
    }

    async fn delete_queue(&self, queue: &str) -> Result<u64, BrokerError> {
        let remaining = self
            .channel
            .queue_delete(queue, QueueDeleteOptions::default())
            .await
            .map_err(|e| BrokerError::Delete {
                entity: queue.to_string(),
                reason: e.to_string(),
            })?;
        Ok(remaining as u64)
    }

    async fn delete_exchange(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .exchange_delete(name, ExchangeDeleteOptions::default())
            .await
            .map_err(|e| BrokerError::Delete {
                entity: name.to_string(),
                reason: e.to_string(),
            })
    }
}
