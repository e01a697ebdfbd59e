//! # rmq-loadgen
//!
//! RabbitMQ load generator. Provisions a throwaway topology of direct
//! exchanges, quorum queues, and routing-key bindings, drives it with
//! concurrent producers and consumers for a bounded duration, then prints
//! throughput and duplication statistics and tears everything down.
//!
//! The binding scheme is deliberate amplification: every queue is bound to
//! every exchange under every routing key, so a single publish fans out to
//! one delivery per queue. The duplication factor in the final report
//! measures exactly that amplification.

pub mod assign;
pub mod broker;
pub mod config;
pub mod consumer;
pub mod counters;
pub mod lifecycle;
pub mod producer;
pub mod reclaim;
pub mod stats;
pub mod topology;

mod amqp;

pub use amqp::{AmqpBroker, TlsMaterial};
