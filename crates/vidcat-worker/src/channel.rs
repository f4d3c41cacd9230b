//! Message channel abstraction.
//!
//! A channel is one logical queue with at-least-once, unordered delivery. A
//! delivery stays in flight until it is acknowledged (consumed for good) or
//! rejected (requeued for another attempt, or dropped).

use async_trait::async_trait;
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Acknowledge failed: {0}")]
    Ack(String),

    #[error("Reject failed: {0}")]
    Reject(String),

    #[error("Unknown delivery: {0}")]
    UnknownDelivery(String),

    #[error("Channel closed")]
    Closed,
}

/// The two lifecycle event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStream {
    Registered,
    Finalized,
}

impl EventStream {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStream::Registered => "registered",
            EventStream::Finalized => "finalized",
        }
    }
}

impl Display for EventStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A received message awaiting ack or reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    /// Handle identifying this particular receipt of the message.
    pub receipt: String,
    pub body: String,
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Wait for the next message. `Ok(None)` means the wait ended empty.
    async fn next_delivery(&self) -> Result<Option<Delivery>, ChannelError>;

    /// Consume the message permanently.
    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Give the message back for redelivery, or drop it when `requeue` is false.
    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError>;
}
