//! Vidcat Worker
//!
//! Consumes the two lifecycle event streams (asset registered, asset
//! finalized) and folds every message into the catalog through
//! [`vidcat_services::CatalogService`].
//!
//! Channels are pluggable behind [`MessageChannel`]: SQS in production
//! (feature `sqs`, on by default) and an in-process queue for local runs and
//! tests.

mod channel;
mod consumer;
mod memory;
#[cfg(feature = "sqs")]
mod sqs;

use std::sync::Arc;

use anyhow::Context;
use vidcat_core::{ChannelBackend, ChannelConfig};

pub use channel::{ChannelError, Delivery, EventStream, MessageChannel};
pub use consumer::{process_event, ConsumerConfig, Disposition, EventConsumerPool};
pub use memory::InMemoryChannel;
#[cfg(feature = "sqs")]
pub use sqs::{sqs_client, SqsChannel};

/// The registered and finalized channels, in that order.
pub type ChannelPair = (Arc<dyn MessageChannel>, Arc<dyn MessageChannel>);

/// Build both event channels from configuration.
pub async fn create_channels(config: &ChannelConfig) -> anyhow::Result<ChannelPair> {
    config.validate()?;

    match config.backend {
        #[cfg(feature = "sqs")]
        ChannelBackend::Sqs => {
            let registered_url = config
                .registered_queue_url
                .clone()
                .context("SQS_REGISTERED_QUEUE_URL is not set")?;
            let finalized_url = config
                .finalized_queue_url
                .clone()
                .context("SQS_FINALIZED_QUEUE_URL is not set")?;

            let client = sqs_client(config.aws_region.clone()).await;
            tracing::info!(
                registered = %registered_url,
                finalized = %finalized_url,
                "SQS channels initialized"
            );

            Ok((
                Arc::new(SqsChannel::new(
                    client.clone(),
                    EventStream::Registered.as_str(),
                    registered_url,
                    config.wait_time_seconds,
                )),
                Arc::new(SqsChannel::new(
                    client,
                    EventStream::Finalized.as_str(),
                    finalized_url,
                    config.wait_time_seconds,
                )),
            ))
        }
        #[cfg(not(feature = "sqs"))]
        ChannelBackend::Sqs => Err(anyhow::anyhow!(
            "SQS channel requested but the sqs feature is not enabled"
        )),
        ChannelBackend::Memory => {
            tracing::warn!("Using in-memory channels; nothing outside this process can publish");
            Ok((
                Arc::new(InMemoryChannel::new(EventStream::Registered.as_str())),
                Arc::new(InMemoryChannel::new(EventStream::Finalized.as_str())),
            ))
        }
    }
}
