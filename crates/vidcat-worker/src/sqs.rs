use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::Client;

use crate::channel::{ChannelError, Delivery, MessageChannel};

/// Build an SQS client from the default credential chain.
pub async fn sqs_client(region: Option<String>) -> Client {
    let region_provider = RegionProviderChain::first_try(region.map(aws_config::Region::new))
        .or_default_provider();
    let config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    Client::new(&config)
}

/// One SQS queue consumed with long polling, one message per receive.
///
/// Acknowledging deletes the message. Requeueing makes it visible again
/// immediately; dropping deletes it.
#[derive(Clone)]
pub struct SqsChannel {
    client: Client,
    queue_url: String,
    name: String,
    wait_time_seconds: i32,
}

impl SqsChannel {
    pub fn new(
        client: Client,
        name: impl Into<String>,
        queue_url: impl Into<String>,
        wait_time_seconds: i32,
    ) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            name: name.into(),
            wait_time_seconds,
        }
    }

    async fn delete(&self, delivery: &Delivery) -> Result<(), String> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&delivery.receipt)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| DisplayErrorContext(&e).to_string())
    }
}

#[async_trait]
impl MessageChannel for SqsChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, ChannelError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_seconds)
            .send()
            .await
            .map_err(|e| ChannelError::Receive(DisplayErrorContext(&e).to_string()))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let receipt = message.receipt_handle().ok_or_else(|| {
            ChannelError::Receive("message received without receipt handle".to_string())
        })?;

        Ok(Some(Delivery {
            message_id: message.message_id().unwrap_or_default().to_string(),
            receipt: receipt.to_string(),
            body: message.body().unwrap_or_default().to_string(),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.delete(delivery).await.map_err(ChannelError::Ack)
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError> {
        if !requeue {
            tracing::error!(
                queue = %self.name,
                message_id = %delivery.message_id,
                "Dropping message without redelivery"
            );
            return self.delete(delivery).await.map_err(ChannelError::Reject);
        }

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(&delivery.receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Reject(DisplayErrorContext(&e).to_string()))
    }
}
