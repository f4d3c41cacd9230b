//! Lifecycle event consumers.
//!
//! One loop per stream pulls a single message, folds it into the catalog and
//! settles it before pulling the next. The loops run side by side; ordering
//! between them does not matter because merges commute.
//!
//! Shutdown: [`EventConsumerPool::shutdown`] stops both loops at their next
//! receive and waits for the message being processed, if any, to settle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use vidcat_core::models::{FinalizedEvent, RegisteredEvent};
use vidcat_core::{AppError, ChannelConfig, ErrorMetadata};
use vidcat_services::CatalogService;

use crate::channel::{ChannelError, Delivery, EventStream, MessageChannel};

/// What happens to a message once it has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Requeue,
    Drop,
}

impl Disposition {
    /// Malformed events are poison and never redelivered. Store failures are
    /// redelivered only when configured to; otherwise they are dropped too.
    pub fn for_result<T>(result: &Result<T, AppError>, requeue_on_store_failure: bool) -> Self {
        match result {
            Ok(_) => Disposition::Ack,
            Err(AppError::InvalidEvent(_)) => Disposition::Drop,
            Err(e) if requeue_on_store_failure && e.is_recoverable() => Disposition::Requeue,
            Err(_) => Disposition::Drop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub requeue_on_store_failure: bool,
    /// Pause after a failed receive before polling again.
    pub receive_error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            requeue_on_store_failure: false,
            receive_error_backoff: Duration::from_secs(5),
        }
    }
}

impl ConsumerConfig {
    pub fn from_channel_config(config: &ChannelConfig) -> Self {
        Self {
            requeue_on_store_failure: config.requeue_on_store_failure,
            ..Self::default()
        }
    }
}

/// Decode one message body and fold it into the catalog.
pub async fn process_event(
    service: &CatalogService,
    stream: EventStream,
    body: &str,
) -> Result<(), AppError> {
    match stream {
        EventStream::Registered => {
            let event: RegisteredEvent = serde_json::from_str(body)?;
            service.register_asset(&event).await?;
        }
        EventStream::Finalized => {
            let event: FinalizedEvent = serde_json::from_str(body)?;
            service.finalize_asset(&event).await?;
        }
    }
    Ok(())
}

struct Consumer {
    stream: EventStream,
    channel: Arc<dyn MessageChannel>,
    service: CatalogService,
    config: ConsumerConfig,
}

impl Consumer {
    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        tracing::info!(
            event.stream = %self.stream,
            channel = self.channel.name(),
            "Event consumer started"
        );

        loop {
            let next = tokio::select! {
                _ = shutdown_rx.recv() => break,
                next = self.channel.next_delivery() => next,
            };

            match next {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => {}
                Err(ChannelError::Closed) => {
                    tracing::warn!(event.stream = %self.stream, "Channel closed");
                    break;
                }
                Err(e) => {
                    tracing::error!(
                        event.stream = %self.stream,
                        error = %e,
                        "Failed to receive message"
                    );
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(self.config.receive_error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(event.stream = %self.stream, "Event consumer stopped");
    }

    async fn handle(&self, delivery: Delivery) {
        let span = tracing::info_span!(
            "event",
            event.stream = %self.stream,
            message.id = %delivery.message_id
        );

        async {
            let start = std::time::Instant::now();
            let result = process_event(&self.service, self.stream, &delivery.body).await;
            let disposition = Disposition::for_result(&result, self.config.requeue_on_store_failure);

            if let Err(e) = &result {
                match disposition {
                    Disposition::Requeue => {
                        tracing::warn!(error = %e, error.code = e.error_code(), "Event failed, requeueing")
                    }
                    _ => tracing::error!(
                        error = %e,
                        error.code = e.error_code(),
                        "Event rejected without redelivery"
                    ),
                }
            }

            let settled = match disposition {
                Disposition::Ack => self.channel.ack(&delivery).await,
                Disposition::Requeue => self.channel.reject(&delivery, true).await,
                Disposition::Drop => self.channel.reject(&delivery, false).await,
            };
            if let Err(e) = settled {
                tracing::error!(error = %e, ?disposition, "Failed to settle message");
            }

            tracing::debug!(
                ?disposition,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Event processed"
            );
        }
        .instrument(span)
        .await
    }
}

/// The two consumer loops, one per event stream.
pub struct EventConsumerPool {
    shutdown_txs: Vec<mpsc::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl EventConsumerPool {
    pub fn start(
        service: CatalogService,
        registered: Arc<dyn MessageChannel>,
        finalized: Arc<dyn MessageChannel>,
        config: ConsumerConfig,
    ) -> Self {
        let mut shutdown_txs = Vec::with_capacity(2);
        let mut handles = Vec::with_capacity(2);

        for (stream, channel) in [
            (EventStream::Registered, registered),
            (EventStream::Finalized, finalized),
        ] {
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            let consumer = Consumer {
                stream,
                channel,
                service: service.clone(),
                config: config.clone(),
            };
            handles.push(tokio::spawn(consumer.run(shutdown_rx)));
            shutdown_txs.push(shutdown_tx);
        }

        Self {
            shutdown_txs,
            handles,
        }
    }

    /// Signal both consumers to stop and wait for them to finish.
    pub async fn shutdown(self) {
        tracing::info!("Initiating event consumer shutdown");
        for tx in &self.shutdown_txs {
            let _ = tx.send(()).await;
        }
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Event consumer task ended abnormally");
            }
        }
    }
}
