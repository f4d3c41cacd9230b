//! In-process channel with the same delivery semantics as a broker queue.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::channel::{ChannelError, Delivery, MessageChannel};

const DEFAULT_WAIT: Duration = Duration::from_millis(200);

#[derive(Default)]
struct State {
    ready: VecDeque<(String, String)>,
    in_flight: HashMap<String, Delivery>,
    acked: Vec<String>,
    dropped: Vec<String>,
    deliveries: usize,
    receives: usize,
    closed: bool,
}

/// Queue held in memory.
///
/// Messages published here are delivered one at a time; a requeued message goes
/// to the back of the queue with a fresh receipt. Acknowledged and dropped
/// bodies are kept so tests can inspect what happened to each message.
pub struct InMemoryChannel {
    name: String,
    wait: Duration,
    state: Mutex<State>,
    notify: Notify,
}

impl InMemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wait: DEFAULT_WAIT,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
        }
    }

    /// How long `next_delivery` waits on an empty queue before returning `None`.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, body: impl Into<String>) -> String {
        let message_id = Uuid::new_v4().to_string();
        self.lock()
            .ready
            .push_back((message_id.clone(), body.into()));
        self.notify.notify_one();
        message_id
    }

    /// Stop delivering; pending receives return `Closed`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn acked(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.lock().dropped.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Total deliveries handed out, redeliveries included.
    pub fn deliveries(&self) -> usize {
        self.lock().deliveries
    }

    /// Calls to `next_delivery`, empty waits and closed errors included.
    pub fn receives(&self) -> usize {
        self.lock().receives
    }

    /// No message is waiting or in flight.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.ready.is_empty() && state.in_flight.is_empty()
    }

    fn take_next(&self) -> Result<Option<Delivery>, ChannelError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ChannelError::Closed);
        }
        let Some((message_id, body)) = state.ready.pop_front() else {
            return Ok(None);
        };
        let delivery = Delivery {
            message_id,
            receipt: Uuid::new_v4().to_string(),
            body,
        };
        state.deliveries += 1;
        state
            .in_flight
            .insert(delivery.receipt.clone(), delivery.clone());
        Ok(Some(delivery))
    }

    fn settle(&self, delivery: &Delivery) -> Result<(MutexGuard<'_, State>, Delivery), ChannelError> {
        let mut state = self.lock();
        let settled = state
            .in_flight
            .remove(&delivery.receipt)
            .ok_or_else(|| ChannelError::UnknownDelivery(delivery.receipt.clone()))?;
        Ok((state, settled))
    }
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_delivery(&self) -> Result<Option<Delivery>, ChannelError> {
        self.lock().receives += 1;
        let notified = self.notify.notified();
        if let Some(delivery) = self.take_next()? {
            return Ok(Some(delivery));
        }
        // A publish between the check and the wait still wakes us: `notified`
        // was created before the check.
        let _ = tokio::time::timeout(self.wait, notified).await;
        self.take_next()
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        let (mut state, settled) = self.settle(delivery)?;
        state.acked.push(settled.body);
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError> {
        let (mut state, settled) = self.settle(delivery)?;
        if requeue {
            state.ready.push_back((settled.message_id, settled.body));
            drop(state);
            self.notify.notify_one();
        } else {
            state.dropped.push(settled.body);
        }
        Ok(())
    }
}
