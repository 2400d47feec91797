use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use swarmsim_core::types::MessageId;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Delivery, QueueTransport};
use crate::error::TransportError;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: MessageId,
    topic: String,
    payload: Vec<u8>,
    deliveries: u32,
}

/// A message rejected without requeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedMessage {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub reason: String,
}

#[derive(Default)]
struct QueueState {
    ready: HashMap<String, VecDeque<StoredMessage>>,
    /// Delivered but not yet settled. Keyed by id, which is time-ordered.
    unacked: BTreeMap<MessageId, StoredMessage>,
    dead_letters: Vec<RejectedMessage>,
    max_unacked: usize,
}

/// [`QueueTransport`] kept in process memory.
///
/// Leases never expire on their own: call [`InMemoryQueue::recover_unacked`]
/// to simulate the consumer's connection dropping.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return every unsettled message to the front of its topic, oldest
    /// first. Returns how many were recovered.
    pub async fn recover_unacked(&self) -> usize {
        let mut state = self.state.lock().await;
        let recovered = std::mem::take(&mut state.unacked);
        let count = recovered.len();
        for message in recovered.into_values().rev() {
            state
                .ready
                .entry(message.topic.clone())
                .or_default()
                .push_front(message);
        }
        count
    }

    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }

    /// Highest number of messages that were unsettled at the same time.
    pub async fn max_unacked(&self) -> usize {
        self.state.lock().await.max_unacked
    }

    pub async fn dead_letters(&self) -> Vec<RejectedMessage> {
        self.state.lock().await.dead_letters.clone()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<MessageId, TransportError> {
        let id = Uuid::now_v7();
        let message = StoredMessage {
            id,
            topic: topic.to_string(),
            payload: payload.to_vec(),
            deliveries: 0,
        };
        self.state
            .lock()
            .await
            .ready
            .entry(topic.to_string())
            .or_default()
            .push_back(message);
        Ok(id)
    }

    async fn receive(&self, topic: &str) -> Result<Option<Delivery>, TransportError> {
        let mut state = self.state.lock().await;
        let Some(mut message) = state.ready.get_mut(topic).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        message.deliveries += 1;

        let delivery = Delivery {
            id: message.id,
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            attempt: message.deliveries,
        };
        state.unacked.insert(message.id, message);
        state.max_unacked = state.max_unacked.max(state.unacked.len());
        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), TransportError> {
        self.state
            .lock()
            .await
            .unacked
            .remove(&delivery.id)
            .map(|_| ())
            .ok_or(TransportError::UnknownDelivery(delivery.id))
    }

    async fn reject(&self, delivery: &Delivery, reason: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let message = state
            .unacked
            .remove(&delivery.id)
            .ok_or(TransportError::UnknownDelivery(delivery.id))?;
        state.dead_letters.push(RejectedMessage {
            id: message.id,
            topic: message.topic,
            payload: message.payload,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn extend_lease(&self, delivery: &Delivery) -> Result<(), TransportError> {
        if !self.state.lock().await.unacked.contains_key(&delivery.id) {
            return Err(TransportError::UnknownDelivery(delivery.id));
        }
        Ok(())
    }

    async fn depth(&self, topic: &str) -> Result<usize, TransportError> {
        let state = self.state.lock().await;
        let ready = state.ready.get(topic).map_or(0, VecDeque::len);
        let leased = state.unacked.values().filter(|m| m.topic == topic).count();
        Ok(ready + leased)
    }
}
