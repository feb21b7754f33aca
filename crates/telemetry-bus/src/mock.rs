//! Recording bus doubles for testing (no broker required)

use crate::channel::BusChannel;
use crate::publisher::Publish;
use crate::BusError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use vehicle_api::Snapshot;

/// Message captured by [`RecordingChannel`]
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
struct ChannelLog {
    exchanges: Vec<(String, String)>,
    messages: Vec<RecordedMessage>,
    /// Scripted publish outcomes; acknowledged once drained
    outcomes: VecDeque<Result<bool, BusError>>,
    declare_failure: Option<BusError>,
}

/// Channel that records declarations and messages
#[derive(Default)]
pub struct RecordingChannel {
    log: Mutex<ChannelLog>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the acknowledgment for the next publish
    pub fn push_ack(&self, acked: bool) {
        self.lock().outcomes.push_back(Ok(acked));
    }

    /// Queue a transport failure for the next publish
    pub fn push_failure(&self, err: BusError) {
        self.lock().outcomes.push_back(Err(err));
    }

    /// Make exchange declaration fail
    pub fn fail_declare(&self, err: BusError) {
        self.lock().declare_failure = Some(err);
    }

    /// Declared (name, type) pairs
    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.lock().exchanges.clone()
    }

    /// Every publish attempt, acknowledged or not
    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BusChannel for RecordingChannel {
    async fn declare_exchange(&self, name: &str, kind: &str) -> Result<(), BusError> {
        let mut log = self.lock();
        if let Some(err) = log.declare_failure.clone() {
            return Err(err);
        }
        log.exchanges.push((name.to_string(), kind.to_string()));
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<bool, BusError> {
        let mut log = self.lock();
        log.messages.push(RecordedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
            content_type: content_type.to_string(),
        });
        log.outcomes.pop_front().unwrap_or(Ok(true))
    }
}

#[derive(Default)]
struct PublisherLog {
    snapshots: Vec<Snapshot>,
    outcomes: VecDeque<Result<(), BusError>>,
}

/// Publisher that keeps every snapshot it is given
#[derive(Default)]
pub struct RecordingPublisher {
    log: Mutex<PublisherLog>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next publish
    pub fn push_outcome(&self, outcome: Result<(), BusError>) {
        self.lock().outcomes.push_back(outcome);
    }

    /// Snapshots handed to `publish`, in order
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.lock().snapshots.clone()
    }

    fn lock(&self) -> MutexGuard<'_, PublisherLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Publish for RecordingPublisher {
    async fn publish(&self, snapshot: &Snapshot) -> Result<(), BusError> {
        let mut log = self.lock();
        log.snapshots.push(snapshot.clone());
        log.outcomes.pop_front().unwrap_or(Ok(()))
    }
}
