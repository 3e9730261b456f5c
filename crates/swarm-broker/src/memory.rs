//! In-memory broker for tests and single-binary local deployments.
//!
//! A single append-only log with one consumer-group cursor. Commit
//! semantics mirror the production backend: `next` re-delivers from the
//! committed offset, so an uncommitted record is observed again after the
//! consumer restarts its poll loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::{ConsumedRecord, FeedbackConsumer, FeedbackProducer};

#[derive(Debug, Default)]
struct Log {
    records: Vec<(String, Bytes)>,
    committed: u64,
    in_flight: VecDeque<u64>,
    closed: bool,
}

/// In-memory broker. Clone handles share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    log: Arc<Mutex<Log>>,
    available: Arc<Notify>,
}

impl MemoryBroker {
    /// Creates a new empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Closes the stream; consumers observe `None` after draining.
    pub fn close(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.closed = true;
        }
        self.available.notify_waiters();
    }

    /// Returns the number of records ever published (test helper).
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.log.lock().map(|log| log.records.len()).unwrap_or(0)
    }

    /// Returns the committed offset (test helper).
    #[must_use]
    pub fn committed_offset(&self) -> u64 {
        self.log.lock().map(|log| log.committed).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Log>> {
        self.log
            .lock()
            .map_err(|_| Error::transport("memory broker lock poisoned"))
    }
}

#[async_trait]
impl FeedbackProducer for MemoryBroker {
    async fn publish(&self, key: &str, payload: Bytes) -> Result<()> {
        {
            let mut log = self.lock()?;
            if log.closed {
                return Err(Error::transport("broker is closed"));
            }
            log.records.push((key.to_string(), payload));
        }
        self.available.notify_waiters();
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let log = self.lock()?;
        if log.closed {
            return Err(Error::transport("broker is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedbackConsumer for MemoryBroker {
    async fn next(&self) -> Result<Option<ConsumedRecord>> {
        loop {
            // Register the waiter before checking the log so a publish
            // landing in between cannot be missed.
            let mut waiter = Box::pin(self.available.notified());
            waiter.as_mut().enable();
            {
                let mut log = self.lock()?;
                let next_offset = log
                    .in_flight
                    .back()
                    .map_or(log.committed, |offset| offset + 1);
                if let Some((key, payload)) = log.records.get(next_offset as usize).cloned() {
                    log.in_flight.push_back(next_offset);
                    return Ok(Some(ConsumedRecord {
                        key,
                        payload,
                        partition: 0,
                        offset: next_offset,
                    }));
                }
                if log.closed {
                    return Ok(None);
                }
            }
            waiter.await;
        }
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<()> {
        let mut log = self.lock()?;
        log.in_flight.retain(|&offset| offset > record.offset);
        log.committed = log.committed.max(record.offset + 1);
        Ok(())
    }
}
