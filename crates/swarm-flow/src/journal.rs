//! Append-only journal for workflow instances.
//!
//! Records are written to `{namespace}/journal/{workflow_id}/{seq:08}.json`
//! with a does-not-exist precondition. Sequence numbers are zero-padded so
//! lexicographic listing equals journal order.
//!
//! The same storage tree holds the durable signal inbox at
//! `{namespace}/signals/{workflow_id}/{ulid}.json`; ULID names make the
//! inbox list in arrival order.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ulid::Generator;

use swarm_core::{StorageBackend, WorkflowId, WritePrecondition, WriteResult};

use crate::error::{Error, Result};
use crate::events::WorkflowEvent;
use crate::signal::SignalEnvelope;

/// Outcome of a journal append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    /// The record was written; this writer is authoritative for the seq.
    Written(WorkflowEvent),
    /// Another writer already recorded this seq; its record is returned
    /// and must be folded instead of the local attempt.
    AlreadyRecorded(WorkflowEvent),
}

impl AppendOutcome {
    /// Returns the authoritative event for the sequence number.
    #[must_use]
    pub fn into_event(self) -> WorkflowEvent {
        match self {
            Self::Written(event) | Self::AlreadyRecorded(event) => event,
        }
    }

    /// Returns true if this writer won the append.
    #[must_use]
    pub const fn was_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// Journal reader/writer scoped to one namespace.
#[derive(Clone)]
pub struct Journal {
    storage: Arc<dyn StorageBackend>,
    namespace: String,
    // Monotonic generator: signal IDs minted in the same millisecond must
    // still sort in mint order, since inbox listing is arrival order.
    signal_ids: Arc<Mutex<Generator>>,
}

impl Journal {
    /// Creates a journal over the given backend and namespace.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            signal_ids: Arc::new(Mutex::new(Generator::new())),
        }
    }

    fn next_signal_id(&self) -> Result<String> {
        let mut generator = self
            .signal_ids
            .lock()
            .map_err(|_| Error::Serialization {
                message: "signal id generator lock poisoned".into(),
            })?;
        generator
            .generate()
            .map(|ulid| ulid.to_string())
            .map_err(|e| Error::Serialization {
                message: format!("signal id generation failed: {e}"),
            })
    }

    fn record_path(&self, workflow_id: &WorkflowId, seq: u64) -> String {
        format!("{}/journal/{workflow_id}/{seq:08}.json", self.namespace)
    }

    fn workflow_prefix(&self, workflow_id: &WorkflowId) -> String {
        format!("{}/journal/{workflow_id}/", self.namespace)
    }

    /// Appends an event, or loads the record that beat it to the sequence.
    ///
    /// # Errors
    ///
    /// Returns an error on storage or serialization failure, or if a
    /// conflicting record exists but cannot be read back.
    #[tracing::instrument(
        skip(self, event),
        fields(
            workflow_id = %event.workflow_id,
            seq = event.seq,
            event_type = event.data.event_name(),
        )
    )]
    pub async fn append(&self, event: WorkflowEvent) -> Result<AppendOutcome> {
        let path = self.record_path(&event.workflow_id, event.seq);
        let json = serde_json::to_vec(&event).map_err(|e| Error::Serialization {
            message: format!("failed to serialize journal record: {e}"),
        })?;

        let result = self
            .storage
            .put(&path, Bytes::from(json), WritePrecondition::DoesNotExist)
            .await?;

        match result {
            WriteResult::Success => {
                tracing::debug!("journal record written");
                Ok(AppendOutcome::Written(event))
            }
            WriteResult::PreconditionFailed => {
                tracing::debug!("journal seq already recorded, folding existing record");
                let existing = self.storage.get(&path).await?.ok_or_else(|| {
                    Error::JournalCorrupt {
                        workflow_id: event.workflow_id.clone(),
                        message: format!("record at {path} vanished after precondition failure"),
                    }
                })?;
                let recorded: WorkflowEvent =
                    serde_json::from_slice(&existing).map_err(|e| Error::JournalCorrupt {
                        workflow_id: event.workflow_id.clone(),
                        message: format!("unparseable record at {path}: {e}"),
                    })?;
                Ok(AppendOutcome::AlreadyRecorded(recorded))
            }
        }
    }

    /// Loads all records for a workflow in journal order.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or unparseable records.
    pub async fn load(&self, workflow_id: &WorkflowId) -> Result<Vec<WorkflowEvent>> {
        let prefix = self.workflow_prefix(workflow_id);
        let entries = self.storage.list(&prefix).await?;
        let mut events = Vec::with_capacity(entries.len());
        for entry in entries {
            let data = self.storage.get(&entry.path).await?.ok_or_else(|| {
                Error::JournalCorrupt {
                    workflow_id: workflow_id.clone(),
                    message: format!("listed record {} vanished", entry.path),
                }
            })?;
            let event: WorkflowEvent =
                serde_json::from_slice(&data).map_err(|e| Error::JournalCorrupt {
                    workflow_id: workflow_id.clone(),
                    message: format!("unparseable record at {}: {e}", entry.path),
                })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Returns true if the workflow has any journal records.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn exists(&self, workflow_id: &WorkflowId) -> Result<bool> {
        let path = self.record_path(workflow_id, 0);
        Ok(self.storage.get(&path).await?.is_some())
    }

    /// Lists every workflow with at least one journal record.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowId>> {
        let prefix = format!("{}/journal/", self.namespace);
        let entries = self.storage.list(&prefix).await?;
        let mut ids = BTreeSet::new();
        for entry in entries {
            let Some(rest) = entry.path.strip_prefix(&prefix) else {
                continue;
            };
            let Some((id, _)) = rest.split_once('/') else {
                continue;
            };
            if let Ok(workflow_id) = id.parse::<WorkflowId>() {
                ids.insert(workflow_id.as_str().to_string());
            }
        }
        ids.into_iter()
            .map(|id| id.parse::<WorkflowId>().map_err(Error::from))
            .collect()
    }

    /// Durably appends a signal to a workflow's inbox, returning the signal
    /// record ID.
    ///
    /// # Errors
    ///
    /// Returns an error on storage or serialization failure.
    pub async fn append_signal(&self, envelope: &SignalEnvelope) -> Result<String> {
        let signal_id = self.next_signal_id()?;
        let path = format!(
            "{}/signals/{}/{signal_id}.json",
            self.namespace, envelope.workflow_id
        );
        let json = serde_json::to_vec(envelope).map_err(|e| Error::Serialization {
            message: format!("failed to serialize signal: {e}"),
        })?;
        self.storage
            .put(&path, Bytes::from(json), WritePrecondition::DoesNotExist)
            .await?;
        Ok(signal_id)
    }

    /// Lists a workflow's signal inbox in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or unparseable records.
    pub async fn list_signals(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<(String, SignalEnvelope)>> {
        let prefix = format!("{}/signals/{workflow_id}/", self.namespace);
        let entries = self.storage.list(&prefix).await?;
        let mut signals = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(data) = self.storage.get(&entry.path).await? else {
                continue;
            };
            let envelope: SignalEnvelope =
                serde_json::from_slice(&data).map_err(|e| Error::Serialization {
                    message: format!("unparseable signal at {}: {e}", entry.path),
                })?;
            let signal_id = entry
                .path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .trim_end_matches(".json")
                .to_string();
            signals.push((signal_id, envelope));
        }
        Ok(signals)
    }
}
