//! The workflow engine: durable start, signal delivery, and the replay-safe
//! driver loop.
//!
//! One driver task runs per live workflow instance. The driver never holds
//! state the journal does not: each iteration folds the journal-derived
//! instance, computes the single next action, performs it, and records the
//! outcome before advancing. After a crash the driver is respawned from the
//! journal and resumes at the first unrecorded step; completed activities
//! are never re-executed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use swarm_core::{Decision, FeedbackEvent, RetryPolicy, RunId, WorkflowId};

use crate::activity::{
    ActivitySet, AnalyzeInput, NotifyInput, NotifyOutcome, PublishInput, PublishOutcome,
    run_with_retry,
};
use crate::error::{Error, Result};
use crate::events::{WorkflowEvent, WorkflowEventData};
use crate::instance::{ApprovalOutcome, WorkflowDescription, WorkflowInstance, WorkflowState};
use crate::journal::Journal;
use crate::signal::{SignalDelivery, SignalEnvelope};

/// Actor recorded for engine-synthesized approvals.
const AUTO_APPROVE_ACTOR: &str = "policy:auto-approve";

/// Engine configuration captured at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Namespace scoping all journal and signal paths.
    pub namespace: String,
    /// Upper bound on the approval wait.
    pub approval_timeout: Duration,
    /// Per-attempt start-to-close timeout for activities.
    pub activity_timeout: Duration,
    /// Retry policy for activity attempts.
    pub retry_policy: RetryPolicy,
    /// When true, a soft-skipped notify synthesizes an approval instead of
    /// failing the workflow.
    pub auto_approve_on_soft_skip: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            approval_timeout: Duration::from_secs(300),
            activity_timeout: Duration::from_secs(120),
            retry_policy: RetryPolicy::default(),
            auto_approve_on_soft_skip: false,
        }
    }
}

/// Outcome of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    /// The workflow handling this feedback.
    pub workflow_id: WorkflowId,
    /// True if this call created the instance; false if it already existed.
    pub newly_started: bool,
}

struct InstanceSlot {
    waker: Arc<Notify>,
    running: bool,
}

/// The durable workflow engine.
pub struct Engine {
    config: EngineConfig,
    journal: Journal,
    activities: ActivitySet,
    slots: Mutex<HashMap<String, InstanceSlot>>,
}

impl Engine {
    /// Creates an engine over the given journal and activities.
    #[must_use]
    pub fn new(config: EngineConfig, journal: Journal, activities: ActivitySet) -> Self {
        Self {
            config,
            journal,
            activities,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or re-attaches to) the workflow for a feedback event.
    ///
    /// Idempotent by workflow ID: a duplicate start returns the existing
    /// handle and never creates a second instance.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[tracing::instrument(skip(self, event), fields(feedback_id = %event.feedback_id))]
    pub async fn start(self: &Arc<Self>, event: FeedbackEvent) -> Result<StartOutcome> {
        let workflow_id = WorkflowId::for_feedback(event.feedback_id);
        let started = WorkflowEvent::new(
            workflow_id.clone(),
            0,
            WorkflowEventData::WorkflowStarted {
                run_id: RunId::generate(),
                event,
            },
        );

        let outcome = self.journal.append(started).await?;
        let newly_started = outcome.was_written();
        if newly_started {
            metrics::counter!("swarm_workflows_started_total").increment(1);
            tracing::info!(workflow_id = %workflow_id, "workflow started");
        } else {
            tracing::debug!(workflow_id = %workflow_id, "duplicate start absorbed");
        }

        self.ensure_driver(&workflow_id);
        Ok(StartOutcome {
            workflow_id,
            newly_started,
        })
    }

    /// Delivers an approval signal.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure. Missing or completed workflows
    /// are reported through [`SignalDelivery`], not as errors.
    #[tracing::instrument(skip(self, envelope), fields(workflow_id = %envelope.workflow_id, decision = %envelope.decision))]
    pub async fn signal(self: &Arc<Self>, envelope: SignalEnvelope) -> Result<SignalDelivery> {
        let events = self.journal.load(&envelope.workflow_id).await?;
        if events.is_empty() {
            return Ok(SignalDelivery::NotFound);
        }
        let instance = WorkflowInstance::fold(envelope.workflow_id.clone(), &events)?;
        if instance.state.is_terminal() {
            return Ok(SignalDelivery::AlreadyCompleted);
        }
        if instance.approval != ApprovalOutcome::Pending {
            return Ok(SignalDelivery::Superseded);
        }

        self.journal.append_signal(&envelope).await?;
        metrics::counter!("swarm_signals_total", "decision" => envelope.decision.as_str())
            .increment(1);
        self.waker(&envelope.workflow_id).notify_one();
        self.ensure_driver(&envelope.workflow_id);

        Ok(if instance.state == WorkflowState::AwaitingApproval {
            SignalDelivery::Accepted
        } else {
            SignalDelivery::Buffered
        })
    }

    /// Returns the read-only projection for a workflow, or `None` if it
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn describe(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowDescription>> {
        let events = self.journal.load(workflow_id).await?;
        if events.is_empty() {
            return Ok(None);
        }
        let instance = WorkflowInstance::fold(workflow_id.clone(), &events)?;
        Ok(Some(instance.describe()))
    }

    /// Respawns drivers for every non-terminal instance in the journal.
    ///
    /// Called once at process start; returns the number of resumed
    /// instances.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt journal.
    pub async fn recover(self: &Arc<Self>) -> Result<usize> {
        let mut resumed = 0;
        for workflow_id in self.journal.list_workflows().await? {
            let events = self.journal.load(&workflow_id).await?;
            let instance = WorkflowInstance::fold(workflow_id.clone(), &events)?;
            if !instance.state.is_terminal() {
                tracing::info!(workflow_id = %workflow_id, state = instance.state.as_str(), "resuming workflow");
                self.ensure_driver(&workflow_id);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Waits until a workflow reaches a terminal state, polling the journal.
    ///
    /// Intended for tests and operator tooling; production flow is
    /// fire-and-forget.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow does not exist or the deadline
    /// elapses first.
    pub async fn await_terminal(
        &self,
        workflow_id: &WorkflowId,
        deadline: Duration,
    ) -> Result<WorkflowDescription> {
        let poll = Duration::from_millis(10);
        let started = tokio::time::Instant::now();
        loop {
            if let Some(description) = self.describe(workflow_id).await? {
                if description.state.is_terminal() {
                    return Ok(description);
                }
            }
            if started.elapsed() > deadline {
                return Err(Error::AwaitTimeout {
                    workflow_id: workflow_id.clone(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    fn waker(&self, workflow_id: &WorkflowId) -> Arc<Notify> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(workflow_id.as_str().to_string())
            .or_insert_with(|| InstanceSlot {
                waker: Arc::new(Notify::new()),
                running: false,
            })
            .waker
            .clone()
    }

    fn ensure_driver(self: &Arc<Self>, workflow_id: &WorkflowId) {
        {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            let slot = slots
                .entry(workflow_id.as_str().to_string())
                .or_insert_with(|| InstanceSlot {
                    waker: Arc::new(Notify::new()),
                    running: false,
                });
            if slot.running {
                return;
            }
            slot.running = true;
        }

        let engine = Arc::clone(self);
        let workflow_id = workflow_id.clone();
        tokio::spawn(async move {
            if let Err(error) = engine.drive(&workflow_id).await {
                tracing::error!(workflow_id = %workflow_id, %error, "workflow driver failed");
            }
            let mut slots = engine.slots.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get_mut(workflow_id.as_str()) {
                slot.running = false;
            }
        });
    }

    async fn drive(self: &Arc<Self>, workflow_id: &WorkflowId) -> Result<()> {
        let events = self.journal.load(workflow_id).await?;
        if events.is_empty() {
            return Err(Error::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            });
        }
        let mut instance = WorkflowInstance::fold(workflow_id.clone(), &events)?;
        if instance.state.is_terminal() {
            return Ok(());
        }

        while !instance.state.is_terminal() {
            self.step(&mut instance).await?;
        }

        metrics::counter!(
            "swarm_workflows_completed_total",
            "state" => instance.state.as_str()
        )
        .increment(1);
        tracing::info!(
            workflow_id = %instance.workflow_id,
            state = instance.state.as_str(),
            external_ref = instance.external_ref.as_deref().unwrap_or(""),
            "workflow completed"
        );
        Ok(())
    }

    /// Performs the next step of the state machine and records its outcome.
    async fn step(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        match instance.state {
            WorkflowState::Analyzing => {
                if instance.analysis.is_none() {
                    self.run_analyze(instance).await
                } else if instance.notify.is_none() {
                    self.run_notify(instance).await
                } else {
                    self.start_approval_wait(instance).await
                }
            }
            WorkflowState::AwaitingApproval => self.await_approval(instance).await,
            WorkflowState::ApprovedPublishing => self.run_publish(instance).await,
            WorkflowState::Created => Err(Error::JournalCorrupt {
                workflow_id: instance.workflow_id.clone(),
                message: "driver entered step without a start record".into(),
            }),
            state => Err(Error::InvalidStateTransition {
                from: state.as_str().to_string(),
                to: "step".to_string(),
                reason: "terminal states have no next step".to_string(),
            }),
        }
    }

    async fn run_analyze(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        let event = instance.event.clone().ok_or_else(|| Error::JournalCorrupt {
            workflow_id: instance.workflow_id.clone(),
            message: "analyzing without a feedback event".into(),
        })?;
        let input = AnalyzeInput {
            text: event.text,
            source: event.source,
            user_id: event.origin.user_id,
        };

        let data = match run_with_retry(
            "analyze",
            self.config.retry_policy,
            self.config.activity_timeout,
            |_| self.activities.analyze.analyze(input.clone()),
        )
        .await
        {
            Ok(analysis) => WorkflowEventData::AnalysisCompleted { analysis },
            Err(err) => WorkflowEventData::WorkflowFailed {
                reason: format!("analyze failed: {err}"),
            },
        };
        self.record(instance, data).await
    }

    async fn run_notify(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        let spec = instance
            .analysis
            .as_ref()
            .and_then(|analysis| analysis.spec.clone());
        let Some(spec) = spec else {
            return self
                .record(
                    instance,
                    WorkflowEventData::WorkflowFailed {
                        reason: "analyzer returned no issue spec for non-duplicate feedback".into(),
                    },
                )
                .await;
        };

        let channel_id = instance
            .event
            .as_ref()
            .and_then(|event| event.origin.channel_id.clone())
            .unwrap_or_default();
        let input = NotifyInput {
            channel_id,
            spec,
            workflow_id: instance.workflow_id.clone(),
        };

        let data = match run_with_retry(
            "notify",
            self.config.retry_policy,
            self.config.activity_timeout,
            |_| self.activities.notify.notify(input.clone()),
        )
        .await
        {
            Ok(NotifyOutcome::Posted { message_id }) => WorkflowEventData::NotifyCompleted {
                message_id: Some(message_id),
                soft_skipped: false,
            },
            Ok(NotifyOutcome::SoftSkipped) => WorkflowEventData::NotifyCompleted {
                message_id: None,
                soft_skipped: true,
            },
            Err(err) => WorkflowEventData::WorkflowFailed {
                reason: format!("notify failed: {err}"),
            },
        };
        self.record(instance, data).await
    }

    async fn start_approval_wait(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        let soft_skipped = instance
            .notify
            .as_ref()
            .is_some_and(|notify| notify.soft_skipped);
        if soft_skipped && !self.config.auto_approve_on_soft_skip {
            return self
                .record(
                    instance,
                    WorkflowEventData::WorkflowFailed {
                        reason: "chat credential absent and no local approval path configured"
                            .into(),
                    },
                )
                .await;
        }

        let timeout = chrono::Duration::from_std(self.config.approval_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let deadline = Utc::now() + timeout;
        self.record(instance, WorkflowEventData::ApprovalWaitStarted { deadline })
            .await
    }

    async fn await_approval(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        // Buffered signals are consumed before the timer is consulted.
        if let Some((signal_id, envelope)) = self.first_unconsumed_signal(instance).await? {
            return self.consume_signal(instance, signal_id, &envelope).await;
        }

        let soft_skipped = instance
            .notify
            .as_ref()
            .is_some_and(|notify| notify.soft_skipped);
        if soft_skipped && self.config.auto_approve_on_soft_skip {
            return self
                .record(
                    instance,
                    WorkflowEventData::SignalReceived {
                        signal_id: AUTO_APPROVE_ACTOR.to_string(),
                        decision: Decision::Approve,
                        actor_id: AUTO_APPROVE_ACTOR.to_string(),
                        interaction_id: None,
                    },
                )
                .await;
        }

        let deadline = instance
            .approval_deadline
            .ok_or_else(|| Error::JournalCorrupt {
                workflow_id: instance.workflow_id.clone(),
                message: "awaiting approval without a journaled deadline".into(),
            })?;

        let waker = self.waker(&instance.workflow_id);
        let notified = waker.notified();
        // Re-check after registering the waiter so a signal landing between
        // the list above and here is not missed.
        if let Some((signal_id, envelope)) = self.first_unconsumed_signal(instance).await? {
            return self.consume_signal(instance, signal_id, &envelope).await;
        }

        if let Some(remaining) = remaining_until(deadline) {
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(remaining) => {}
            }
        }

        // Timer may have fired: a signal already in the inbox arrived before
        // the fire and still wins; anything later is superseded.
        if let Some((signal_id, envelope)) = self.first_unconsumed_signal(instance).await? {
            return self.consume_signal(instance, signal_id, &envelope).await;
        }
        if remaining_until(deadline).is_none() {
            return self.record(instance, WorkflowEventData::ApprovalTimedOut).await;
        }
        // Woken without a visible signal (spurious); loop back via step().
        Ok(())
    }

    async fn consume_signal(
        self: &Arc<Self>,
        instance: &mut WorkflowInstance,
        signal_id: String,
        envelope: &SignalEnvelope,
    ) -> Result<()> {
        self.record(
            instance,
            WorkflowEventData::SignalReceived {
                signal_id,
                decision: envelope.decision,
                actor_id: envelope.actor_id.clone(),
                interaction_id: envelope.interaction_id.clone(),
            },
        )
        .await
    }

    async fn first_unconsumed_signal(
        &self,
        instance: &WorkflowInstance,
    ) -> Result<Option<(String, SignalEnvelope)>> {
        let signals = self.journal.list_signals(&instance.workflow_id).await?;
        Ok(signals
            .into_iter()
            .find(|(signal_id, _)| !instance.consumed_signal_ids.contains(signal_id)))
    }

    async fn run_publish(self: &Arc<Self>, instance: &mut WorkflowInstance) -> Result<()> {
        let spec = instance
            .analysis
            .as_ref()
            .and_then(|analysis| analysis.spec.clone())
            .ok_or_else(|| Error::JournalCorrupt {
                workflow_id: instance.workflow_id.clone(),
                message: "publishing without an issue spec".into(),
            })?;
        let feedback_id = instance
            .workflow_id
            .feedback_id()
            .map_err(Error::from)?;
        let input = PublishInput {
            spec,
            idempotency_token: PublishInput::token_for(feedback_id),
        };

        let data = match run_with_retry(
            "publish",
            self.config.retry_policy,
            self.config.activity_timeout,
            |_| self.activities.publish.publish(input.clone()),
        )
        .await
        {
            Ok(PublishOutcome::Published { url }) => WorkflowEventData::PublishCompleted {
                external_ref: Some(url),
                soft_skipped: false,
            },
            Ok(PublishOutcome::SoftSkipped) => WorkflowEventData::PublishCompleted {
                external_ref: None,
                soft_skipped: true,
            },
            Err(err) => WorkflowEventData::WorkflowFailed {
                reason: format!("publish failed: {err}"),
            },
        };
        self.record(instance, data).await
    }

    /// Appends an event at the instance's next sequence and folds the
    /// authoritative record (ours, or a racing writer's) into the instance.
    async fn record(
        &self,
        instance: &mut WorkflowInstance,
        data: WorkflowEventData,
    ) -> Result<()> {
        let event = WorkflowEvent::new(instance.workflow_id.clone(), instance.next_seq, data);
        let authoritative = self.journal.append(event).await?.into_event();
        instance.apply(&authoritative)
    }
}

/// Returns the time remaining until `deadline`, or `None` if it has passed.
fn remaining_until(deadline: DateTime<Utc>) -> Option<Duration> {
    let remaining = deadline - Utc::now();
    remaining.to_std().ok().filter(|d| !d.is_zero())
}
