//! Audit events for authentication flows.
//!
//! Every flow emits a small, structured record for each significant
//! transition so operators can reconstruct why a login was routed the way
//! it was. Events carry the session id and flow name, never attribute
//! values.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A flow started for a session.
    FlowStarted,
    /// A step result was committed.
    StepCompleted,
    /// A sequencing script was evaluated.
    ScriptEvaluated,
    /// The flow moved to a new step.
    StepRouted,
    /// The flow finished successfully.
    FlowSucceeded,
    /// The flow finished with a failure.
    FlowFailed,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A flow audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: EventType,
    /// Outcome of the event.
    pub outcome: EventOutcome,
    /// Authentication session the event belongs to.
    pub session_id: Option<Uuid>,
    /// Flow name.
    pub flow: Option<String>,
    /// Step number, when the event concerns one step.
    pub step: Option<u32>,
    /// Error message (for failure events).
    pub error: Option<String>,
    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Looks up a detail value by key.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
#[derive(Debug)]
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    session_id: Option<Uuid>,
    flow: Option<String>,
    step: Option<u32>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            session_id: None,
            flow: None,
            step: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the session ID.
    #[must_use]
    pub const fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Sets the flow name.
    #[must_use]
    pub fn flow(mut self, flow: impl Into<String>) -> Self {
        self.flow = Some(flow.into());
        self
    }

    /// Sets the step number.
    #[must_use]
    pub const fn step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            session_id: self.session_id,
            flow: self.flow,
            step: self.step,
            error: self.error,
            details: self.details,
        }
    }
}

/// Receives flow audit events.
pub trait EventListener: Send + Sync {
    /// Handles one event. Must not block for long.
    fn on_event(&self, event: &Event);
}

/// Event listener that writes to the tracing framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn on_event(&self, event: &Event) {
        tracing::info!(
            event_id = %event.id,
            event_type = ?event.event_type,
            outcome = ?event.outcome,
            session_id = ?event.session_id,
            flow = ?event.flow,
            step = ?event.step,
            error = ?event.error,
            "flow_event"
        );
    }
}

/// Event listener that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventListener {
    events: Arc<RwLock<Vec<Event>>>,
}

impl InMemoryEventListener {
    /// Creates an empty listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the recorded event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }
}

impl EventListener for InMemoryEventListener {
    fn on_event(&self, event: &Event) {
        self.events.write().push(event.clone());
    }
}
