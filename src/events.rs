// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Migration event bus (`spec.md` §3, §4.8, §6).

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::MigrationError;
use crate::ids::MigrationId;
use crate::phase::Phase;

/// Event severity, gated against the configured `alert.level` (`spec.md`
/// §6). Ordered low to high so `>=` comparisons express "at least this
/// severe".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    /// Fine-grained progress, useful only while developing a migration.
    Debug,
    /// Recoverable anomaly (a smoke test retried, a hook threw and was
    /// swallowed).
    Warning,
    /// Migration failed or rolled back.
    Error,
}

impl AlertLevel {
    /// Parses a level case-insensitively, matching `spec.md` §6's
    /// "unparseable values fall back to the default" rule for config keys;
    /// callers needing that fallback call this and substitute the default
    /// on `None` themselves.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// The cause of a failure event, flattened for JSON (`spec.md` §4.8).
#[derive(Debug, Clone, Serialize)]
pub struct EventCause {
    /// Human-readable failure message.
    pub message: String,
    /// Machine-readable tag, see [`MigrationError::kind`].
    pub kind: &'static str,
}

impl From<&MigrationError> for EventCause {
    fn from(error: &MigrationError) -> Self {
        Self {
            message: error.to_string(),
            kind: error.kind(),
        }
    }
}

/// One emitted event (`spec.md` §4.8).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Event name, e.g. `"MigrationStarted"`, `"PhaseCompleted"`.
    #[serde(rename = "type")]
    pub event_type: &'static str,
    /// The migration this event belongs to.
    pub migration_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Severity, used for gating against `alert.level`.
    #[serde(skip)]
    pub level: AlertLevel,
    /// The phase this event concerns, if any.
    pub phase: Option<Phase>,
    /// The failure, if this event reports one.
    pub cause: Option<EventCause>,
}

impl Event {
    fn new(event_type: &'static str, migration_id: MigrationId, level: AlertLevel) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        Self {
            event_type,
            migration_id: migration_id.to_string(),
            timestamp_ms,
            level,
            phase: None,
            cause: None,
        }
    }

    fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    fn with_cause(mut self, cause: EventCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Serializes this event as a JSON payload (`spec.md` §4.8).
    ///
    /// # Errors
    /// Returns the `serde_json` error if serialization somehow fails; none
    /// of this struct's fields can produce one in practice.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

type Subscriber = dyn Fn(&Event) + Send + Sync;

/// Publishes [`Event`]s to registered subscribers, dropping any event below
/// the configured [`AlertLevel`] (`spec.md` §6's `alert.level`).
pub struct EventBus {
    min_level: AlertLevel,
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
}

impl EventBus {
    /// Builds a bus that only delivers events at or above `min_level`.
    #[must_use]
    pub fn new(min_level: AlertLevel) -> Self {
        Self {
            min_level,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a subscriber invoked synchronously, in registration order,
    /// for every delivered event.
    pub fn subscribe(&self, subscriber: Arc<Subscriber>) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(subscriber);
    }

    fn publish(&self, event: Event) {
        if event.level < self.min_level {
            tracing::debug!(event_type = event.event_type, "event suppressed by alert.level");
            return;
        }
        tracing::info!(event_type = event.event_type, migration_id = %event.migration_id, "migration event");
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            subscriber(&event);
        }
    }

    /// Emits `MigrationStarted`.
    pub fn migration_started(&self, migration_id: MigrationId) {
        self.publish(Event::new("MigrationStarted", migration_id, AlertLevel::Debug));
    }

    /// Emits `PhaseStarted` for `phase`.
    pub fn phase_started(&self, migration_id: MigrationId, phase: Phase) {
        self.publish(
            Event::new("PhaseStarted", migration_id, AlertLevel::Debug).with_phase(phase),
        );
    }

    /// Emits `PhaseCompleted` for `phase`.
    pub fn phase_completed(&self, migration_id: MigrationId, phase: Phase) {
        self.publish(
            Event::new("PhaseCompleted", migration_id, AlertLevel::Debug).with_phase(phase),
        );
    }

    /// Emits `MigrationCompleted`.
    pub fn migration_completed(&self, migration_id: MigrationId) {
        self.publish(Event::new(
            "MigrationCompleted",
            migration_id,
            AlertLevel::Debug,
        ));
    }

    /// Emits `RollbackTriggered` naming the phase and cause that provoked it.
    pub fn rollback_triggered(&self, migration_id: MigrationId, phase: Phase, cause: &MigrationError) {
        self.publish(
            Event::new("RollbackTriggered", migration_id, AlertLevel::Warning)
                .with_phase(phase)
                .with_cause(EventCause::from(cause)),
        );
    }

    /// Emits `MigrationFailed`.
    pub fn migration_failed(&self, migration_id: MigrationId, cause: &MigrationError) {
        self.publish(
            Event::new("MigrationFailed", migration_id, AlertLevel::Error)
                .with_cause(EventCause::from(cause)),
        );
    }

    /// Emits `RollbackFailed`.
    pub fn rollback_failed(&self, migration_id: MigrationId, cause: &MigrationError) {
        self.publish(
            Event::new("RollbackFailed", migration_id, AlertLevel::Error)
                .with_cause(EventCause::from(cause)),
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn alert_level_parses_case_insensitively() {
        assert_eq!(AlertLevel::parse("warning"), Some(AlertLevel::Warning));
        assert_eq!(AlertLevel::parse("ERROR"), Some(AlertLevel::Error));
        assert_eq!(AlertLevel::parse("bogus"), None);
    }

    #[test]
    fn events_below_min_level_are_suppressed() {
        let bus = EventBus::new(AlertLevel::Warning);
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(Arc::new(move |_event: &Event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.migration_started(MigrationId::next());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        bus.migration_failed(
            MigrationId::next(),
            &MigrationError::plan_invalid("bad plan"),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_serializes_to_json() {
        let event = Event::new("MigrationStarted", MigrationId::next(), AlertLevel::Debug)
            .with_phase(Phase::Preflight);
        let json = event.to_json().expect("serializes");
        assert!(json.contains("\"type\":\"MigrationStarted\""));
        assert!(json.contains("\"phase\":\"Preflight\""));
    }
}
