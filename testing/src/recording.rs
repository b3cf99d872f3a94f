//! Emitter and notifier doubles that record what they receive.

use std::sync::{Arc, Mutex, PoisonError};
use sweepstake_core::store::{EventEmitter, Notifier, SideEffectFuture};
use sweepstake_core::types::{EventId, MutationKind, NotificationDecision};

/// Records every published mutation.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    published: Arc<Mutex<Vec<(EventId, MutationKind)>>>,
}

impl RecordingEmitter {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<(EventId, MutationKind)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds published for one event, oldest first.
    #[must_use]
    pub fn kinds_for(&self, event_id: EventId) -> Vec<MutationKind> {
        self.published()
            .into_iter()
            .filter(|(id, _)| *id == event_id)
            .map(|(_, kind)| kind)
            .collect()
    }
}

impl EventEmitter for RecordingEmitter {
    fn publish(&self, event_id: EventId, kind: MutationKind) -> SideEffectFuture<'_> {
        Box::pin(async move {
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((event_id, kind));
        })
    }
}

/// Records every notification decision.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<NotificationDecision>>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decisions delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationDecision> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, decision: NotificationDecision) -> SideEffectFuture<'_> {
        Box::pin(async move {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(decision);
        })
    }
}
