//! Change listener and notifier used by the server binary.
//!
//! Both write structured log lines; delivery to real channels (push,
//! email, websockets) happens downstream of the log pipeline.

use sweepstake_core::store::{EventEmitter, Notifier, SideEffectFuture};
use sweepstake_core::types::{EventId, MutationKind, NotificationDecision, NotificationKind};

/// Logs every published mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEmitter;

impl EventEmitter for TracingEmitter {
    fn publish(&self, event_id: EventId, kind: MutationKind) -> SideEffectFuture<'_> {
        Box::pin(async move {
            tracing::info!(event_id = %event_id, kind = ?kind, "Event mutated");
        })
    }
}

/// Logs every notification decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, decision: NotificationDecision) -> SideEffectFuture<'_> {
        Box::pin(async move {
            match decision.kind {
                NotificationKind::Reassigned {
                    from_number,
                    to_number,
                } => tracing::info!(
                    event_id = %decision.event_id,
                    participant_id = %decision.participant_id,
                    from_number,
                    to_number,
                    "Participant reassigned"
                ),
                NotificationKind::Unassigned { from_number } => tracing::info!(
                    event_id = %decision.event_id,
                    participant_id = %decision.participant_id,
                    from_number,
                    "Participant unassigned"
                ),
            }
        })
    }
}
