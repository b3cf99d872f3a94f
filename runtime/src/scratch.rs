//! Scratching (withdrawing) resources and reassigning their participants.
//!
//! A scratch takes the participants off the resource, spreading them over
//! the remaining resources least-loaded first unless asked not to, and then
//! marks the resource withdrawn through a compare-and-swap on its version.
//! Scratches do not take the draw lock: every write is a soft delete, an
//! assignment replacement or a versioned update.

use crate::allocator::{least_loaded_ranking, round_robin};
use crate::cas::VersionedUpdater;
use crate::metrics::DrawMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use sweepstake_core::environment::EngineEnvironment;
use sweepstake_core::error::StoreError;
use sweepstake_core::types::{
    Assignment, AuditEntry, EventId, EventStatus, MutationKind, NotificationDecision,
    NotificationKind, Resource, VersionedTable,
};
use sweepstake_core::{DrawError, Result};
use tracing::{info, warn};

/// Options of [`ScratchService::scratch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScratchOptions {
    /// Move affected participants to other resources.
    pub auto_reassign: bool,
    /// Keep each participant's draw order; otherwise append after the
    /// highest active order.
    pub preserve_draw_order: bool,
}

impl Default for ScratchOptions {
    fn default() -> Self {
        Self {
            auto_reassign: true,
            preserve_draw_order: true,
        }
    }
}

/// Result of a scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScratchOutcome {
    /// The resource after it was withdrawn.
    pub scratched_resource: Resource,
    /// Assignments the resource carried, now soft-deleted.
    pub affected_assignments: Vec<Assignment>,
    /// Replacement assignments.
    pub reassignments: Vec<Assignment>,
    /// Reassigned participants per receiving resource number.
    pub redistribution_map: BTreeMap<u32, usize>,
    /// One decision per affected participant.
    pub notifications: Vec<NotificationDecision>,
}

/// One entry of a bulk scratch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScratchItem {
    /// Resource number to scratch.
    pub resource_number: u32,
    /// Why it is scratched.
    pub reason: String,
}

/// Result of one entry of a bulk scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScratchResult {
    /// Resource number the entry concerned.
    pub resource_number: u32,
    /// Outcome when the scratch succeeded.
    pub outcome: Option<ScratchOutcome>,
    /// Error message when it did not.
    pub error: Option<String>,
}

impl BulkScratchResult {
    /// True if this entry was scratched.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Scratch and restore operations.
#[derive(Clone)]
pub struct ScratchService {
    env: EngineEnvironment,
    updater: VersionedUpdater,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ScratchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchService").finish_non_exhaustive()
    }
}

fn withdrawal_fields(reason: Option<&str>, at: Option<String>) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("withdrawn".to_string(), Value::Bool(reason.is_some()));
    fields.insert(
        "withdrawn_reason".to_string(),
        reason.map_or(Value::Null, |r| Value::String(r.to_string())),
    );
    fields.insert(
        "withdrawn_at".to_string(),
        at.map_or(Value::Null, Value::String),
    );
    fields
}

impl ScratchService {
    /// Create the service over the environment's stores.
    #[must_use]
    pub fn new(env: EngineEnvironment) -> Self {
        let updater = VersionedUpdater::new(&env);
        Self {
            env,
            updater,
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for the assignment writes of a scratch.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Withdraw a resource and handle the participants assigned to it.
    ///
    /// Participants are moved one at a time, each move replacing the old
    /// assignment in a single write; the resource is marked withdrawn only
    /// once none remain on it. A scratch that failed part way can be
    /// repeated and picks up the participants still left on the resource.
    ///
    /// # Errors
    ///
    /// - [`DrawError::Validation`] for a blank reason or actor
    /// - [`DrawError::NotFound`] if the resource does not exist
    /// - [`DrawError::Conflict`] if it is already withdrawn
    /// - [`DrawError::Capacity`] if participants need reassigning but no
    ///   other resource remains; nothing is written in that case
    /// - [`DrawError::Store`] if a write still fails after retrying; moves
    ///   made before it are kept
    /// - [`DrawError::VersionConflict`] if the resource changed concurrently
    pub async fn scratch(
        &self,
        event_id: EventId,
        resource_number: u32,
        reason: &str,
        options: ScratchOptions,
        actor: &str,
    ) -> Result<ScratchOutcome> {
        if reason.trim().is_empty() {
            return Err(DrawError::Validation("a scratch reason is required".to_string()));
        }
        if actor.trim().is_empty() {
            return Err(DrawError::Validation("actor is required".to_string()));
        }

        let resource = self.find_resource(event_id, resource_number).await?;
        if resource.withdrawn {
            return Err(DrawError::Conflict(format!(
                "resource {resource_number} is already withdrawn"
            )));
        }

        let active = self.env.draws.find_active_assignments(event_id).await?;
        let (affected, others): (Vec<_>, Vec<_>) = active
            .into_iter()
            .partition(|a| a.resource_id == resource.id);

        let now = self.env.clock.now();
        let mut handled = Vec::with_capacity(affected.len());
        let mut reassignments = Vec::new();
        let mut redistribution_map = BTreeMap::new();
        let mut notifications = Vec::with_capacity(affected.len());

        if options.auto_reassign && !affected.is_empty() {
            let remaining: Vec<_> = self
                .env
                .draws
                .load_resources(event_id)
                .await?
                .into_iter()
                .filter(|r| !r.withdrawn && r.id != resource.id)
                .collect();
            if remaining.is_empty() {
                return Err(DrawError::Capacity(format!(
                    "no other resource can take the {} participants of resource {resource_number}",
                    affected.len()
                )));
            }

            let moves = self
                .plan_moves(event_id, &resource, affected, &others, &remaining, options)
                .await?;
            for (old, replacement, to_number) in moves {
                let written = self
                    .write_with_retry(|| {
                        self.env
                            .draws
                            .replace_assignment(old.id, replacement.clone(), now)
                    })
                    .await?;
                let Some(written) = written else {
                    continue;
                };
                *redistribution_map.entry(to_number).or_insert(0) += 1;
                let kind = NotificationKind::Reassigned {
                    from_number: resource_number,
                    to_number,
                };
                notifications.push(self.notify(event_id, &old, kind).await);
                handled.push(old);
                reassignments.push(written);
            }
        } else {
            for old in affected {
                let deleted = self
                    .write_with_retry(|| self.env.draws.soft_delete_assignment(old.id, now))
                    .await?;
                if !deleted {
                    continue;
                }
                let kind = NotificationKind::Unassigned {
                    from_number: resource_number,
                };
                notifications.push(self.notify(event_id, &old, kind).await);
                handled.push(old);
            }
        }

        self.updater
            .compare_and_swap(
                VersionedTable::Resources,
                *resource.id.as_uuid(),
                withdrawal_fields(Some(reason), Some(now.to_rfc3339())),
                resource.version,
                actor,
            )
            .await?
            .into_version()?;

        self.record_audit(
            event_id,
            "resource.scratched",
            actor,
            json!({
                "resource_number": resource_number,
                "reason": reason,
                "affected": handled.len(),
                "reassigned": reassignments.len(),
                "auto_reassign": options.auto_reassign,
                "preserve_draw_order": options.preserve_draw_order,
            }),
        )
        .await;
        self.env
            .emitter
            .publish(event_id, MutationKind::ResourceScratched)
            .await;
        DrawMetrics::record_scratch(!reassignments.is_empty());
        DrawMetrics::record_assignments(reassignments.len());
        info!(
            %event_id,
            resource_number,
            affected = handled.len(),
            reassigned = reassignments.len(),
            %actor,
            "Resource scratched"
        );

        let scratched_resource = self.find_resource(event_id, resource_number).await?;
        Ok(ScratchOutcome {
            scratched_resource,
            affected_assignments: handled,
            reassignments,
            redistribution_map,
            notifications,
        })
    }

    /// Pair every affected assignment with its replacement and the number of
    /// the resource it moves to. Nothing is written.
    async fn plan_moves(
        &self,
        event_id: EventId,
        scratched: &Resource,
        mut affected: Vec<Assignment>,
        others: &[Assignment],
        remaining: &[Resource],
        options: ScratchOptions,
    ) -> Result<Vec<(Assignment, Assignment, u32)>> {
        let mut loads: HashMap<_, usize> = HashMap::new();
        for assignment in others {
            *loads.entry(assignment.resource_id).or_insert(0) += 1;
        }
        let ranked = least_loaded_ranking(remaining, &loads);
        affected.sort_by_key(|a| a.draw_order);

        let next_order = if options.preserve_draw_order {
            0
        } else {
            self.env.draws.max_draw_order(event_id).await?
        };
        let now = self.env.clock.now();

        let mut moves = Vec::with_capacity(affected.len());
        for (old, target, i) in round_robin(&affected, &ranked)? {
            let draw_order = if options.preserve_draw_order {
                old.draw_order
            } else {
                u32::try_from(i)
                    .ok()
                    .and_then(|i| next_order.checked_add(i + 1))
                    .ok_or_else(|| DrawError::Validation("draw order overflow".to_string()))?
            };
            let mut replacement =
                Assignment::new(event_id, old.participant_id, target.id, draw_order, now);
            replacement.reassigned_from = Some(scratched.id);
            moves.push((old.clone(), replacement, target.number));
        }
        Ok(moves)
    }

    async fn write_with_retry<T, F, Fut>(&self, write: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, StoreError>>,
    {
        retry_with_predicate(&self.retry, write, StoreError::is_transient)
            .await
            .map_err(|failure| DrawError::Store(failure.error))
    }

    async fn notify(
        &self,
        event_id: EventId,
        old: &Assignment,
        kind: NotificationKind,
    ) -> NotificationDecision {
        let decision = NotificationDecision {
            event_id,
            participant_id: old.participant_id,
            kind,
        };
        self.env.notifier.notify(decision.clone()).await;
        decision
    }

    /// Clear a resource's withdrawn flag. Participants moved away by the
    /// scratch stay where they are.
    ///
    /// # Errors
    ///
    /// - [`DrawError::NotFound`] if the event or resource does not exist
    /// - [`DrawError::Conflict`] if the draw is complete or the resource is
    ///   not withdrawn
    /// - [`DrawError::VersionConflict`] if the resource changed concurrently
    pub async fn restore(
        &self,
        event_id: EventId,
        resource_number: u32,
        actor: &str,
    ) -> Result<Resource> {
        if actor.trim().is_empty() {
            return Err(DrawError::Validation("actor is required".to_string()));
        }
        let status = self
            .env
            .draws
            .event_status(event_id)
            .await?
            .ok_or_else(|| DrawError::not_found("event", event_id))?;
        if status == EventStatus::Complete {
            return Err(DrawError::Conflict(
                "resources cannot be restored after the draw is complete".to_string(),
            ));
        }

        let resource = self.find_resource(event_id, resource_number).await?;
        if !resource.withdrawn {
            return Err(DrawError::Conflict(format!(
                "resource {resource_number} is not withdrawn"
            )));
        }

        self.updater
            .compare_and_swap(
                VersionedTable::Resources,
                *resource.id.as_uuid(),
                withdrawal_fields(None, None),
                resource.version,
                actor,
            )
            .await?
            .into_version()?;

        self.record_audit(
            event_id,
            "resource.restored",
            actor,
            json!({
                "resource_number": resource_number,
                "previous_reason": resource.withdrawn_reason,
            }),
        )
        .await;
        self.env
            .emitter
            .publish(event_id, MutationKind::ResourceRestored)
            .await;
        info!(%event_id, resource_number, %actor, "Resource restored");

        self.find_resource(event_id, resource_number).await
    }

    /// Scratch several resources one after another. Every entry gets a
    /// result; a failure does not stop the entries after it.
    pub async fn bulk_scratch(
        &self,
        event_id: EventId,
        items: Vec<BulkScratchItem>,
        options: ScratchOptions,
        actor: &str,
    ) -> Vec<BulkScratchResult> {
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let result = self
                .scratch(event_id, item.resource_number, &item.reason, options, actor)
                .await;
            results.push(match result {
                Ok(outcome) => BulkScratchResult {
                    resource_number: item.resource_number,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => {
                    warn!(%event_id, resource_number = item.resource_number, error = %e, "Bulk scratch entry failed");
                    BulkScratchResult {
                        resource_number: item.resource_number,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            });
        }
        results
    }

    async fn find_resource(&self, event_id: EventId, number: u32) -> Result<Resource> {
        self.env
            .draws
            .find_resource_by_number(event_id, number)
            .await?
            .ok_or_else(|| DrawError::not_found("resource", number))
    }

    async fn record_audit(&self, event_id: EventId, action: &str, actor: &str, details: Value) {
        let entry = AuditEntry::new(Some(event_id), action, actor, details, self.env.clock.now());
        if let Err(e) = self.env.audit.record(entry).await {
            warn!(%event_id, action, error = %e, "Failed to write audit entry");
        }
    }
}
