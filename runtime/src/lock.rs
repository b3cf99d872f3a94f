//! Time-limited exclusive locks on `(resource_type, resource_id)` keys.
//!
//! # Protocol
//!
//! - **Acquire**: read the current row. A live row is reported as
//!   [`AcquireOutcome::Held`]; an expired row is deleted and reclaimed. The
//!   insert relies on the store's uniqueness on the key, and a violation
//!   (another acquirer won the race) is retried once. Every acquisition gets
//!   a fresh [`LeaseId`].
//! - **Extend**: push out `expires_at`, only while the row still carries the
//!   caller's lease and is unexpired.
//! - **Auto-extend**: a background task owned by the manager extends the
//!   lock periodically and stops on release or once the lock is lost.
//! - **Release**: delete the row if it still carries the caller's lease.
//!   Releasing a lock that is already gone succeeds.
//! - **Force release**: operator override that deletes regardless of holder
//!   and writes an audit entry.
//!
//! Expiry is a hard deadline: a lock whose `expires_at` has passed is free
//! even if its holder is still running. The holder name is only reported;
//! ownership is the lease, so two initiators sharing a name never act on
//! each other's locks.

use crate::metrics::DrawMetrics;
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sweepstake_core::environment::{Clock, EngineEnvironment};
use sweepstake_core::store::{AuditLog, LockStore};
use sweepstake_core::types::{AuditEntry, EventId, LeaseId, LockKey, LockRecord};
use sweepstake_core::{DateTime, DrawError, StoreError, Utc};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Acquired(LockRecord),
    /// Someone else holds a live lock.
    Held {
        /// Current holder.
        holder: String,
        /// When the current lock expires.
        expires_at: DateTime<Utc>,
    },
}

impl AcquireOutcome {
    /// True if the caller got the lock.
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

fn ttl_delta(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(30))
}

/// Issues, extends and releases locks.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    extensions: Mutex<HashMap<LeaseId, JoinHandle<()>>>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("auto_extended", &self.extensions().len())
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Create a manager over the environment's lock store.
    #[must_use]
    pub fn new(env: &EngineEnvironment) -> Self {
        Self {
            store: Arc::clone(&env.locks),
            audit: Arc::clone(&env.audit),
            clock: Arc::clone(&env.clock),
            extensions: Mutex::new(HashMap::new()),
        }
    }

    fn extensions(&self) -> MutexGuard<'_, HashMap<LeaseId, JoinHandle<()>>> {
        self.extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to take the lock for `holder`. On success the returned record
    /// carries the lease to present to [`extend`](Self::extend) and
    /// [`release`](Self::release).
    ///
    /// # Errors
    ///
    /// Returns the store error if the lock table cannot be read or written.
    pub async fn acquire(
        &self,
        key: &LockKey,
        holder: &str,
        ttl: Duration,
    ) -> Result<AcquireOutcome, StoreError> {
        for attempt in 0..2 {
            let now = self.clock.now();

            if let Some(existing) = self.store.find_lock(key.clone()).await? {
                if !existing.is_expired(now) {
                    DrawMetrics::record_lock_conflict(&key.resource_type);
                    debug!(%key, holder = %existing.holder, "Lock is held");
                    return Ok(AcquireOutcome::Held {
                        holder: existing.holder,
                        expires_at: existing.expires_at,
                    });
                }
                info!(%key, previous_holder = %existing.holder, "Reclaiming expired lock");
                self.store.delete_lock_if_expired(key.clone(), now).await?;
            }

            let record = LockRecord {
                key: key.clone(),
                holder: holder.to_string(),
                lease_id: LeaseId::new(),
                acquired_at: now,
                expires_at: now + ttl_delta(ttl),
                version: 1,
            };
            match self.store.insert_lock(record).await {
                Ok(record) => {
                    debug!(%key, holder, expires_at = %record.expires_at, "Lock acquired");
                    return Ok(AcquireOutcome::Acquired(record));
                }
                Err(StoreError::UniqueViolation { .. }) if attempt == 0 => {
                    debug!(%key, "Lost lock insert race, retrying once");
                }
                Err(StoreError::UniqueViolation { .. }) => break,
                Err(error) => return Err(error),
            }
        }

        DrawMetrics::record_lock_conflict(&key.resource_type);
        let current = self.store.find_lock(key.clone()).await?;
        Ok(current.map_or_else(
            || AcquireOutcome::Held {
                holder: "unknown".to_string(),
                expires_at: self.clock.now(),
            },
            |lock| AcquireOutcome::Held {
                holder: lock.holder,
                expires_at: lock.expires_at,
            },
        ))
    }

    /// Extend a held lock to `now + ttl`. Returns `false` if the lease no
    /// longer holds it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the extension cannot be written.
    pub async fn extend(
        &self,
        key: &LockKey,
        lease: LeaseId,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let extended = self
            .store
            .extend_lock(key.clone(), lease, now, now + ttl_delta(ttl))
            .await?;
        Ok(extended.is_some())
    }

    /// Keep a held lock alive by extending it every `interval` until it is
    /// released or its lease is lost.
    pub fn start_auto_extend(&self, key: &LockKey, lease: LeaseId, ttl: Duration, interval: Duration) {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = clock.now();
                match store
                    .extend_lock(task_key.clone(), lease, now, now + ttl_delta(ttl))
                    .await
                {
                    Ok(Some(record)) => {
                        debug!(key = %task_key, expires_at = %record.expires_at, "Lock extended");
                    }
                    Ok(None) => {
                        warn!(key = %task_key, %lease, "Lock lost, stopping auto-extension");
                        break;
                    }
                    Err(error) => {
                        warn!(key = %task_key, error = %error, "Failed to extend lock");
                    }
                }
            }
        });

        if let Some(previous) = self.extensions().insert(lease, handle) {
            previous.abort();
        }
    }

    /// Stop the auto-extension task of a lease, if any.
    pub fn stop_auto_extend(&self, lease: LeaseId) {
        if let Some(handle) = self.extensions().remove(&lease) {
            handle.abort();
        }
    }

    /// True while an auto-extension task for `lease` is running.
    #[must_use]
    pub fn is_auto_extending(&self, lease: LeaseId) -> bool {
        self.extensions()
            .get(&lease)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn extension_abort_handle(&self, lease: LeaseId) -> Option<AbortHandle> {
        self.extensions().get(&lease).map(JoinHandle::abort_handle)
    }

    /// Release the lock acquired under `lease`. Returns `false` if there was
    /// nothing to release, which is not an error.
    ///
    /// # Errors
    ///
    /// Returns the store error if the row cannot be deleted.
    pub async fn release(&self, key: &LockKey, lease: LeaseId) -> Result<bool, StoreError> {
        self.stop_auto_extend(lease);
        let released = self.store.delete_lock(key.clone(), Some(lease)).await?;
        if released {
            debug!(%key, %lease, "Lock released");
        } else {
            debug!(%key, %lease, "Lock already released or taken over");
        }
        Ok(released)
    }

    /// Delete a lock regardless of holder and record who did it.
    ///
    /// # Errors
    ///
    /// Returns the store error if the row cannot be deleted or the audit
    /// entry cannot be written.
    pub async fn force_release(
        &self,
        key: &LockKey,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<bool, StoreError> {
        let previous = self.store.find_lock(key.clone()).await?;
        if let Some(lock) = &previous {
            self.stop_auto_extend(lock.lease_id);
        }
        let released = self.store.delete_lock(key.clone(), None).await?;

        let event_id = (key.resource_type == "draw")
            .then(|| key.resource_id.parse().ok().map(EventId::from_uuid))
            .flatten();
        self.audit
            .record(AuditEntry::new(
                event_id,
                "lock.force_released",
                actor,
                json!({
                    "resource_type": key.resource_type,
                    "resource_id": key.resource_id,
                    "previous_holder": previous.as_ref().map(|l| l.holder.clone()),
                    "released": released,
                    "reason": reason,
                }),
                self.clock.now(),
            ))
            .await?;

        warn!(%key, actor, released, "Lock force-released");
        Ok(released)
    }

    /// The live lock on a key, if any.
    ///
    /// # Errors
    ///
    /// Returns the store error if the lock table cannot be read.
    pub async fn current_holder(&self, key: &LockKey) -> Result<Option<LockRecord>, StoreError> {
        let now = self.clock.now();
        Ok(self
            .store
            .find_lock(key.clone())
            .await?
            .filter(|lock| !lock.is_expired(now)))
    }

    /// Run `operation` while holding the lock, releasing it on every exit
    /// path. With `extend_every`, the lock is auto-extended meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::LockHeld`] if another holder owns the lock, or
    /// whatever `operation` returns.
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: &LockKey,
        holder: &str,
        ttl: Duration,
        extend_every: Option<Duration>,
        operation: F,
    ) -> Result<T, DrawError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DrawError>>,
    {
        let lease = match self.acquire(key, holder, ttl).await? {
            AcquireOutcome::Held { holder, expires_at } => {
                return Err(DrawError::LockHeld {
                    key: key.to_string(),
                    holder,
                    expires_at,
                });
            }
            AcquireOutcome::Acquired(record) => record.lease_id,
        };

        if let Some(interval) = extend_every {
            self.start_auto_extend(key, lease, ttl, interval);
        }
        let mut guard = ReleaseOnDrop {
            store: Arc::clone(&self.store),
            key: key.clone(),
            lease,
            extension: self.extension_abort_handle(lease),
            armed: true,
        };

        let result = operation().await;

        guard.armed = false;
        if let Err(error) = self.release(key, lease).await {
            warn!(%key, holder, error = %error, "Failed to release lock; it will expire");
        }
        result
    }

    /// Delete every expired lock.
    ///
    /// # Errors
    ///
    /// Returns the store error if the lock table cannot be cleaned.
    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let removed = self.store.delete_expired_locks(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "Expired locks cleaned up");
        }
        Ok(removed)
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `interval` until
    /// the returned task is aborted.
    #[must_use]
    pub fn spawn_cleanup_sweep(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = manager.cleanup_expired().await {
                    warn!(error = %error, "Lock cleanup sweep failed");
                }
            }
        })
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        for (_, handle) in self.extensions().drain() {
            handle.abort();
        }
    }
}

/// Releases a lock when the holding future is dropped early (cancelled or
/// unwinding). Normal completion disarms it and releases explicitly.
struct ReleaseOnDrop {
    store: Arc<dyn LockStore>,
    key: LockKey,
    lease: LeaseId,
    extension: Option<AbortHandle>,
    armed: bool,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(extension) = self.extension.take() {
            extension.abort();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let lease = self.lease;
        runtime.spawn(async move {
            if let Err(error) = store.delete_lock(key.clone(), Some(lease)).await {
                warn!(%key, error = %error, "Failed to release lock after cancellation");
            }
        });
    }
}
