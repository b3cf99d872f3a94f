//! # Sweepstake Core
//!
//! Domain types, errors and storage traits for the sweepstake draw engine.
//!
//! The engine randomly and fairly assigns an event's participants to its
//! resources, persists the mapping step by step so an interrupted draw can be
//! resumed, and supports scratching (withdrawing) resources after the draw
//! with automatic reassignment of the affected participants.
//!
//! ## Core Concepts
//!
//! - **Types** ([`types`]): events, participants, resources, assignments,
//!   checkpoints, locks and audit entries
//! - **Errors** ([`error`]): [`StoreError`] from adapters, [`DrawError`] from
//!   engine operations
//! - **Storage** ([`store`]): dyn-compatible traits implemented by the
//!   `PostgreSQL`, Redis and in-memory adapters
//! - **Reducer** ([`reducer`]): pure state transitions returning effect
//!   descriptions, used by the draw state machine
//! - **Environment** ([`environment`]): injected clock and adapters
//!
//! ## Architecture Principles
//!
//! - Functional core, imperative shell: the draw state machine is a pure
//!   reducer, the orchestrator executes its effects
//! - Dependency injection via [`environment::EngineEnvironment`]
//! - Storage failures are classified, never stringly-typed

pub mod error;
pub mod store;
pub mod types;

pub use error::{DrawError, Result, StoreError};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// Reducer module - pure state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They contain the transition rules and are deterministic and testable; a
/// separate shell executes the effects they describe.
pub mod reducer {
    use smallvec::SmallVec;

    /// Effects returned by a single reduction. Most transitions produce at
    /// most a handful, so they stay on the stack.
    pub type Effects<E> = SmallVec<[E; 4]>;

    /// The Reducer trait - core abstraction for transition logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The inputs this reducer processes
    /// - `Effect`: Descriptions of side effects the shell must execute
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for DrawMachine {
    ///     type State = DrawProgress;
    ///     type Action = DrawAction;
    ///     type Effect = DrawEffect;
    ///     type Environment = MachineEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut DrawProgress,
    ///         action: DrawAction,
    ///         env: &MachineEnvironment,
    ///     ) -> Effects<DrawEffect> {
    ///         match action {
    ///             DrawAction::Finish => smallvec![DrawEffect::DeleteCheckpoint],
    ///             _ => SmallVec::new(),
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The effect descriptions this reducer emits
        type Effect;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action against the current state
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Rejected actions leave the state untouched apart from recording
        /// the rejection, and return no effects.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Effect>;
    }
}

/// Environment module - injected dependencies
///
/// All external dependencies are abstracted behind traits and injected, so
/// production wiring and tests differ only in what is plugged in here.
pub mod environment {
    use crate::store::{
        AuditLog, CheckpointCache, CheckpointRepository, DrawStore, EventEmitter, LockStore,
        Notifier, VersionedStore,
    };
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// let clock = SystemClock;
    ///
    /// // Test - time moves only when told to
    /// let clock = ManualClock::new(test_time());
    /// clock.advance(Duration::from_secs(5));
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Every adapter the engine services need.
    ///
    /// Cloning is cheap: all members are shared handles.
    #[derive(Clone)]
    pub struct EngineEnvironment {
        /// Time source.
        pub clock: Arc<dyn Clock>,
        /// Events, participants, resources and assignments.
        pub draws: Arc<dyn DrawStore>,
        /// Lock rows.
        pub locks: Arc<dyn LockStore>,
        /// Versioned rows for compare-and-swap updates.
        pub versions: Arc<dyn VersionedStore>,
        /// Durable checkpoints.
        pub checkpoints: Arc<dyn CheckpointRepository>,
        /// Checkpoint cache.
        pub cache: Arc<dyn CheckpointCache>,
        /// Audit log.
        pub audit: Arc<dyn AuditLog>,
        /// Change listeners.
        pub emitter: Arc<dyn EventEmitter>,
        /// Participant notifications.
        pub notifier: Arc<dyn Notifier>,
    }

    impl std::fmt::Debug for EngineEnvironment {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("EngineEnvironment").finish_non_exhaustive()
        }
    }
}
