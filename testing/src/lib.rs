//! # Sweepstake Testing
//!
//! Testing utilities and helpers for the sweepstake draw engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - In-memory storage adapters with fault injection ([`InMemoryDrawStore`],
//!   [`InMemoryCheckpointCache`])
//! - Recording emitter and notifier doubles
//! - [`TestEngine`], which wires all of the above into an
//!   [`EngineEnvironment`](sweepstake_core::environment::EngineEnvironment)
//! - A Given-When-Then harness for reducers ([`ReducerTest`])
//! - proptest strategies for draw inputs
//!
//! ## Example
//!
//! ```ignore
//! use sweepstake_testing::TestEngine;
//! use sweepstake_runtime::{DrawOrchestrator, DrawOptions};
//!
//! #[tokio::test]
//! async fn draws_everyone() {
//!     let engine = TestEngine::new();
//!     let event_id = engine.seeded_event(5, 3);
//!     let orchestrator = DrawOrchestrator::new(engine.environment(), fast_config());
//!
//!     let outcome = orchestrator
//!         .execute_draw(event_id, DrawOptions::all("admin"))
//!         .await
//!         .unwrap();
//!     assert_eq!(outcome.assignments.len(), 5);
//! }
//! ```

use chrono::{DateTime, Utc};
use sweepstake_core::environment::Clock;

pub mod memory;
pub mod recording;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use sweepstake_testing::mocks::FixedClock;
    /// use sweepstake_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to
    ///
    /// Used for lock expiry and checkpoint freshness tests.
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Move the clock forward
        ///
        /// # Panics
        ///
        /// Panics if `by` does not fit in a chrono duration.
        #[allow(clippy::expect_used)]
        pub fn advance(&self, by: std::time::Duration) {
            let delta = chrono::Duration::from_std(by).expect("duration should fit");
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += delta;
        }

        /// Jump to a specific time
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The timestamp behind [`test_clock`]
    ///
    /// # Panics
    ///
    /// Never in practice; the timestamp is hardcoded.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

/// Test helpers and utilities
pub mod helpers {
    use crate::memory::{InMemoryCheckpointCache, InMemoryDrawStore};
    use crate::mocks::{ManualClock, test_time};
    use crate::recording::{RecordingEmitter, RecordingNotifier};
    use std::sync::Arc;
    use sweepstake_core::environment::EngineEnvironment;
    use sweepstake_core::types::EventId;

    /// All in-memory adapters of one test, sharing state with the
    /// environment handed to the engine.
    #[derive(Debug, Clone)]
    pub struct TestEngine {
        /// Durable store double.
        pub store: InMemoryDrawStore,
        /// Checkpoint cache double.
        pub cache: InMemoryCheckpointCache,
        /// Published mutations.
        pub emitter: RecordingEmitter,
        /// Delivered notifications.
        pub notifier: RecordingNotifier,
        /// Manually driven clock.
        pub clock: Arc<ManualClock>,
    }

    impl TestEngine {
        /// Fresh adapters with the clock at 2025-01-01 00:00:00 UTC.
        #[must_use]
        pub fn new() -> Self {
            Self {
                store: InMemoryDrawStore::new(),
                cache: InMemoryCheckpointCache::new(),
                emitter: RecordingEmitter::new(),
                notifier: RecordingNotifier::new(),
                clock: Arc::new(ManualClock::new(test_time())),
            }
        }

        /// Environment backed by this engine's adapters.
        #[must_use]
        pub fn environment(&self) -> EngineEnvironment {
            let store = Arc::new(self.store.clone());
            EngineEnvironment {
                clock: self.clock.clone(),
                draws: store.clone(),
                locks: store.clone(),
                versions: store.clone(),
                checkpoints: store.clone(),
                cache: Arc::new(self.cache.clone()),
                audit: store,
                emitter: Arc::new(self.emitter.clone()),
                notifier: Arc::new(self.notifier.clone()),
            }
        }

        /// Create an event with `participants` participants and resources
        /// numbered `1..=resources`.
        #[must_use]
        pub fn seeded_event(&self, participants: usize, resources: u32) -> EventId {
            let event_id = self.store.create_event("Test Cup");
            self.store.add_participants(event_id, participants);
            self.store.add_resources(event_id, resources);
            event_id
        }
    }

    impl Default for TestEngine {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Install a fmt subscriber honoring `RUST_LOG`, once per process.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Seeds as users type them: short alphanumeric strings.
    pub fn seed_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9-]{1,24}"
    }

    /// Participant and resource counts for one draw, both at least 1.
    pub fn draw_size_strategy() -> impl Strategy<Value = (usize, usize)> {
        (1usize..60, 1usize..20)
    }
}

// Re-export commonly used items
pub use helpers::{TestEngine, init_tracing};
pub use memory::{InMemoryCheckpointCache, InMemoryDrawStore, InsertFault};
pub use mocks::{FixedClock, ManualClock, test_clock, test_time};
pub use recording::{RecordingEmitter, RecordingNotifier};
pub use reducer_test::ReducerTest;
