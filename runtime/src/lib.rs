//! # Sweepstake Runtime
//!
//! The draw engine: randomization, allocation, locking, checkpointing, the
//! draw orchestrator and the scratch service.
//!
//! ## Core Components
//!
//! - **Shuffle**: seeded (reproducible) and secure Fisher–Yates shuffles
//! - **Allocator**: round-robin mapping of participants onto resources
//! - **Lock manager**: TTL locks with auto-extension and a cleanup sweep
//! - **Compare-and-swap**: versioned updates with conflict reporting
//! - **Checkpoint store**: cache-plus-durable snapshots of running draws
//! - **Draw orchestrator**: drives the [`machine::DrawMachine`] reducer
//! - **Scratch service**: withdraws resources and reassigns participants
//!
//! ## Example
//!
//! ```ignore
//! use sweepstake_runtime::{DrawOptions, DrawOrchestrator, EngineConfig};
//!
//! let orchestrator = DrawOrchestrator::new(environment, EngineConfig::from_env());
//! let outcome = orchestrator
//!     .execute_draw(event_id, DrawOptions::all("admin").with_seed("derby-2025"))
//!     .await?;
//! println!("{} assignments, seed {}", outcome.assignments.len(), outcome.stats.seed);
//! ```

/// Round-robin allocation and load ranking
pub mod allocator;

/// Optimistic compare-and-swap updates
pub mod cas;

/// Two-tier checkpoint storage
pub mod checkpoint;

/// Engine configuration from environment variables
pub mod config;

/// TTL lock manager
pub mod lock;

/// Draw lifecycle state machine
pub mod machine;

/// Prometheus metrics for observability
pub mod metrics;

/// Draw orchestration
pub mod orchestrator;

/// Retry logic with exponential backoff
pub mod retry;

/// Resource scratching and reassignment
pub mod scratch;

/// Seeded and secure shuffles
pub mod shuffle;

pub use cas::{CasOutcome, VersionedUpdater};
pub use checkpoint::CheckpointStore;
pub use config::EngineConfig;
pub use lock::{AcquireOutcome, LockManager};
pub use machine::{DrawAction, DrawEffect, DrawMachine, DrawProgress};
pub use orchestrator::{
    DrawOptions, DrawOrchestrator, DrawOutcome, DrawStats, DrawStatusReport, DrawType,
    ResetOutcome, SINGLE_DRAW_SEED,
};
pub use retry::RetryPolicy;
pub use scratch::{BulkScratchItem, BulkScratchResult, ScratchOptions, ScratchOutcome, ScratchService};
pub use shuffle::SwapIndexPolicy;
