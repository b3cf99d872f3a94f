//! `PostgreSQL` storage for the sweepstake draw engine.
//!
//! [`PostgresDrawStore`] implements every durable storage trait of
//! `sweepstake-core` on top of a single `sqlx` pool:
//!
//! - events, participants, resources and soft-deleted assignments
//! - lock rows whose primary key makes acquisition atomic
//! - version-checked updates on events and resources
//! - JSONB checkpoints and the audit log
//!
//! Assignment uniqueness is enforced by partial unique indexes that only
//! cover rows with `deleted_at IS NULL`, so a participant can be reassigned
//! after a scratch while the old row stays as history.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sweepstake_postgres::PostgresDrawStore;
//!
//! let store = Arc::new(PostgresDrawStore::connect(&database_url, 10).await?);
//! store.migrate().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checkpoints;
mod error;
mod locks;
mod store;
mod versioned;

pub use error::SetupError;
pub use store::PostgresDrawStore;
