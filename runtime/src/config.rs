//! Engine tuning loaded from environment variables with sensible defaults.

use crate::retry::RetryPolicy;
use crate::shuffle::SwapIndexPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Timing and retry knobs for the draw engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a draw lock before it must be extended.
    pub lock_ttl: Duration,
    /// How often a held draw lock is extended.
    pub lock_extend_interval: Duration,
    /// How often an in-progress draw writes a checkpoint.
    pub checkpoint_interval: Duration,
    /// Maximum age of a cached checkpoint before the durable copy is used.
    pub checkpoint_freshness: Duration,
    /// Retries of a failed draw step.
    pub step_max_retries: u32,
    /// Backoff before the first step retry.
    pub step_retry_initial_delay: Duration,
    /// Cap on step retry backoff.
    pub step_retry_max_delay: Duration,
    /// How often the background sweep deletes expired locks.
    pub lock_cleanup_interval: Duration,
    /// Swap-index reduction for secure shuffles.
    pub swap_index_policy: SwapIndexPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_millis(30_000),
            lock_extend_interval: Duration::from_millis(10_000),
            checkpoint_interval: Duration::from_millis(5_000),
            checkpoint_freshness: Duration::from_secs(300),
            step_max_retries: 3,
            step_retry_initial_delay: Duration::from_millis(100),
            step_retry_max_delay: Duration::from_millis(2_000),
            lock_cleanup_interval: Duration::from_secs(60),
            swap_index_policy: SwapIndexPolicy::RejectionSampling,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to [`EngineConfig::default`].
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            lock_ttl: env_parse("DRAW_LOCK_TTL_MS")
                .map_or(defaults.lock_ttl, Duration::from_millis),
            lock_extend_interval: env_parse("DRAW_LOCK_EXTEND_INTERVAL_MS")
                .map_or(defaults.lock_extend_interval, Duration::from_millis),
            checkpoint_interval: env_parse("CHECKPOINT_INTERVAL_MS")
                .map_or(defaults.checkpoint_interval, Duration::from_millis),
            checkpoint_freshness: env_parse("CHECKPOINT_FRESHNESS_SECS")
                .map_or(defaults.checkpoint_freshness, Duration::from_secs),
            step_max_retries: env_parse("STEP_MAX_RETRIES").unwrap_or(defaults.step_max_retries),
            step_retry_initial_delay: env_parse("STEP_RETRY_INITIAL_DELAY_MS")
                .map_or(defaults.step_retry_initial_delay, Duration::from_millis),
            step_retry_max_delay: env_parse("STEP_RETRY_MAX_DELAY_MS")
                .map_or(defaults.step_retry_max_delay, Duration::from_millis),
            lock_cleanup_interval: env_parse("LOCK_CLEANUP_INTERVAL_SECS")
                .map_or(defaults.lock_cleanup_interval, Duration::from_secs),
            swap_index_policy: match env::var("SHUFFLE_SWAP_INDEX_POLICY").as_deref() {
                Ok("legacy_modulo") => SwapIndexPolicy::LegacyModulo,
                _ => defaults.swap_index_policy,
            },
        }
    }

    /// Retry policy for draw steps.
    #[must_use]
    pub fn step_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.step_max_retries)
            .initial_delay(self.step_retry_initial_delay)
            .max_delay(self.step_retry_max_delay)
            .build()
    }
}
