//! Fisher-Yates shuffling with two randomness sources.
//!
//! # Modes
//!
//! - **Seeded**: a linear congruential generator derived from a seed string.
//!   The same seed and input always give the same order, which makes a draw
//!   replayable for audits. Not suitable for adversarial fairness.
//! - **Secure**: indices come from the operating system CSPRNG via
//!   [`OsRng`]. Swap indices use rejection sampling so every index in
//!   `[0, i]` is equally likely; [`SwapIndexPolicy::LegacyModulo`] restores
//!   plain modulo reduction for compatibility with historical draws.
//!
//! # Seeded generator
//!
//! The seed string is hashed as `hash = hash * 31 + code_point` in wrapping
//! 32-bit signed arithmetic, and `|hash|` starts the sequence
//! `state = (state * 9301 + 49297) % 233280`. Each step yields
//! `state / 233280` in `[0, 1)`, and the swap partner of position `i` is
//! `floor(r * (i + 1))`.

use rand::RngCore;
use rand::rngs::OsRng;

/// LCG multiplier.
pub const LCG_MULTIPLIER: u64 = 9301;
/// LCG increment.
pub const LCG_INCREMENT: u64 = 49297;
/// LCG modulus.
pub const LCG_MODULUS: u64 = 233_280;

/// How secure mode reduces a random word to a swap index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapIndexPolicy {
    /// Reject words from the incomplete top range; unbiased.
    #[default]
    RejectionSampling,
    /// `word % (i + 1)`; slightly biased toward low indices.
    LegacyModulo,
}

/// Which source produced a shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    /// Deterministic LCG from the reported seed.
    Seeded,
    /// Operating system CSPRNG; the reported seed is for reference only.
    Secure,
}

/// Result of [`shuffle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shuffled<T> {
    /// The permuted items.
    pub items: Vec<T>,
    /// Seed that was used, or freshly generated in secure mode.
    pub seed: String,
    /// Source of randomness.
    pub mode: ShuffleMode,
}

/// Deterministic generator driven by a seed string.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    state: u64,
}

impl SeededRandom {
    /// Derive the generator state from a seed string.
    #[must_use]
    pub fn from_seed(seed: &str) -> Self {
        let hash = seed.chars().fold(0i32, |hash, c| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add_unsigned(u32::from(c))
        });
        Self {
            state: u64::from(hash.unsigned_abs()),
        }
    }

    /// Next value in `[0, 1)`.
    #[allow(clippy::cast_precision_loss)] // both operands are below 2^18
    pub fn next_unit(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }

    /// Next index in `[0, bound)`. `bound` must be non-zero.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn next_index(&mut self, bound: usize) -> usize {
        let index = (self.next_unit() * bound as f64).floor() as usize;
        index.min(bound.saturating_sub(1))
    }
}

/// Uniform index in `[0, bound)` from a CSPRNG word. `bound` must be non-zero.
pub fn secure_index<R: RngCore + ?Sized>(
    rng: &mut R,
    bound: usize,
    policy: SwapIndexPolicy,
) -> usize {
    let bound = u64::try_from(bound).unwrap_or(u64::MAX).max(1);
    let index = match policy {
        SwapIndexPolicy::LegacyModulo => rng.next_u64() % bound,
        SwapIndexPolicy::RejectionSampling => {
            // Largest multiple of `bound` that fits in 2^64; words at or above
            // it would favor low indices.
            let zone = (u128::from(u64::MAX) + 1) / u128::from(bound) * u128::from(bound);
            loop {
                let word = rng.next_u64();
                if u128::from(word) < zone {
                    break word % bound;
                }
            }
        }
    };
    usize::try_from(index).unwrap_or(usize::MAX)
}

/// Shuffle deterministically from `seed`.
#[must_use]
pub fn shuffle_seeded<T>(mut items: Vec<T>, seed: &str) -> Vec<T> {
    let mut random = SeededRandom::from_seed(seed);
    for i in (1..items.len()).rev() {
        let j = random.next_index(i + 1);
        items.swap(i, j);
    }
    items
}

/// Shuffle with randomness from `rng`.
#[must_use]
pub fn shuffle_with_rng<T, R: RngCore + ?Sized>(
    mut items: Vec<T>,
    rng: &mut R,
    policy: SwapIndexPolicy,
) -> Vec<T> {
    for i in (1..items.len()).rev() {
        let j = secure_index(rng, i + 1, policy);
        items.swap(i, j);
    }
    items
}

/// Shuffle with the operating system CSPRNG.
#[must_use]
pub fn shuffle_secure<T>(items: Vec<T>, policy: SwapIndexPolicy) -> Vec<T> {
    shuffle_with_rng(items, &mut OsRng, policy)
}

/// 256-bit random seed, hex encoded.
#[must_use]
pub fn generate_seed() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Shuffle seeded when `seed` is given, securely otherwise.
///
/// The returned seed is the given one, or a generated one in secure mode so
/// the draw can still be referenced in audit records.
#[must_use]
pub fn shuffle<T>(items: Vec<T>, seed: Option<&str>, policy: SwapIndexPolicy) -> Shuffled<T> {
    match seed {
        Some(seed) => Shuffled {
            items: shuffle_seeded(items, seed),
            seed: seed.to_string(),
            mode: ShuffleMode::Seeded,
        },
        None => Shuffled {
            items: shuffle_secure(items, policy),
            seed: generate_seed(),
            mode: ShuffleMode::Secure,
        },
    }
}
