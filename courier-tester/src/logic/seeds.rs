use anyhow::{Result, bail};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Seed used when the command line names none.
pub const DEFAULT_SEED: u64 = 1337;

/// Upper bound for `sweep:N` tokens.
const MAX_SWEEP: usize = 10_000;

/// Seed metadata used for logic and playability analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInfo {
    pub seed: u64,
    /// The text a hashed seed came from.
    pub phrase: Option<String>,
}

impl SeedInfo {
    #[must_use]
    pub const fn from_numeric(seed: u64) -> Self {
        Self { seed, phrase: None }
    }

    /// Hash a free-text phrase into a seed so runs can be named, e.g. `rainy-monday`.
    #[must_use]
    pub fn from_phrase(phrase: &str) -> Self {
        let digest = Sha256::digest(phrase.trim().to_lowercase().as_bytes());
        let mut bytes = [0_u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            seed: u64::from_be_bytes(bytes),
            phrase: Some(phrase.trim().to_string()),
        }
    }

    /// Short label used in reports.
    #[must_use]
    pub fn code(&self) -> String {
        self.phrase
            .clone()
            .unwrap_or_else(|| format!("{:016X}", self.seed))
    }
}

/// Reproducible pseudo-random seed list derived from `base`.
#[must_use]
pub fn sweep_seeds(base: u64, count: usize) -> Vec<SeedInfo> {
    let mut rng = ChaCha8Rng::seed_from_u64(base);
    (0..count)
        .map(|_| SeedInfo::from_numeric(rng.next_u64()))
        .collect()
}

/// Resolve CLI seed arguments into canonical seed metadata.
///
/// Supports integers, `sweep:N` for N seeds drawn from the default seed,
/// and any other text, which is hashed into a seed.
///
/// # Errors
///
/// Fails on a malformed or oversized `sweep:` token.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<SeedInfo>> {
    let mut pending: Vec<SeedInfo> = Vec::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some(count) = token.strip_prefix("sweep:") {
            let Ok(count) = count.parse::<usize>() else {
                bail!("Unrecognized sweep size in seed token: {token}");
            };
            if count == 0 || count > MAX_SWEEP {
                bail!("Sweep size must be between 1 and {MAX_SWEEP} (got {count})");
            }
            pending.extend(sweep_seeds(DEFAULT_SEED, count));
            continue;
        }

        if let Ok(value) = token.parse::<u64>() {
            pending.push(SeedInfo::from_numeric(value));
            continue;
        }

        if let Ok(value) = token.parse::<i64>() {
            pending.push(SeedInfo::from_numeric(value.unsigned_abs()));
            continue;
        }

        pending.push(SeedInfo::from_phrase(token));
    }

    let mut seen = HashSet::new();
    pending.retain(|info| seen.insert(info.seed));

    if pending.is_empty() {
        pending.push(SeedInfo::from_numeric(DEFAULT_SEED));
    }

    Ok(pending)
}
