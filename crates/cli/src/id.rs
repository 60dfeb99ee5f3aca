// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use sb_core::EntityType;

/// Generate a short id from a prefix, a seed, and a timestamp.
/// Format: {prefix}-{hash} where hash is first 8 hex chars of SHA256(seed + timestamp)
pub fn generate_id(prefix: &str, seed: &str, at: &DateTime<Utc>) -> String {
    let input = format!("{}{}", seed, at.to_rfc3339());
    let hash = Sha256::digest(input.as_bytes());
    let short_hash = hex::encode(&hash[..4]); // First 8 hex chars (4 bytes)
    format!("{}-{}", prefix, short_hash)
}

/// Generate a unique id, handling collisions by appending an incrementing suffix.
pub fn generate_unique_id<F>(prefix: &str, seed: &str, at: &DateTime<Utc>, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let base_id = generate_id(prefix, seed, at);

    if !exists(&base_id) {
        return base_id;
    }

    let mut suffix = 2;
    loop {
        let id = format!("{}-{}", base_id, suffix);
        if !exists(&id) {
            return id;
        }
        suffix += 1;
    }
}

/// Generate an id for a new record, e.g. `cus-1a2b3c4d`.
pub fn generate_record_id<F>(entity: EntityType, seed: &str, at: &DateTime<Utc>, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    generate_unique_id(entity.id_prefix(), seed, at, exists)
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
