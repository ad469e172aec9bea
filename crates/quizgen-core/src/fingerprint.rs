//! Content fingerprinting for request deduplication.
//!
//! The digest is built from category-tagged sections in a fixed order
//! (`text`, `files`, `urls`, `activities`, `bulk`). List inputs are sorted
//! first and every item is length-prefixed, so reordering a list never changes
//! the hash while any changed byte does.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::models::ContentInputs;

/// Prefix carried by every content hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Compute the stable content hash for a set of inputs.
pub fn fingerprint(inputs: &ContentInputs) -> String {
    let mut hasher = Sha256::new();

    section(&mut hasher, "text", 1);
    item(&mut hasher, inputs.text.as_deref().unwrap_or("").as_bytes());

    let mut files: Vec<(&str, u64)> = inputs
        .files
        .iter()
        .map(|f| (f.name.as_str(), f.size))
        .collect();
    files.sort_unstable();
    section(&mut hasher, "files", files.len());
    for (name, size) in files {
        item(&mut hasher, name.as_bytes());
        item(&mut hasher, &size.to_be_bytes());
    }

    let mut urls: Vec<&str> = inputs.urls.iter().map(String::as_str).collect();
    urls.sort_unstable();
    section(&mut hasher, "urls", urls.len());
    for url in urls {
        item(&mut hasher, url.as_bytes());
    }

    let mut activities: Vec<(&str, i64, &str)> = inputs
        .activities
        .iter()
        .map(|a| (a.kind.as_str(), a.id, a.name.as_str()))
        .collect();
    activities.sort_unstable();
    section(&mut hasher, "activities", activities.len());
    for (kind, id, name) in activities {
        item(&mut hasher, kind.as_bytes());
        item(&mut hasher, &id.to_be_bytes());
        item(&mut hasher, name.as_bytes());
    }

    let bulk = inputs.bulk;
    section(&mut hasher, "bulk", 3);
    for flag in [
        bulk.whole_collection,
        bulk.include_resources,
        bulk.include_activities,
    ] {
        item(&mut hasher, &[flag as u8]);
    }

    format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize()))
}

fn section(hasher: &mut Sha256, tag: &str, count: usize) {
    hasher.update(tag.as_bytes());
    hasher.update((count as u64).to_be_bytes());
}

fn item(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Lookup key for clone-on-hit reuse of a prior completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub owner_id: i64,
    pub collection_id: i64,
    pub content_hash: String,
    /// Only requests created at or after this instant qualify.
    pub not_before: DateTime<Utc>,
}

impl DedupKey {
    pub fn new(
        owner_id: i64,
        collection_id: i64,
        content_hash: impl Into<String>,
        now: DateTime<Utc>,
        window_days: i64,
    ) -> Self {
        Self {
            owner_id,
            collection_id,
            content_hash: content_hash.into(),
            not_before: now - Duration::days(window_days),
        }
    }
}
