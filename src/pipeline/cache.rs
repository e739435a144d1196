//! Classification cache.
//!
//! Keyed by a content hash of the extracted text, never the filename.
//! Entries are marked invalid (not deleted) when a correction is recorded
//! for the same hash, so corrected content immediately stops hitting the
//! cache. The storage itself is a host-owned seam; `MemoryCache` is the
//! in-process implementation.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

use crate::pipeline::types::CacheEntry;

/// Characters of extracted text that participate in the hash. Texts
/// identical up to this point hash identically.
pub const HASH_PREFIX_CHARS: usize = 10_000;

/// Minimum final confidence for a cache write.
pub const CACHE_SAVE_THRESHOLD: f32 = 0.7;

/// Content hash of extracted text: djb2 rolling hash (seed 5381,
/// `h = h*33 + char`, 32-bit wraparound) over the first 10,000 characters
/// of the lowercased, trimmed text, rendered as 8 hex digits.
pub fn content_hash(text: &str) -> String {
    let prepared = text.trim().to_lowercase();
    let mut hash: u32 = 5381;
    for ch in prepared.chars().take(HASH_PREFIX_CHARS) {
        hash = hash.wrapping_mul(33).wrapping_add(ch as u32);
    }
    format!("{hash:08x}")
}

/// Masking patterns, compiled once per process.
struct FilenameMasks {
    uuid: Regex,
    date: Regex,
    timestamp: Regex,
    hex_run: Regex,
    year: Regex,
    separators: Regex,
}

fn filename_masks() -> &'static FilenameMasks {
    static MASKS: OnceLock<FilenameMasks> = OnceLock::new();
    MASKS.get_or_init(|| FilenameMasks {
        uuid: Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
            .expect("static regex"),
        date: Regex::new(r"\d{4}[-_.]\d{1,2}[-_.]\d{1,2}|\d{1,2}[-_.]\d{1,2}[-_.]\d{4}")
            .expect("static regex"),
        timestamp: Regex::new(r"\d{10,13}").expect("static regex"),
        hex_run: Regex::new(r"[0-9a-f]{8,}").expect("static regex"),
        year: Regex::new(r"\b(19|20)\d{2}\b").expect("static regex"),
        separators: Regex::new(r"[-_.\s]+").expect("static regex"),
    })
}

/// Normalize a filename for analytics and grouping: mask dates, timestamps,
/// UUIDs, and long hex runs, then collapse separators. Computed alongside
/// every cache write but never part of lookup equality.
pub fn normalize_filename(file_name: &str) -> String {
    let lower = file_name.to_lowercase();
    let masks = filename_masks();

    // Masking order matters: UUIDs before generic hex runs, dates before
    // bare digit runs.
    let masked = masks.uuid.replace_all(&lower, "{uuid}");
    let masked = masks.date.replace_all(&masked, "{date}");
    let masked = masks.timestamp.replace_all(&masked, "{ts}");
    let masked = masks.hex_run.replace_all(&masked, "{hex}");
    let masked = masks.year.replace_all(&masked, "{date}");
    let collapsed = masks.separators.replace_all(&masked, "_");

    collapsed.trim_matches('_').to_string()
}

/// Host-owned cache seam. Implementations must treat invalid entries as
/// misses.
pub trait ClassificationCache: Send + Sync {
    /// Look up a valid entry for the hash, bumping its hit count.
    fn check(&self, content_hash: &str) -> Option<CacheEntry>;
    /// Store (or replace) the entry for its hash.
    fn save(&self, entry: CacheEntry);
    /// Mark every entry with this hash invalid. Entries are never removed.
    fn invalidate(&self, content_hash: &str);
}

/// In-process cache for hosts without persistent storage, and for tests.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, valid or not.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassificationCache for MemoryCache {
    fn check(&self, content_hash: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get_mut(content_hash) {
            Some(entry) if entry.valid => {
                entry.hit_count += 1;
                Some(entry.clone())
            }
            _ => None,
        }
    }

    fn save(&self, entry: CacheEntry) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(entry.content_hash.clone(), entry);
    }

    fn invalidate(&self, content_hash: &str) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        if let Some(entry) = entries.get_mut(content_hash) {
            entry.valid = false;
            tracing::info!(content_hash, "Cache entry invalidated by correction");
        }
    }
}
