//! Canonical matching cascade.
//!
//! Resolves an arbitrary label (typically a model output) to the nearest
//! member of a caller-supplied enumeration. Deterministic and side-effect
//! free — the safety net that guarantees the pipeline never emits a value
//! outside the enumeration, whatever the model returned.

use std::collections::HashMap;

use crate::pipeline::types::{FolderDef, FolderLevel};

/// Label returned when no strategy matches.
pub const OTHER: &str = "Other";

/// Minimum token-overlap ratio for the final fuzzy strategy.
const TOKEN_OVERLAP_FLOOR: f32 = 0.3;

/// Static category → folder key mapping, used before the substring fallback.
const CATEGORY_FOLDER_MAP: &[(&str, &str)] = &[
    ("KYC", "kyc"),
    ("Financial Documents", "operational_model"),
    ("Legal Documents", "background"),
    ("Plans", "background"),
    ("Professional Reports", "credit_submission"),
    ("Correspondence", "correspondence"),
    ("Other", "miscellaneous"),
];

/// Resolve `candidate` to the nearest enumeration member.
///
/// Strategy order (first hit wins):
/// 1. exact case-insensitive match → confidence 1.0
/// 2. bidirectional substring containment → 0.9
/// 3. definition-keyword overlap with the candidate or context text → 0.8
/// 4. token-overlap ratio ≥ 0.3 → the ratio itself
/// 5. default `"Other"` → 0.3
pub fn resolve_canonical(
    candidate: &str,
    context: &str,
    enumeration: &[String],
    definitions: &HashMap<String, Vec<String>>,
) -> (String, f32) {
    let needle = candidate.trim().to_lowercase();

    if !needle.is_empty() {
        // 1. Exact case-insensitive match
        for member in enumeration {
            if member.to_lowercase() == needle {
                return (member.clone(), 1.0);
            }
        }

        // 2. Bidirectional substring containment
        for member in enumeration {
            let lower = member.to_lowercase();
            if lower.contains(&needle) || needle.contains(&lower) {
                return (member.clone(), 0.9);
            }
        }

        // 3. Definition-keyword overlap against candidate or context text
        let context_lower = context.to_lowercase();
        for member in enumeration {
            if let Some(keywords) = definitions.get(member) {
                let hit = keywords.iter().any(|kw| {
                    let kw = kw.to_lowercase();
                    !kw.is_empty() && (needle.contains(&kw) || context_lower.contains(&kw))
                });
                if hit {
                    return (member.clone(), 0.8);
                }
            }
        }

        // 4. Token-overlap ratio
        let mut best: Option<(&String, f32)> = None;
        for member in enumeration {
            let ratio = token_overlap_ratio(&needle, &member.to_lowercase());
            if ratio >= TOKEN_OVERLAP_FLOOR
                && best.map(|(_, b)| ratio > b).unwrap_or(true)
            {
                best = Some((member, ratio));
            }
        }
        if let Some((member, ratio)) = best {
            return (member.clone(), ratio);
        }
    }

    (OTHER.to_string(), 0.3)
}

/// Shared-token ratio between two lowercase strings, normalized by the
/// larger token count.
fn token_overlap_ratio(a: &str, b: &str) -> f32 {
    let tokens_a: Vec<&str> = a.split_whitespace().collect();
    let tokens_b: Vec<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let shared = tokens_a.iter().filter(|t| tokens_b.contains(t)).count();
    shared as f32 / tokens_a.len().max(tokens_b.len()) as f32
}

/// Resolve a filing folder for a category, preferring a proposed folder key
/// when it exists in the caller's folder set.
///
/// Order: proposed key verbatim → static category map → substring match over
/// folder keys and names → "miscellaneous" when present → first folder.
pub fn resolve_folder(category: &str, proposed: Option<&str>, folders: &[FolderDef]) -> String {
    if let Some(key) = proposed {
        let key = key.trim();
        if folders.iter().any(|f| f.folder_key == key) {
            return key.to_string();
        }
    }

    if let Some((_, mapped)) = CATEGORY_FOLDER_MAP
        .iter()
        .find(|(cat, _)| cat.eq_ignore_ascii_case(category))
    {
        if folders.iter().any(|f| f.folder_key == *mapped) {
            return (*mapped).to_string();
        }
    }

    let needle = category.to_lowercase();
    if !needle.is_empty() {
        for folder in folders {
            let key = folder.folder_key.to_lowercase();
            let name = folder.name.to_lowercase();
            if key.contains(&needle)
                || needle.contains(&key)
                || name.contains(&needle)
                || needle.contains(&name)
            {
                return folder.folder_key.clone();
            }
        }
    }

    if folders.iter().any(|f| f.folder_key == "miscellaneous") {
        return "miscellaneous".to_string();
    }

    folders
        .first()
        .map(|f| f.folder_key.clone())
        .unwrap_or_else(|| "miscellaneous".to_string())
}

/// Filing level of a folder key, defaulting to project level when unknown.
pub fn folder_level(folder_key: &str, folders: &[FolderDef]) -> FolderLevel {
    folders
        .iter()
        .find(|f| f.folder_key == folder_key)
        .map(|f| f.level)
        .unwrap_or(FolderLevel::Project)
}
