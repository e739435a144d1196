//! Reference-definition registry.
//!
//! A `DocumentReference` describes one canonical document type's identifying
//! signals: weighted namespaced tags, keywords, filename patterns, and
//! prioritized decision rules. The registry is assembled once at startup
//! from per-category catalog functions, held process-wide as an immutable
//! value, and replaced only via an explicit clear/reload operation.

pub mod catalog;
pub mod resolver;

pub use resolver::{resolve_references, resolve_references_batch, BatchDocument, ResolveRequest, ResolvedReference};

use std::sync::{Arc, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Namespace of a reference tag, controlling what the resolver matches it
/// against and how heavily it scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagNamespace {
    /// Matched against the requested document type.
    Type,
    /// Matched against supplied signals (broad domain membership).
    Domain,
    /// Matched against supplied signals (specific characteristic).
    Signal,
    /// Matched against the request's own context.
    Context,
    /// Compound signal — every '+'-joined part must be present.
    Trigger,
}

/// A weighted, namespaced tag on a reference definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceTag {
    pub namespace: TagNamespace,
    pub value: String,
    pub weight: f32,
}

impl ReferenceTag {
    pub fn new(namespace: TagNamespace, value: &str, weight: f32) -> Self {
        Self {
            namespace,
            value: value.to_string(),
            weight,
        }
    }
}

/// Action of a decision rule. `Require` doubles the rule's score
/// contribution in the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Require,
    Prefer,
    Exclude,
}

/// A prioritized condition/action pair attached to a reference definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRule {
    pub priority: u32,
    pub signals: Vec<String>,
    pub action: RuleAction,
}

/// One registry entry describing a canonical document type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub category: String,
    pub active: bool,
    pub applicable_contexts: Vec<String>,
    #[serde(default)]
    pub tags: Vec<ReferenceTag>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regex sources matched against filenames; invalid patterns are skipped.
    #[serde(default)]
    pub filename_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    /// Keywords added by the correction feedback loop, weighted separately
    /// by the verifier.
    #[serde(default)]
    pub learned_keywords: Vec<String>,
    #[serde(default)]
    pub rules: Vec<DecisionRule>,
}

impl DocumentReference {
    /// True when any filename pattern matches. Invalid regexes are ignored.
    pub fn filename_pattern_hit(&self, file_name: &str) -> Option<&str> {
        first_pattern_hit(&self.filename_patterns, file_name)
    }

    /// True when any exclude pattern matches.
    pub fn exclude_pattern_hit(&self, file_name: &str) -> Option<&str> {
        first_pattern_hit(&self.exclude_patterns, file_name)
    }
}

fn first_pattern_hit<'a>(patterns: &'a [String], file_name: &str) -> Option<&'a str> {
    for source in patterns {
        match Regex::new(&format!("(?i){source}")) {
            Ok(re) => {
                if re.is_match(file_name) {
                    return Some(source);
                }
            }
            Err(e) => {
                tracing::warn!(pattern = %source, error = %e, "Skipping invalid reference pattern");
            }
        }
    }
    None
}

/// The immutable set of reference definitions in force for this process.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRegistry {
    entries: Vec<DocumentReference>,
}

impl ReferenceRegistry {
    pub fn new(entries: Vec<DocumentReference>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DocumentReference] {
        &self.entries
    }

    /// Active entries whose applicable contexts include `context`.
    pub fn active_for_context<'a>(&'a self, context: &str) -> Vec<&'a DocumentReference> {
        self.entries
            .iter()
            .filter(|r| r.active && r.applicable_contexts.iter().any(|c| c == context))
            .collect()
    }

    pub fn by_file_type(&self, file_type: &str) -> Option<&DocumentReference> {
        self.entries
            .iter()
            .find(|r| r.file_type.eq_ignore_ascii_case(file_type))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Process-wide handle ──────────────────────────────────────

static GLOBAL_REGISTRY: RwLock<Option<Arc<ReferenceRegistry>>> = RwLock::new(None);

/// The process-wide registry, building the built-in catalog on first use.
pub fn global_registry() -> Arc<ReferenceRegistry> {
    if let Some(registry) = GLOBAL_REGISTRY.read().expect("registry lock poisoned").as_ref() {
        return Arc::clone(registry);
    }

    let mut guard = GLOBAL_REGISTRY.write().expect("registry lock poisoned");
    // Another thread may have installed it between the read and write lock.
    if let Some(registry) = guard.as_ref() {
        return Arc::clone(registry);
    }
    let built = Arc::new(catalog::builtin());
    *guard = Some(Arc::clone(&built));
    tracing::info!(entries = built.len(), "Reference registry initialized");
    built
}

/// Replace the process-wide registry with an explicit value.
pub fn install_registry(registry: ReferenceRegistry) {
    let mut guard = GLOBAL_REGISTRY.write().expect("registry lock poisoned");
    tracing::info!(entries = registry.len(), "Reference registry replaced");
    *guard = Some(Arc::new(registry));
}

/// Drop the process-wide registry so the next access rebuilds it.
pub fn clear_registry() {
    let mut guard = GLOBAL_REGISTRY.write().expect("registry lock poisoned");
    *guard = None;
    tracing::info!("Reference registry cleared");
}
