//! Correction retrieval tiers.
//!
//! Human corrections are the pipeline's only training signal. The tier
//! selector decides how much historical context the critic stage needs;
//! the context dispatcher performs the per-tier fetches against the
//! host-owned correction store. Selection is pure and tested independently
//! of any I/O.

use std::sync::Mutex;

use crate::pipeline::cache::ClassificationCache;
use crate::pipeline::types::{
    ClassificationDecision, ConfusionPair, ConsolidatedRule, ContextTier, CorrectionRecord,
};

/// Maximum alternative types carried into confusion pairs.
const MAX_ALTERNATIVES: usize = 3;

/// Commonly-confused type pairs, keyed by the current file type.
const CONFUSED_TYPES: &[(&str, &[&str])] = &[
    ("Bank Statement", &["Financial Statements", "Financial Model"]),
    ("Financial Statements", &["Bank Statement", "Tax Return"]),
    ("Passport", &["Driving Licence", "Proof of Address"]),
    ("Valuation Report", &["Survey Report"]),
    ("Lease Agreement", &["Loan Agreement", "Tenancy Agreement"]),
    ("Financial Model", &["Financial Statements"]),
    ("Track Record", &["CV"]),
];

/// Decide how much correction context to retrieve for the critic.
///
/// Boundaries are exact: confidence > 0.85 with no alternatives needs
/// nothing; ≥ 0.65 gets consolidated rules; ≥ 0.5 gets targeted records;
/// anything lower gets full records.
pub fn select_tier(confidence: f32, has_alternatives: bool) -> ContextTier {
    if confidence > 0.85 && !has_alternatives {
        ContextTier::None
    } else if confidence >= 0.65 {
        ContextTier::Consolidated
    } else if confidence >= 0.5 {
        ContextTier::Targeted
    } else {
        ContextTier::Full
    }
}

/// Extract the label sets the pipeline is currently uncertain between:
/// the decision's alternatives (deduplicated, capped at 3) unioned with the
/// static commonly-confused table for the current file type.
pub fn confusion_pairs(decision: &ClassificationDecision) -> Vec<ConfusionPair> {
    let mut options: Vec<String> = vec![decision.file_type.clone()];

    for alternative in decision.alternative_types.iter().take(MAX_ALTERNATIVES) {
        if !options.iter().any(|o| o.eq_ignore_ascii_case(alternative)) {
            options.push(alternative.clone());
        }
    }

    if let Some((_, confused)) = CONFUSED_TYPES
        .iter()
        .find(|(file_type, _)| file_type.eq_ignore_ascii_case(&decision.file_type))
    {
        for candidate in *confused {
            if !options.iter().any(|o| o.eq_ignore_ascii_case(candidate)) {
                options.push(candidate.to_string());
            }
        }
    }

    if options.len() < 2 {
        return Vec::new();
    }

    vec![ConfusionPair {
        field: "fileType".to_string(),
        options,
    }]
}

/// Host-owned correction store. Read-only to the pipeline apart from
/// `record_correction`, which the host calls when a human edits a filed
/// classification.
pub trait CorrectionStore: Send + Sync {
    /// Most relevant correction records, newest first.
    fn fetch_corrections(&self, limit: usize) -> Vec<CorrectionRecord>;
    /// Aggregated from→to rules sorted by occurrence count, highest first.
    fn fetch_consolidated_rules(&self, limit: usize) -> Vec<ConsolidatedRule>;
    /// Records filtered to the active confusion pairs.
    fn fetch_targeted_corrections(
        &self,
        pairs: &[ConfusionPair],
        limit: usize,
    ) -> Vec<CorrectionRecord>;
    fn record_correction(&self, record: CorrectionRecord);
}

/// Correction context handed to the critic, shaped by the selected tier.
#[derive(Debug, Clone)]
pub enum CorrectionContext {
    None,
    Consolidated(Vec<ConsolidatedRule>),
    Targeted {
        corrections: Vec<CorrectionRecord>,
        rules: Vec<ConsolidatedRule>,
    },
    Full(Vec<CorrectionRecord>),
}

impl CorrectionContext {
    pub fn is_empty(&self) -> bool {
        match self {
            CorrectionContext::None => true,
            CorrectionContext::Consolidated(rules) => rules.is_empty(),
            CorrectionContext::Targeted { corrections, rules } => {
                corrections.is_empty() && rules.is_empty()
            }
            CorrectionContext::Full(records) => records.is_empty(),
        }
    }
}

/// Fetch the correction context for a tier. Pure selection lives in
/// `select_tier`; this is the side-effecting dispatcher.
pub fn fetch_correction_context(
    store: &dyn CorrectionStore,
    tier: ContextTier,
    decision: &ClassificationDecision,
) -> CorrectionContext {
    match tier {
        ContextTier::None => CorrectionContext::None,
        ContextTier::Consolidated => {
            CorrectionContext::Consolidated(store.fetch_consolidated_rules(5))
        }
        ContextTier::Targeted => {
            let pairs = confusion_pairs(decision);
            CorrectionContext::Targeted {
                corrections: store.fetch_targeted_corrections(&pairs, 3),
                rules: store.fetch_consolidated_rules(3),
            }
        }
        ContextTier::Full => CorrectionContext::Full(store.fetch_corrections(5)),
    }
}

/// Record a human correction and invalidate every cache entry sharing its
/// content hash — the mechanism by which corrections immediately stop the
/// pipeline repeating the same mistake on identical content.
pub fn record_correction(
    store: &dyn CorrectionStore,
    cache: &dyn ClassificationCache,
    record: CorrectionRecord,
) {
    let content_hash = record.content_hash.clone();
    tracing::info!(
        content_hash = %content_hash,
        field = %record.field,
        from = %record.from_value,
        to = %record.to_value,
        "Recording classification correction"
    );
    store.record_correction(record);
    cache.invalidate(&content_hash);
}

/// In-process correction store for hosts without persistence, and tests.
#[derive(Default)]
pub struct MemoryCorrectionStore {
    records: Mutex<Vec<CorrectionRecord>>,
}

impl MemoryCorrectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CorrectionStore for MemoryCorrectionStore {
    fn fetch_corrections(&self, limit: usize) -> Vec<CorrectionRecord> {
        let records = self.records.lock().expect("store lock poisoned");
        let mut out: Vec<CorrectionRecord> = records.clone();
        out.sort_by(|a, b| b.corrected_at.cmp(&a.corrected_at));
        out.truncate(limit);
        out
    }

    fn fetch_consolidated_rules(&self, limit: usize) -> Vec<ConsolidatedRule> {
        let records = self.records.lock().expect("store lock poisoned");
        let mut rules: Vec<ConsolidatedRule> = Vec::new();
        for record in records.iter() {
            match rules.iter_mut().find(|r| {
                r.field == record.field
                    && r.from_value == record.from_value
                    && r.to_value == record.to_value
            }) {
                Some(rule) => rule.occurrence_count += 1,
                None => rules.push(ConsolidatedRule {
                    field: record.field.clone(),
                    from_value: record.from_value.clone(),
                    to_value: record.to_value.clone(),
                    occurrence_count: 1,
                }),
            }
        }
        rules.sort_by(|a, b| b.occurrence_count.cmp(&a.occurrence_count));
        rules.truncate(limit);
        rules
    }

    fn fetch_targeted_corrections(
        &self,
        pairs: &[ConfusionPair],
        limit: usize,
    ) -> Vec<CorrectionRecord> {
        let records = self.records.lock().expect("store lock poisoned");
        let mut out: Vec<CorrectionRecord> = records
            .iter()
            .filter(|record| {
                pairs.iter().any(|pair| {
                    pair.field == record.field
                        && (pair.options.iter().any(|o| o.eq_ignore_ascii_case(&record.from_value))
                            || pair.options.iter().any(|o| o.eq_ignore_ascii_case(&record.to_value)))
                })
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| b.corrected_at.cmp(&a.corrected_at));
        out.truncate(limit);
        out
    }

    fn record_correction(&self, record: CorrectionRecord) {
        self.records.lock().expect("store lock poisoned").push(record);
    }
}
