//! Core data model for the classification pipeline.
//!
//! Everything that crosses the host boundary is serde-derived with camelCase
//! field names. Types owned by a single request (summary, decision, checklist
//! matches) are plain values — the orchestrator threads them through stages
//! and only the last-written decision is authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════
// Document summary
// ═══════════════════════════════════════════════════════════

/// Structured summary of one document, produced once per request by the
/// summary stage and immutable afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub description: String,
    pub purpose: String,
    pub people: Vec<String>,
    pub companies: Vec<String>,
    pub locations: Vec<String>,
    pub projects: Vec<String>,
    pub key_terms: Vec<String>,
    pub key_dates: Vec<String>,
    pub key_amounts: Vec<String>,
    pub is_financial: bool,
    pub is_legal: bool,
    pub is_identity: bool,
    pub is_report: bool,
    pub is_design: bool,
    pub is_correspondence: bool,
    pub is_multi_project: bool,
    pub is_internal: bool,
    pub content_type_guess: String,
    pub analysis_confidence: f32,
}

impl DocumentSummary {
    /// Short tokens describing the document's observed characteristics,
    /// matched against reference tags by the resolver.
    pub fn signals(&self) -> Vec<String> {
        let flags = [
            (self.is_financial, "financial"),
            (self.is_legal, "legal"),
            (self.is_identity, "identity"),
            (self.is_report, "report"),
            (self.is_design, "design"),
            (self.is_correspondence, "correspondence"),
            (self.is_multi_project, "multi_project"),
            (self.is_internal, "internal"),
        ];
        flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| name.to_string())
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════
// Classification decision
// ═══════════════════════════════════════════════════════════

/// A classification produced by one stage. Mutates across the pipeline:
/// the classification stage writes it, the verifier may override it, and
/// the critic's output supersedes everything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationDecision {
    pub file_type: String,
    pub category: String,
    pub suggested_folder: String,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(default)]
    pub alternative_types: Vec<String>,
}

/// Confidence band communicated outward; the sole trust signal at the
/// pipeline boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFlag {
    High,
    Medium,
    Low,
}

/// High/medium band thresholds.
pub const HIGH_CONFIDENCE: f32 = 0.85;
pub const MEDIUM_CONFIDENCE: f32 = 0.65;

impl ConfidenceFlag {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            ConfidenceFlag::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            ConfidenceFlag::Medium
        } else {
            ConfidenceFlag::Low
        }
    }
}

/// Per-candidate-type score from the deterministic verifier.
/// Computed fresh on every verification call, never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordScore {
    pub file_type: String,
    pub score: f32,
    pub matched_keywords: Vec<String>,
    pub matched_patterns: Vec<String>,
    pub exclusion_applied: bool,
    pub correction_boosted: bool,
}

// ═══════════════════════════════════════════════════════════
// Checklist
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Missing,
    Pending,
    Fulfilled,
}

/// An outstanding document the host is still waiting for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
    /// Document-type aliases that would fulfil this item.
    #[serde(default)]
    pub acceptable_types: Vec<String>,
    pub status: ItemStatus,
}

/// A proposed match between the current document and a checklist item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistMatch {
    pub item_id: String,
    pub confidence: f32,
    pub reasoning: String,
}

// ═══════════════════════════════════════════════════════════
// Corrections and derived views
// ═══════════════════════════════════════════════════════════

/// A human override of a prior classification. Created by the host whenever
/// a filed classification is edited; read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRecord {
    pub id: Uuid,
    pub content_hash: String,
    /// Which field was corrected ("fileType" or "category").
    pub field: String,
    pub from_value: String,
    pub to_value: String,
    pub relevance: f32,
    pub corrected_at: DateTime<Utc>,
}

/// Aggregated "fromValue → toValue" correction pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedRule {
    pub field: String,
    pub from_value: String,
    pub to_value: String,
    pub occurrence_count: u32,
}

/// A field plus the small set of labels the pipeline is currently
/// uncertain between.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfusionPair {
    pub field: String,
    pub options: Vec<String>,
}

/// How much historical-correction context the critic stage retrieves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTier {
    None,
    Consolidated,
    Targeted,
    Full,
}

// ═══════════════════════════════════════════════════════════
// Cache
// ═══════════════════════════════════════════════════════════

/// Memo of one completed classification, keyed by content hash.
/// Marked invalid (never deleted) when a correction with the same hash
/// is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub content_hash: String,
    pub classification: ClassificationDecision,
    pub valid: bool,
    pub hit_count: u32,
}

// ═══════════════════════════════════════════════════════════
// Folders
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderLevel {
    Client,
    Project,
}

/// One filing destination in the host's folder taxonomy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDef {
    pub folder_key: String,
    pub name: String,
    pub level: FolderLevel,
}

// ═══════════════════════════════════════════════════════════
// Pipeline request / response
// ═══════════════════════════════════════════════════════════

/// One classification request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    pub extracted_text: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_type: Option<String>,
    #[serde(default)]
    pub bypass_cache: bool,
}

/// The authoritative classification plus its provenance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub file_type: String,
    pub category: String,
    pub suggested_folder: String,
    pub target_level: FolderLevel,
    pub confidence: f32,
    pub confidence_flag: ConfidenceFlag,
    pub requires_review: bool,
    pub suggested_checklist_items: Vec<ChecklistMatch>,
    pub verification_notes: Vec<String>,
    pub from_cache: bool,
    pub cache_hit_count: u32,
}

/// Full pipeline response returned to the host.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub success: bool,
    pub result: ClassificationResult,
    pub document_summary: DocumentSummary,
    pub available_checklist_items: Vec<ChecklistItem>,
    pub available_folders: Vec<FolderDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_flag_bands() {
        assert_eq!(ConfidenceFlag::from_confidence(0.9), ConfidenceFlag::High);
        assert_eq!(ConfidenceFlag::from_confidence(0.85), ConfidenceFlag::High);
        assert_eq!(ConfidenceFlag::from_confidence(0.84), ConfidenceFlag::Medium);
        assert_eq!(ConfidenceFlag::from_confidence(0.65), ConfidenceFlag::Medium);
        assert_eq!(ConfidenceFlag::from_confidence(0.64), ConfidenceFlag::Low);
        assert_eq!(ConfidenceFlag::from_confidence(0.0), ConfidenceFlag::Low);
    }

    #[test]
    fn summary_signals_reflect_flags() {
        let summary = DocumentSummary {
            is_financial: true,
            is_identity: true,
            ..Default::default()
        };
        let signals = summary.signals();
        assert_eq!(signals, vec!["financial", "identity"]);
    }

    #[test]
    fn summary_without_flags_has_no_signals() {
        assert!(DocumentSummary::default().signals().is_empty());
    }

    #[test]
    fn decision_round_trips_through_json() {
        let decision = ClassificationDecision {
            file_type: "Passport".into(),
            category: "KYC".into(),
            suggested_folder: "kyc".into(),
            confidence: 0.85,
            reasoning: "filename match".into(),
            alternative_types: vec!["ID Document".into()],
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"fileType\":\"Passport\""));
        let back: ClassificationDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, decision);
    }

    #[test]
    fn alternative_types_default_to_empty() {
        let json = r#"{"fileType":"Other","category":"Other","suggestedFolder":"miscellaneous","confidence":0.3,"reasoning":""}"#;
        let decision: ClassificationDecision = serde_json::from_str(json).unwrap();
        assert!(decision.alternative_types.is_empty());
    }
}
