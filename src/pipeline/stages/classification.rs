//! Classification stage: one model call producing file type, category, and
//! folder, validated through the canonical cascade so the output is always
//! a member of the configured taxonomy.
//!
//! The model-free fallback is a fixed priority cascade over the summary's
//! characteristic flags at a fixed low confidence.

use serde::Deserialize;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::pipeline::canonical::{resolve_canonical, resolve_folder};
use crate::pipeline::events::StageOutcome;
use crate::pipeline::llm::{CompletionClient, LlmError};
use crate::pipeline::prompt::{build_classification_prompt, CLASSIFICATION_SYSTEM_PROMPT};
use crate::pipeline::reference::ResolvedReference;
use crate::pipeline::retry::call_with_retry;
use crate::pipeline::stages::{clamp_confidence, extract_json_block};
use crate::pipeline::types::{ClassificationDecision, DocumentSummary};

/// Confidence of every flag-cascade fallback decision.
pub const FALLBACK_CONFIDENCE: f32 = 0.4;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawClassification {
    file_type: Option<String>,
    category: Option<String>,
    suggested_folder: Option<String>,
    confidence: Option<f32>,
    reasoning: Option<String>,
    alternative_types: Option<Vec<String>>,
}

/// Run the classification stage. Never fails; the fallback cascade covers
/// every model failure mode.
pub fn run(
    client: &dyn CompletionClient,
    config: &PipelineConfig,
    summary: &DocumentSummary,
    file_name: &str,
    references: &[ResolvedReference],
    filename_hint: Option<&str>,
) -> (ClassificationDecision, StageOutcome) {
    let prompt = build_classification_prompt(
        summary,
        file_name,
        &config.file_types,
        &config.categories,
        &config.folders,
        references,
        filename_hint,
    );

    let parsed = call_with_retry(&config.retry, client, CLASSIFICATION_SYSTEM_PROMPT, &prompt)
        .and_then(|response| extract_json_block(&response))
        .and_then(|json| {
            serde_json::from_str::<RawClassification>(&json)
                .map_err(|e| LlmError::JsonParsing(e.to_string()))
        });

    match parsed {
        Ok(raw) => (normalize(raw, summary, config), StageOutcome::Completed),
        Err(err) => {
            warn!(file_name, error = %err, "Classification stage failed, using flag cascade");
            (fallback_classification(summary, config), StageOutcome::Fallback)
        }
    }
}

/// Canonicalize the raw model output against the configured taxonomy.
fn normalize(
    raw: RawClassification,
    summary: &DocumentSummary,
    config: &PipelineConfig,
) -> ClassificationDecision {
    let context = format!(
        "{} {} {}",
        summary.description, summary.content_type_guess, summary.purpose
    );

    let (file_type, _) = resolve_canonical(
        raw.file_type.as_deref().unwrap_or(""),
        &context,
        &config.file_types,
        &config.file_type_definitions,
    );
    let (category, _) = resolve_canonical(
        raw.category.as_deref().unwrap_or(""),
        &context,
        &config.categories,
        &config.category_definitions,
    );
    let suggested_folder =
        resolve_folder(&category, raw.suggested_folder.as_deref(), &config.folders);

    let alternative_types = raw
        .alternative_types
        .unwrap_or_default()
        .into_iter()
        .filter(|alt| !alt.trim().is_empty() && *alt != file_type)
        .collect();

    ClassificationDecision {
        file_type,
        category,
        suggested_folder,
        confidence: clamp_confidence(raw.confidence.unwrap_or(0.0)),
        reasoning: raw.reasoning.unwrap_or_default(),
        alternative_types,
    }
}

/// Fixed priority cascade over the summary's characteristic flags.
pub fn fallback_classification(
    summary: &DocumentSummary,
    config: &PipelineConfig,
) -> ClassificationDecision {
    let (file_type, category, folder_hint) = if summary.is_identity {
        ("ID Document", "KYC", "kyc")
    } else if summary.is_financial {
        ("Financial Document", "Financial Documents", "operational_model")
    } else if summary.is_legal {
        ("Legal Document", "Legal Documents", "background")
    } else if summary.is_multi_project {
        ("Track Record", "KYC", "kyc")
    } else if summary.is_design {
        ("Design Document", "Plans", "background")
    } else if summary.is_report {
        ("Report", "Professional Reports", "credit_submission")
    } else {
        ("Other", "Other", "miscellaneous")
    };

    ClassificationDecision {
        file_type: file_type.to_string(),
        category: category.to_string(),
        suggested_folder: resolve_folder(category, Some(folder_hint), &config.folders),
        confidence: FALLBACK_CONFIDENCE,
        reasoning: "Classification service unavailable; derived from document characteristics"
            .to_string(),
        alternative_types: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::MockCompletionClient;
    use crate::pipeline::retry::RetryPolicy;

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        config
    }

    fn identity_summary() -> DocumentSummary {
        DocumentSummary {
            is_identity: true,
            ..DocumentSummary::default()
        }
    }

    #[test]
    fn model_response_is_normalized_and_canonicalized() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "bank statement", "category": "Financial Documents",
                "suggestedFolder": "operational_model", "confidence": 0.88,
                "reasoning": "monthly statement", "alternativeTypes": ["Bank Statement", "Invoice"]}"#,
        );
        let (decision, outcome) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            "statement.pdf",
            &[],
            None,
        );
        assert_eq!(outcome, StageOutcome::Completed);
        assert_eq!(decision.file_type, "Bank Statement");
        assert_eq!(decision.category, "Financial Documents");
        assert_eq!(decision.suggested_folder, "operational_model");
        assert_eq!(decision.confidence, 0.88);
        // Self-referential alternative dropped.
        assert_eq!(decision.alternative_types, vec!["Invoice".to_string()]);
    }

    #[test]
    fn out_of_enumeration_folder_falls_back_to_category_map() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Lease Agreement", "category": "Legal Documents",
                "suggestedFolder": "legal_stuff", "confidence": 0.8, "reasoning": ""}"#,
        );
        let (decision, _) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            "lease.pdf",
            &[],
            None,
        );
        assert_eq!(decision.suggested_folder, "background");
    }

    #[test]
    fn unreachable_service_with_identity_flag_falls_back_to_kyc() {
        let client = MockCompletionClient::unreachable();
        let (decision, outcome) = run(
            &client,
            &config(),
            &identity_summary(),
            "scan.pdf",
            &[],
            None,
        );
        assert_eq!(outcome, StageOutcome::Fallback);
        assert_eq!(decision.file_type, "ID Document");
        assert_eq!(decision.category, "KYC");
        assert_eq!(decision.suggested_folder, "kyc");
        assert_eq!(decision.confidence, FALLBACK_CONFIDENCE);
    }

    #[test]
    fn flag_cascade_honours_priority_order() {
        let config = config();
        let both = DocumentSummary {
            is_identity: true,
            is_financial: true,
            ..DocumentSummary::default()
        };
        assert_eq!(fallback_classification(&both, &config).file_type, "ID Document");

        let financial_legal = DocumentSummary {
            is_financial: true,
            is_legal: true,
            ..DocumentSummary::default()
        };
        assert_eq!(
            fallback_classification(&financial_legal, &config).file_type,
            "Financial Document"
        );

        let report_only = DocumentSummary {
            is_report: true,
            ..DocumentSummary::default()
        };
        let decision = fallback_classification(&report_only, &config);
        assert_eq!(decision.file_type, "Report");
        assert_eq!(decision.suggested_folder, "credit_submission");
    }

    #[test]
    fn no_flags_means_other() {
        let decision = fallback_classification(&DocumentSummary::default(), &config());
        assert_eq!(decision.file_type, "Other");
        assert_eq!(decision.category, "Other");
        assert_eq!(decision.suggested_folder, "miscellaneous");
    }

    #[test]
    fn unparseable_response_uses_fallback() {
        let client = MockCompletionClient::single("no json at all");
        let (decision, outcome) = run(
            &client,
            &config(),
            &identity_summary(),
            "scan.pdf",
            &[],
            Some("Passport"),
        );
        assert_eq!(outcome, StageOutcome::Fallback);
        assert_eq!(decision.category, "KYC");
    }
}
