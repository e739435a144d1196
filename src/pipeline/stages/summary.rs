//! Summary stage: one model call producing a structured `DocumentSummary`.
//!
//! Inputs under the minimum text length (a likely scanned document) skip
//! the model entirely; so do exhausted retries and unparseable responses.
//! The fallback shell is built from the filename and whatever text exists.

use serde::Deserialize;
use tracing::warn;

use crate::pipeline::events::StageOutcome;
use crate::pipeline::filename::normalize_filename_text;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::prompt::{build_summary_prompt, SUMMARY_SYSTEM_PROMPT};
use crate::pipeline::reference::ResolvedReference;
use crate::pipeline::retry::{call_with_retry, RetryPolicy};
use crate::pipeline::stages::{clamp_confidence, extract_json_block};
use crate::pipeline::types::DocumentSummary;

/// Texts shorter than this (trimmed) are treated as scanned documents and
/// never sent to the model.
pub const MIN_TEXT_LENGTH: usize = 50;

/// Confidence assigned to the model-free fallback shell.
const FALLBACK_CONFIDENCE: f32 = 0.3;

/// Raw model payload. Every field is optional; normalization fills the
/// gaps so downstream stages never see a partial summary.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSummary {
    description: Option<String>,
    purpose: Option<String>,
    people: Option<Vec<String>>,
    companies: Option<Vec<String>>,
    locations: Option<Vec<String>>,
    projects: Option<Vec<String>>,
    key_terms: Option<Vec<String>>,
    key_dates: Option<Vec<String>>,
    key_amounts: Option<Vec<String>>,
    is_financial: Option<bool>,
    is_legal: Option<bool>,
    is_identity: Option<bool>,
    is_report: Option<bool>,
    is_design: Option<bool>,
    is_correspondence: Option<bool>,
    is_multi_project: Option<bool>,
    is_internal: Option<bool>,
    content_type_guess: Option<String>,
    analysis_confidence: Option<f32>,
}

fn normalize(raw: RawSummary) -> DocumentSummary {
    DocumentSummary {
        description: raw.description.unwrap_or_default(),
        purpose: raw.purpose.unwrap_or_default(),
        people: raw.people.unwrap_or_default(),
        companies: raw.companies.unwrap_or_default(),
        locations: raw.locations.unwrap_or_default(),
        projects: raw.projects.unwrap_or_default(),
        key_terms: raw.key_terms.unwrap_or_default(),
        key_dates: raw.key_dates.unwrap_or_default(),
        key_amounts: raw.key_amounts.unwrap_or_default(),
        is_financial: raw.is_financial.unwrap_or(false),
        is_legal: raw.is_legal.unwrap_or(false),
        is_identity: raw.is_identity.unwrap_or(false),
        is_report: raw.is_report.unwrap_or(false),
        is_design: raw.is_design.unwrap_or(false),
        is_correspondence: raw.is_correspondence.unwrap_or(false),
        is_multi_project: raw.is_multi_project.unwrap_or(false),
        is_internal: raw.is_internal.unwrap_or(false),
        content_type_guess: raw.content_type_guess.unwrap_or_default(),
        analysis_confidence: clamp_confidence(raw.analysis_confidence.unwrap_or(0.0)),
    }
}

/// Run the summary stage. Never fails; the second element says whether the
/// model result or the deterministic shell was used.
pub fn run(
    client: &dyn CompletionClient,
    policy: &RetryPolicy,
    extracted_text: &str,
    file_name: &str,
    references: &[ResolvedReference],
) -> (DocumentSummary, StageOutcome) {
    let trimmed = extracted_text.trim();
    if trimmed.chars().count() < MIN_TEXT_LENGTH {
        warn!(
            file_name,
            text_chars = trimmed.chars().count(),
            "Text below scanned-document threshold, using fallback summary"
        );
        return (fallback_summary(extracted_text, file_name), StageOutcome::Fallback);
    }

    let prompt = build_summary_prompt(extracted_text, file_name, references);
    let parsed = call_with_retry(policy, client, SUMMARY_SYSTEM_PROMPT, &prompt)
        .and_then(|response| extract_json_block(&response))
        .and_then(|json| {
            serde_json::from_str::<RawSummary>(&json)
                .map_err(|e| crate::pipeline::llm::LlmError::JsonParsing(e.to_string()))
        });

    match parsed {
        Ok(raw) => (normalize(raw), StageOutcome::Completed),
        Err(err) => {
            warn!(file_name, error = %err, "Summary stage failed, using fallback");
            (fallback_summary(extracted_text, file_name), StageOutcome::Fallback)
        }
    }
}

/// Model-free shell: characteristic flags inferred from filename and text
/// keywords, low fixed confidence.
pub fn fallback_summary(extracted_text: &str, file_name: &str) -> DocumentSummary {
    let name = normalize_filename_text(file_name);
    let text: String = extracted_text
        .chars()
        .take(2_000)
        .collect::<String>()
        .to_lowercase();
    let haystack = format!("{name} {text}");

    let any = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

    let is_identity = any(&["passport", "driving licence", "drivers licence", "id card", "identity"]);
    let is_financial = any(&[
        "statement", "account", "invoice", "tax", "cashflow", "cash flow", "financial",
    ]);
    let is_legal = any(&["lease", "agreement", "contract", "loan", "facility", "deed"]);
    let is_report = any(&["valuation", "survey", "report", "appraisal"]);
    let is_design = any(&["drawing", "design", "elevation", "floor plan", "blueprint"]);
    let is_correspondence = any(&["letter", "email", "correspondence", "memo"]);

    let key_terms: Vec<String> = name
        .split_whitespace()
        .filter(|word| word.len() >= 4 && !word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    DocumentSummary {
        description: format!("Document derived from file name: {file_name}"),
        purpose: String::new(),
        key_terms,
        is_financial,
        is_legal,
        is_identity,
        is_report,
        is_design,
        is_correspondence,
        content_type_guess: String::new(),
        analysis_confidence: FALLBACK_CONFIDENCE,
        ..DocumentSummary::default()
    }
}
