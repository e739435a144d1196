//! Prompt construction for the model-calling stages.
//!
//! Each builder takes structured inputs (including reference-resolver
//! output as contextual guidance) and produces the user prompt; the paired
//! system prompts pin the response format to a single JSON object.

use crate::pipeline::corrections::CorrectionContext;
use crate::pipeline::reference::ResolvedReference;
use crate::pipeline::types::{
    ChecklistItem, ChecklistMatch, ClassificationDecision, DocumentSummary, FolderDef,
};

/// Characters of extracted text included in a prompt.
const PROMPT_TEXT_LIMIT: usize = 6_000;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You analyse financial and legal documents. \
Respond with a single JSON object and nothing else. Fields: description, purpose, \
people, companies, locations, projects, keyTerms, keyDates, keyAmounts, isFinancial, \
isLegal, isIdentity, isReport, isDesign, isCorrespondence, isMultiProject, isInternal, \
contentTypeGuess, analysisConfidence (0 to 1).";

pub const CLASSIFICATION_SYSTEM_PROMPT: &str = "You classify financial and legal documents \
for filing. Respond with a single JSON object and nothing else. Fields: fileType, \
category, suggestedFolder, confidence (0 to 1), reasoning, alternativeTypes.";

pub const CHECKLIST_SYSTEM_PROMPT: &str = "You match documents against an outstanding \
document checklist. Respond with a single JSON object and nothing else. Fields: \
matches — an array of {itemId, confidence (0 to 1), reasoning}.";

pub const CRITIC_SYSTEM_PROMPT: &str = "You are the final reviewer of a document \
classification. Weigh all evidence, including past human corrections, and respond with \
a single JSON object and nothing else. Fields: fileType, category, suggestedFolder, \
confidence (0 to 1), reasoning, checklistMatches — an array of {itemId, confidence, \
reasoning}.";

fn truncated_text(text: &str) -> String {
    text.chars().take(PROMPT_TEXT_LIMIT).collect()
}

fn reference_guidance(references: &[ResolvedReference]) -> String {
    if references.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = references
        .iter()
        .map(|r| {
            format!(
                "- {} (type: {}, category: {}, relevance {:.0})",
                r.name, r.file_type, r.category, r.score
            )
        })
        .collect();
    format!("Likely relevant document types:\n{}\n\n", lines.join("\n"))
}

pub fn build_summary_prompt(
    extracted_text: &str,
    file_name: &str,
    references: &[ResolvedReference],
) -> String {
    format!(
        "{guidance}File name: {file_name}\n\nDocument text:\n{text}",
        guidance = reference_guidance(references),
        text = truncated_text(extracted_text),
    )
}

pub fn build_classification_prompt(
    summary: &DocumentSummary,
    file_name: &str,
    file_types: &[String],
    categories: &[String],
    folders: &[FolderDef],
    references: &[ResolvedReference],
    filename_hint: Option<&str>,
) -> String {
    let folder_keys: Vec<&str> = folders.iter().map(|f| f.folder_key.as_str()).collect();
    let hint = filename_hint
        .map(|h| format!("Filename heuristics suggest: {h}\n"))
        .unwrap_or_default();
    format!(
        "{guidance}{hint}File name: {file_name}\n\n\
         Document summary:\n{summary}\n\n\
         Valid file types: {types}\n\
         Valid categories: {categories}\n\
         Valid folders: {folders}",
        guidance = reference_guidance(references),
        summary = serde_json::to_string_pretty(summary).unwrap_or_default(),
        types = file_types.join(", "),
        categories = categories.join(", "),
        folders = folder_keys.join(", "),
    )
}

pub fn build_checklist_prompt(
    summary: &DocumentSummary,
    decision: &ClassificationDecision,
    items: &[ChecklistItem],
    file_name: &str,
) -> String {
    let item_lines: Vec<String> = items
        .iter()
        .map(|item| {
            format!(
                "- id: {}, name: {}, acceptable types: [{}]",
                item.id,
                item.name,
                item.acceptable_types.join(", ")
            )
        })
        .collect();
    format!(
        "File name: {file_name}\n\
         Classified as: {file_type} / {category}\n\n\
         Document summary:\n{summary}\n\n\
         Outstanding checklist items:\n{items}",
        file_type = decision.file_type,
        category = decision.category,
        summary = serde_json::to_string_pretty(summary).unwrap_or_default(),
        items = item_lines.join("\n"),
    )
}

pub fn build_critic_prompt(
    summary: &DocumentSummary,
    decision: &ClassificationDecision,
    filename_hint: Option<&str>,
    matches: &[ChecklistMatch],
    correction_context: &CorrectionContext,
) -> String {
    let hint = filename_hint
        .map(|h| format!("Filename heuristics suggest: {h}\n"))
        .unwrap_or_default();

    let matches_text = if matches.is_empty() {
        "none".to_string()
    } else {
        matches
            .iter()
            .map(|m| format!("- {} ({:.2}): {}", m.item_id, m.confidence, m.reasoning))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "{hint}Initial decision:\n{decision}\n\n\
         Document summary:\n{summary}\n\n\
         Current checklist matches:\n{matches_text}\n\n\
         {corrections}",
        decision = serde_json::to_string_pretty(decision).unwrap_or_default(),
        summary = serde_json::to_string_pretty(summary).unwrap_or_default(),
        corrections = correction_guidance(correction_context),
    )
}

fn correction_guidance(context: &CorrectionContext) -> String {
    match context {
        CorrectionContext::None => "No relevant past corrections.".to_string(),
        CorrectionContext::Consolidated(rules) => {
            let lines: Vec<String> = rules
                .iter()
                .map(|r| {
                    format!(
                        "- {}: '{}' was corrected to '{}' ({} times)",
                        r.field, r.from_value, r.to_value, r.occurrence_count
                    )
                })
                .collect();
            format!("Aggregated past corrections:\n{}", lines.join("\n"))
        }
        CorrectionContext::Targeted { corrections, rules } => {
            let mut lines: Vec<String> = corrections
                .iter()
                .map(|c| {
                    format!(
                        "- {}: '{}' corrected to '{}'",
                        c.field, c.from_value, c.to_value
                    )
                })
                .collect();
            lines.extend(rules.iter().map(|r| {
                format!(
                    "- {}: '{}' was corrected to '{}' ({} times)",
                    r.field, r.from_value, r.to_value, r.occurrence_count
                )
            }));
            format!(
                "Past corrections relevant to the current ambiguity:\n{}",
                lines.join("\n")
            )
        }
        CorrectionContext::Full(records) => {
            let lines: Vec<String> = records
                .iter()
                .map(|c| {
                    format!(
                        "- {}: '{}' corrected to '{}' (hash {})",
                        c.field, c.from_value, c.to_value, c.content_hash
                    )
                })
                .collect();
            format!("Recent human corrections:\n{}", lines.join("\n"))
        }
    }
}
