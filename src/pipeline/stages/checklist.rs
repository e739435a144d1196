//! Checklist matching stage: model suggestions merged with filename
//! heuristics, keeping the highest-confidence source per item.

use serde::Deserialize;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::pipeline::events::StageOutcome;
use crate::pipeline::filename::match_checklist_items;
use crate::pipeline::llm::{CompletionClient, LlmError};
use crate::pipeline::prompt::{build_checklist_prompt, CHECKLIST_SYSTEM_PROMPT};
use crate::pipeline::stages::{clamp_confidence, extract_json_block};
use crate::pipeline::types::{ChecklistMatch, ClassificationDecision, DocumentSummary};

/// Filename-derived matches below this score are dropped in the fallback.
const FALLBACK_MATCH_FLOOR: f32 = 0.6;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMatches {
    matches: Option<Vec<RawMatch>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMatch {
    item_id: Option<String>,
    confidence: Option<f32>,
    reasoning: Option<String>,
}

/// Run the checklist stage against the configured outstanding items. On any
/// model failure, falls back to high-scoring filename matches alone.
pub fn run(
    client: &dyn CompletionClient,
    config: &PipelineConfig,
    summary: &DocumentSummary,
    decision: &ClassificationDecision,
    file_name: &str,
) -> (Vec<ChecklistMatch>, StageOutcome) {
    if config.checklist_items.is_empty() {
        return (Vec::new(), StageOutcome::Skipped);
    }

    let prompt = build_checklist_prompt(summary, decision, &config.checklist_items, file_name);
    let parsed = call(client, config, &prompt);

    match parsed {
        Ok(matches) => (matches, StageOutcome::Completed),
        Err(err) => {
            warn!(file_name, error = %err, "Checklist stage failed, using filename matches");
            (fallback_matches(file_name, config), StageOutcome::Fallback)
        }
    }
}

fn call(
    client: &dyn CompletionClient,
    config: &PipelineConfig,
    prompt: &str,
) -> Result<Vec<ChecklistMatch>, LlmError> {
    let response =
        crate::pipeline::retry::call_with_retry(&config.retry, client, CHECKLIST_SYSTEM_PROMPT, prompt)?;
    let json = extract_json_block(&response)?;
    let raw: RawMatches =
        serde_json::from_str(&json).map_err(|e| LlmError::JsonParsing(e.to_string()))?;

    let known = |id: &str| config.checklist_items.iter().any(|item| item.id == id);
    Ok(raw
        .matches
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            let item_id = m.item_id?;
            if !known(&item_id) {
                return None;
            }
            Some(ChecklistMatch {
                item_id,
                confidence: clamp_confidence(m.confidence.unwrap_or(0.0)),
                reasoning: m.reasoning.unwrap_or_default(),
            })
        })
        .collect())
}

/// Filename heuristics only, filtered to confident matches.
pub fn fallback_matches(file_name: &str, config: &PipelineConfig) -> Vec<ChecklistMatch> {
    match_checklist_items(file_name, &config.checklist_items)
        .into_iter()
        .filter(|m| m.confidence >= FALLBACK_MATCH_FLOOR)
        .collect()
}

/// Merge match sets, keeping the single highest-confidence match per item
/// id, sorted by descending confidence.
pub fn merge_matches(
    mut base: Vec<ChecklistMatch>,
    incoming: Vec<ChecklistMatch>,
) -> Vec<ChecklistMatch> {
    for candidate in incoming {
        match base.iter_mut().find(|m| m.item_id == candidate.item_id) {
            Some(existing) if existing.confidence < candidate.confidence => {
                *existing = candidate;
            }
            Some(_) => {}
            None => base.push(candidate),
        }
    }
    base.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    base
}
