//! Critic stage: final arbitration over ambiguous classifications.
//!
//! Runs only when the decision looks doubtful (an "Other" label, low
//! confidence, or a filename hint that disagrees) and a critic model is
//! configured. Its verdict is authoritative: type, category, and
//! confidence are replaced outright, and its checklist matches supersede
//! prior ones for the same item.

use serde::Deserialize;
use tracing::warn;

use crate::config::PipelineConfig;
use crate::pipeline::canonical::{resolve_canonical, resolve_folder};
use crate::pipeline::corrections::CorrectionContext;
use crate::pipeline::events::StageOutcome;
use crate::pipeline::llm::{CompletionClient, LlmError};
use crate::pipeline::prompt::{build_critic_prompt, CRITIC_SYSTEM_PROMPT};
use crate::pipeline::retry::call_with_retry;
use crate::pipeline::stages::{clamp_confidence, extract_json_block};
use crate::pipeline::types::{ChecklistMatch, ClassificationDecision, DocumentSummary};

/// Decisions at or above this confidence skip the critic unless another
/// gate condition holds.
pub const CRITIC_CONFIDENCE_GATE: f32 = 0.8;

/// Prior matches the critic did not confirm are discounted by this factor
/// and capped.
const UNCONFIRMED_DISCOUNT: f32 = 0.8;
const UNCONFIRMED_CAP: f32 = 0.6;

/// Matches below this confidence are dropped from the final list.
const FINAL_MATCH_FLOOR: f32 = 0.5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVerdict {
    file_type: Option<String>,
    category: Option<String>,
    suggested_folder: Option<String>,
    confidence: Option<f32>,
    reasoning: Option<String>,
    checklist_matches: Option<Vec<RawVerdictMatch>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVerdictMatch {
    item_id: Option<String>,
    confidence: Option<f32>,
    reasoning: Option<String>,
}

/// Whether the current decision warrants critic review.
pub fn should_run(decision: &ClassificationDecision, filename_hint: Option<&str>) -> bool {
    decision.file_type == "Other"
        || decision.category == "Other"
        || decision.confidence < CRITIC_CONFIDENCE_GATE
        || filename_hint.is_some_and(|hint| hint != decision.file_type)
}

/// Run the critic. On any model failure the prior decision and matches
/// stand unchanged.
pub fn run(
    client: &dyn CompletionClient,
    config: &PipelineConfig,
    summary: &DocumentSummary,
    decision: &ClassificationDecision,
    filename_hint: Option<&str>,
    matches: &[ChecklistMatch],
    correction_context: &CorrectionContext,
) -> (ClassificationDecision, Vec<ChecklistMatch>, StageOutcome) {
    let prompt = build_critic_prompt(summary, decision, filename_hint, matches, correction_context);

    let parsed = call_with_retry(&config.retry, client, CRITIC_SYSTEM_PROMPT, &prompt)
        .and_then(|response| extract_json_block(&response))
        .and_then(|json| {
            serde_json::from_str::<RawVerdict>(&json)
                .map_err(|e| LlmError::JsonParsing(e.to_string()))
        });

    match parsed {
        Ok(raw) => {
            let (verdict, critic_matches) = normalize(raw, summary, decision, config);
            let merged = merge_matches(matches, critic_matches);
            let outcome = if verdict.file_type != decision.file_type
                || verdict.category != decision.category
            {
                StageOutcome::Overridden
            } else {
                StageOutcome::Completed
            };
            (verdict, merged, outcome)
        }
        Err(err) => {
            warn!(error = %err, "Critic stage failed, keeping prior decision");
            (decision.clone(), matches.to_vec(), StageOutcome::Fallback)
        }
    }
}

fn normalize(
    raw: RawVerdict,
    summary: &DocumentSummary,
    prior: &ClassificationDecision,
    config: &PipelineConfig,
) -> (ClassificationDecision, Vec<ChecklistMatch>) {
    let context = format!("{} {}", summary.description, summary.content_type_guess);

    let (file_type, _) = resolve_canonical(
        raw.file_type.as_deref().unwrap_or(&prior.file_type),
        &context,
        &config.file_types,
        &config.file_type_definitions,
    );
    let (category, _) = resolve_canonical(
        raw.category.as_deref().unwrap_or(&prior.category),
        &context,
        &config.categories,
        &config.category_definitions,
    );
    let suggested_folder =
        resolve_folder(&category, raw.suggested_folder.as_deref(), &config.folders);

    let verdict = ClassificationDecision {
        file_type,
        category,
        suggested_folder,
        confidence: clamp_confidence(raw.confidence.unwrap_or(prior.confidence)),
        reasoning: raw.reasoning.unwrap_or_default(),
        alternative_types: Vec::new(),
    };

    let matches = raw
        .checklist_matches
        .unwrap_or_default()
        .into_iter()
        .filter_map(|m| {
            Some(ChecklistMatch {
                item_id: m.item_id?,
                confidence: clamp_confidence(m.confidence.unwrap_or(0.0)),
                reasoning: m.reasoning.unwrap_or_default(),
            })
        })
        .collect();

    (verdict, matches)
}

/// Critic matches replace prior matches for the same item id; unconfirmed
/// prior matches survive discounted and annotated. Final list is filtered
/// and sorted by descending confidence.
fn merge_matches(prior: &[ChecklistMatch], critic: Vec<ChecklistMatch>) -> Vec<ChecklistMatch> {
    let mut merged = critic;
    for old in prior {
        if merged.iter().any(|m| m.item_id == old.item_id) {
            continue;
        }
        merged.push(ChecklistMatch {
            item_id: old.item_id.clone(),
            confidence: (old.confidence * UNCONFIRMED_DISCOUNT).min(UNCONFIRMED_CAP),
            reasoning: format!("{} (not confirmed by critic)", old.reasoning),
        });
    }
    merged.retain(|m| m.confidence >= FINAL_MATCH_FLOOR);
    merged.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    merged
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

    fn doubtful_decision() -> ClassificationDecision {
        ClassificationDecision {
            file_type: "Other".into(),
            category: "Other".into(),
            suggested_folder: "miscellaneous".into(),
            confidence: 0.45,
            reasoning: String::new(),
            alternative_types: vec!["Bank Statement".into()],
        }
    }

    #[test]
    fn gate_covers_every_trigger() {
        let confident = ClassificationDecision {
            file_type: "Passport".into(),
            category: "KYC".into(),
            suggested_folder: "kyc".into(),
            confidence: 0.9,
            reasoning: String::new(),
            alternative_types: vec![],
        };
        assert!(!should_run(&confident, None));
        assert!(!should_run(&confident, Some("Passport")));
        assert!(should_run(&confident, Some("Bank Statement")));

        let low = ClassificationDecision {
            confidence: 0.79,
            ..confident.clone()
        };
        assert!(should_run(&low, None));

        assert!(should_run(&doubtful_decision(), None));
        let other_category = ClassificationDecision {
            category: "Other".into(),
            ..confident
        };
        assert!(should_run(&other_category, None));
    }

    #[test]
    fn verdict_replaces_decision_outright() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Bank Statement", "category": "Financial Documents",
                "suggestedFolder": "operational_model", "confidence": 0.9,
                "reasoning": "statement layout and balances"}"#,
        );
        let (verdict, matches, outcome) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            &doubtful_decision(),
            None,
            &[],
            &CorrectionContext::None,
        );
        assert_eq!(outcome, StageOutcome::Overridden);
        assert_eq!(verdict.file_type, "Bank Statement");
        assert_eq!(verdict.confidence, 0.9);
        assert!(matches.is_empty());
    }

    #[test]
    fn unknown_folder_in_verdict_is_revalidated() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Lease Agreement", "category": "Legal Documents",
                "suggestedFolder": "somewhere_else", "confidence": 0.85, "reasoning": ""}"#,
        );
        let (verdict, _, _) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            &doubtful_decision(),
            None,
            &[],
            &CorrectionContext::None,
        );
        assert_eq!(verdict.suggested_folder, "background");
    }

    #[test]
    fn unconfirmed_prior_matches_are_discounted_and_annotated() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Bank Statement", "category": "Financial Documents",
                "confidence": 0.9, "reasoning": "",
                "checklistMatches": [
                    {"itemId": "bank-statement", "confidence": 0.9, "reasoning": "confirmed"}
                ]}"#,
        );
        let prior = vec![
            ChecklistMatch {
                item_id: "bank-statement".into(),
                confidence: 0.7,
                reasoning: "filename".into(),
            },
            ChecklistMatch {
                item_id: "passport".into(),
                confidence: 0.85,
                reasoning: "filename".into(),
            },
            ChecklistMatch {
                item_id: "weak".into(),
                confidence: 0.55,
                reasoning: "guess".into(),
            },
        ];
        let (_, matches, _) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            &doubtful_decision(),
            None,
            &prior,
            &CorrectionContext::None,
        );
        // Confirmed item takes the critic's score; passport is discounted to
        // min(0.85*0.8, 0.6)=0.6; "weak" falls to 0.44 and is filtered out.
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].item_id, "bank-statement");
        assert_eq!(matches[0].confidence, 0.9);
        assert_eq!(matches[1].item_id, "passport");
        assert_eq!(matches[1].confidence, 0.6);
        assert!(matches[1].reasoning.ends_with("(not confirmed by critic)"));
    }

    #[test]
    fn model_failure_keeps_prior_decision_and_matches() {
        let client = MockCompletionClient::unreachable();
        let prior_matches = vec![ChecklistMatch {
            item_id: "passport".into(),
            confidence: 0.85,
            reasoning: "filename".into(),
        }];
        let decision = doubtful_decision();
        let (verdict, matches, outcome) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            &decision,
            None,
            &prior_matches,
            &CorrectionContext::None,
        );
        assert_eq!(outcome, StageOutcome::Fallback);
        assert_eq!(verdict.file_type, decision.file_type);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.85);
    }

    #[test]
    fn confirming_verdict_is_completed_not_overridden() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Other", "category": "Other", "confidence": 0.55,
                "reasoning": "genuinely ambiguous"}"#,
        );
        let (_, _, outcome) = run(
            &client,
            &config(),
            &DocumentSummary::default(),
            &doubtful_decision(),
            None,
            &[],
            &CorrectionContext::None,
        );
        assert_eq!(outcome, StageOutcome::Completed);
    }
}
