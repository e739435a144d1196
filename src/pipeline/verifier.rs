//! Deterministic verifier.
//!
//! Scores the current document against every active reference definition
//! using keyword and pattern data alone — no model calls. Exists to catch
//! obvious mismatches cheaply and reproducibly, while still benefiting from
//! the correction feedback loop via the consolidated-rule boost.

use serde::{Deserialize, Serialize};

use crate::pipeline::canonical::resolve_folder;
use crate::pipeline::reference::{DocumentReference, ReferenceRegistry};
use crate::pipeline::types::{
    ClassificationDecision, ConsolidatedRule, DocumentSummary, FolderDef, KeywordScore,
};

/// Tunable verifier thresholds. The defaults mirror the original tuning but
/// are parameters, not protocol invariants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifierParams {
    /// Top scores below this floor are not significant enough to act on.
    pub significance_floor: f32,
    /// Minimum lead over the upstream type's score required to override.
    pub override_margin: f32,
}

impl Default for VerifierParams {
    fn default() -> Self {
        Self {
            significance_floor: 0.4,
            override_margin: 0.25,
        }
    }
}

/// Outcome of one verification pass.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// The decision after verification — either the upstream decision
    /// unchanged or a proposed override.
    pub decision: ClassificationDecision,
    /// True when the verifier confirms (or does not contest) the upstream
    /// classification.
    pub verified: bool,
    pub notes: Vec<String>,
    /// Ranked per-type scores, highest first.
    pub scores: Vec<KeywordScore>,
}

/// Score the document against every active reference and decide whether to
/// confirm, annotate, or override the upstream classification.
pub fn verify_classification(
    registry: &ReferenceRegistry,
    summary: &DocumentSummary,
    file_name: &str,
    upstream: &ClassificationDecision,
    folders: &[FolderDef],
    rules: &[ConsolidatedRule],
    params: &VerifierParams,
) -> VerificationOutcome {
    let mut scores: Vec<KeywordScore> = registry
        .entries()
        .iter()
        .filter(|r| r.active)
        .map(|reference| score_definition(reference, summary, file_name, rules))
        .collect();

    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let Some(top) = scores.first().cloned() else {
        return VerificationOutcome {
            decision: upstream.clone(),
            verified: true,
            notes: vec!["No reference definitions available".to_string()],
            scores,
        };
    };

    // Below the significance floor nothing the verifier saw is strong enough
    // to act on; accept the upstream classification unchanged.
    if top.score < params.significance_floor {
        return VerificationOutcome {
            decision: upstream.clone(),
            verified: true,
            notes: vec![format!(
                "Keyword evidence insignificant (top {:.2} < {:.2})",
                top.score, params.significance_floor
            )],
            scores,
        };
    }

    if top.file_type.eq_ignore_ascii_case(&upstream.file_type) {
        return VerificationOutcome {
            decision: upstream.clone(),
            verified: true,
            notes: vec![format!(
                "Keyword evidence confirms '{}' ({:.2})",
                top.file_type, top.score
            )],
            scores,
        };
    }

    let upstream_score = scores
        .iter()
        .find(|s| s.file_type.eq_ignore_ascii_case(&upstream.file_type))
        .map(|s| s.score)
        .unwrap_or(0.0);

    if top.score - upstream_score > params.override_margin
        && top.score >= params.significance_floor
    {
        let reference = registry.by_file_type(&top.file_type);
        let category = reference
            .map(|r| r.category.clone())
            .unwrap_or_else(|| upstream.category.clone());
        let folder = resolve_folder(&category, None, folders);

        let decision = ClassificationDecision {
            file_type: top.file_type.clone(),
            category,
            suggested_folder: folder,
            confidence: (top.score + 0.1).min(0.95),
            reasoning: format!(
                "Keyword verification override: '{}' scored {:.2} vs {:.2} for '{}'",
                top.file_type, top.score, upstream_score, upstream.file_type
            ),
            alternative_types: vec![upstream.file_type.clone()],
        };
        return VerificationOutcome {
            decision,
            verified: false,
            notes: vec![format!(
                "Overrode '{}' with '{}' on keyword evidence",
                upstream.file_type, top.file_type
            )],
            scores,
        };
    }

    VerificationOutcome {
        decision: upstream.clone(),
        verified: true,
        notes: vec![format!(
            "Possible alternative '{}' ({:.2}) did not clear the override margin",
            top.file_type, top.score
        )],
        scores,
    }
}

/// Weighted match score for one reference definition, capped at 1.0
/// throughout.
fn score_definition(
    reference: &DocumentReference,
    summary: &DocumentSummary,
    file_name: &str,
    rules: &[ConsolidatedRule],
) -> KeywordScore {
    let mut matched_keywords = Vec::new();
    let mut matched_patterns = Vec::new();
    let mut exclusion_applied = false;
    let mut correction_boosted = false;

    let total = reference.keywords.len().max(1) as f32;
    let key_terms_text = summary.key_terms.join(" ").to_lowercase();
    let summary_text = format!(
        "{} {} {}",
        summary.description, summary.purpose, summary.content_type_guess
    )
    .to_lowercase();
    let file_lower = file_name.to_lowercase();

    let mut term_hits = 0usize;
    let mut text_hits = 0usize;
    let mut name_hits = 0usize;
    for keyword in &reference.keywords {
        let kw = keyword.to_lowercase();
        if kw.is_empty() {
            continue;
        }
        let mut hit = false;
        if key_terms_text.contains(&kw) {
            term_hits += 1;
            hit = true;
        }
        if summary_text.contains(&kw) {
            text_hits += 1;
            hit = true;
        }
        if file_lower.contains(&kw) {
            name_hits += 1;
            hit = true;
        }
        if hit {
            matched_keywords.push(keyword.clone());
        }
    }

    let mut score = 0.0f32;
    score += (term_hits as f32 / total) * 0.4;
    score += (text_hits as f32 / total) * 0.3;
    score += (name_hits as f32 / total) * 0.3;
    score = score.min(1.0);

    if let Some(pattern) = reference.filename_pattern_hit(file_name) {
        matched_patterns.push(pattern.to_string());
        score = (score + 0.3).min(1.0);
    }

    let learned_hits = reference
        .learned_keywords
        .iter()
        .filter(|kw| {
            let kw = kw.to_lowercase();
            !kw.is_empty() && (key_terms_text.contains(&kw) || summary_text.contains(&kw))
        })
        .count();
    if learned_hits > 0 {
        score = (score + 0.15 * learned_hits.min(3) as f32).min(1.0);
    }

    if reference.exclude_pattern_hit(file_name).is_some() {
        exclusion_applied = true;
        score *= 0.5;
    }

    let boosted = rules.iter().any(|rule| {
        rule.occurrence_count >= 2
            && rule.field == "fileType"
            && rule.to_value.eq_ignore_ascii_case(&reference.file_type)
    });
    if boosted {
        correction_boosted = true;
        score = (score + 0.2).min(1.0);
    }

    KeywordScore {
        file_type: reference.file_type.clone(),
        score,
        matched_keywords,
        matched_patterns,
        exclusion_applied,
        correction_boosted,
    }
}
