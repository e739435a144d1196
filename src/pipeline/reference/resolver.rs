//! Weighted reference resolver.
//!
//! Ranks registry entries against a request's context, signals, document
//! type, category, filename, and text sample. Purely additive scoring with
//! a relevance floor; a diversity fallback keeps the result useful when
//! nothing scores.

use std::collections::{HashMap, HashSet};

use super::{DocumentReference, ReferenceRegistry, RuleAction, TagNamespace};

/// Relevance floor: entries below `max(8, 0.3 × top)` are discarded.
const ABSOLUTE_FLOOR: f32 = 8.0;
const RELATIVE_FLOOR: f32 = 0.3;

/// Characters of text sample considered per document in the batch variant.
const BATCH_TEXT_SAMPLE_LIMIT: usize = 1_500;

/// One resolution request.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest<'a> {
    pub context: &'a str,
    pub signals: &'a [String],
    pub document_type: Option<&'a str>,
    pub category: Option<&'a str>,
    pub text_sample: Option<&'a str>,
    pub file_name: Option<&'a str>,
    pub max_results: usize,
}

/// A ranked registry entry with the reasons it matched.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub category: String,
    pub score: f32,
    pub match_reasons: Vec<String>,
}

/// One document's contribution to a batch resolution.
#[derive(Debug, Clone, Default)]
pub struct BatchDocument {
    pub signals: Vec<String>,
    pub file_name: Option<String>,
    pub text_sample: Option<String>,
}

/// Rank registry entries against the request.
pub fn resolve_references(
    registry: &ReferenceRegistry,
    request: &ResolveRequest<'_>,
) -> Vec<ResolvedReference> {
    let candidates = registry.active_for_context(request.context);

    let mut scored: Vec<ResolvedReference> = candidates
        .iter()
        .map(|reference| score_reference(reference, request))
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let top_score = scored.first().map(|r| r.score).unwrap_or(0.0);
    if top_score <= 0.0 {
        return diversity_fallback(&candidates, request.max_results);
    }

    let floor = ABSOLUTE_FLOOR.max(RELATIVE_FLOOR * top_score);
    scored.retain(|r| r.score >= floor && r.score > 0.0);
    scored.truncate(request.max_results);
    scored
}

fn score_reference(
    reference: &DocumentReference,
    request: &ResolveRequest<'_>,
) -> ResolvedReference {
    let mut score = 0.0f32;
    let mut reasons = Vec::new();

    // Exact type match
    if let Some(doc_type) = request.document_type {
        if reference.file_type.eq_ignore_ascii_case(doc_type) {
            score += 20.0;
            reasons.push(format!("type match '{doc_type}'"));
        }
    }

    // Filename patterns: bonus and penalty fire independently; when both
    // match the penalty is applied after the bonus and the net effect is a
    // subtraction.
    if let Some(file_name) = request.file_name {
        if let Some(pattern) = reference.filename_pattern_hit(file_name) {
            score += 15.0;
            reasons.push(format!("filename pattern '{pattern}'"));
        }
        if let Some(pattern) = reference.exclude_pattern_hit(file_name) {
            score -= 15.0;
            reasons.push(format!("exclude pattern '{pattern}'"));
        }
    }

    // Category match
    if let Some(category) = request.category {
        if reference.category.eq_ignore_ascii_case(category) {
            score += 8.0;
            reasons.push(format!("category match '{category}'"));
        }
    }

    // Tag scoring per namespace
    for tag in &reference.tags {
        let value = tag.value.to_lowercase();
        match tag.namespace {
            TagNamespace::Context => {
                if request.context.to_lowercase() == value {
                    score += 5.0 * tag.weight;
                    reasons.push(format!("context tag '{}'", tag.value));
                }
            }
            TagNamespace::Signal => {
                if has_signal(request.signals, &value) {
                    score += 4.0 * tag.weight;
                    reasons.push(format!("signal tag '{}'", tag.value));
                }
            }
            TagNamespace::Domain => {
                if has_signal(request.signals, &value) {
                    score += 3.0 * tag.weight;
                    reasons.push(format!("domain tag '{}'", tag.value));
                }
            }
            TagNamespace::Type => {
                if request
                    .document_type
                    .map(|t| t.to_lowercase() == value)
                    .unwrap_or(false)
                {
                    score += 20.0 * tag.weight;
                    reasons.push(format!("type tag '{}'", tag.value));
                }
            }
            TagNamespace::Trigger => {
                let all_present = value
                    .split('+')
                    .all(|part| has_signal(request.signals, part.trim()));
                if !value.is_empty() && all_present {
                    score += 8.0 * tag.weight;
                    reasons.push(format!("trigger tag '{}'", tag.value));
                }
            }
        }
    }

    // Keyword literals in the text sample (each distinct keyword counts once)
    if let Some(text) = request.text_sample {
        let text_lower = text.to_lowercase();
        let mut seen = HashSet::new();
        for keyword in &reference.keywords {
            let kw = keyword.to_lowercase();
            if !kw.is_empty() && seen.insert(kw.clone()) && text_lower.contains(&kw) {
                score += 1.0;
                reasons.push(format!("keyword '{keyword}'"));
            }
        }
    }

    // Decision rules whose signal set intersects the supplied signals
    for rule in &reference.rules {
        let intersects = rule
            .signals
            .iter()
            .any(|s| has_signal(request.signals, &s.to_lowercase()));
        if intersects {
            let mut contribution = rule.priority as f32 * 3.0;
            if rule.action == RuleAction::Require {
                contribution *= 2.0;
            }
            score += contribution;
            reasons.push(format!("rule priority {} ({:?})", rule.priority, rule.action));
        }
    }

    ResolvedReference {
        id: reference.id.clone(),
        name: reference.name.clone(),
        file_type: reference.file_type.clone(),
        category: reference.category.clone(),
        score,
        match_reasons: reasons,
    }
}

fn has_signal(signals: &[String], value: &str) -> bool {
    signals.iter().any(|s| s.to_lowercase() == value)
}

/// At most one entry per distinct category, up to `max_results`.
fn diversity_fallback(
    candidates: &[&DocumentReference],
    max_results: usize,
) -> Vec<ResolvedReference> {
    let mut seen_categories = HashSet::new();
    let mut picked = Vec::new();
    for reference in candidates {
        if picked.len() >= max_results {
            break;
        }
        if seen_categories.insert(reference.category.clone()) {
            picked.push(ResolvedReference {
                id: reference.id.clone(),
                name: reference.name.clone(),
                file_type: reference.file_type.clone(),
                category: reference.category.clone(),
                score: 0.0,
                match_reasons: vec!["diversity fallback".to_string()],
            });
        }
    }
    picked
}

/// Batch variant: union signals, filenames, and truncated text samples
/// across a document set, resolve each document individually, then merge by
/// keeping the maximum score and the union of match reasons per id.
pub fn resolve_references_batch(
    registry: &ReferenceRegistry,
    context: &str,
    documents: &[BatchDocument],
    max_results: usize,
) -> Vec<ResolvedReference> {
    let mut merged: HashMap<String, ResolvedReference> = HashMap::new();

    for document in documents {
        let sample: Option<String> = document
            .text_sample
            .as_ref()
            .map(|t| t.chars().take(BATCH_TEXT_SAMPLE_LIMIT).collect());
        let request = ResolveRequest {
            context,
            signals: &document.signals,
            document_type: None,
            category: None,
            text_sample: sample.as_deref(),
            file_name: document.file_name.as_deref(),
            max_results,
        };

        for resolved in resolve_references(registry, &request) {
            match merged.get_mut(&resolved.id) {
                Some(existing) => {
                    existing.score = existing.score.max(resolved.score);
                    for reason in resolved.match_reasons {
                        if !existing.match_reasons.contains(&reason) {
                            existing.match_reasons.push(reason);
                        }
                    }
                }
                None => {
                    merged.insert(resolved.id.clone(), resolved);
                }
            }
        }
    }

    let mut results: Vec<ResolvedReference> = merged.into_values().collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(max_results);
    results
}
