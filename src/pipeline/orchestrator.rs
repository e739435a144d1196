//! Pipeline orchestrator: sequences every stage into one request/response
//! cycle.
//!
//! The orchestrator never aborts on a stage error. Every stage has a
//! deterministic fallback, so the worst outcome is a low-confidence,
//! review-flagged "Other" classification — never an unhandled failure.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::pipeline::cache::{
    content_hash, normalize_filename, ClassificationCache, CACHE_SAVE_THRESHOLD,
};
use crate::pipeline::canonical::folder_level;
use crate::pipeline::corrections::{fetch_correction_context, select_tier, CorrectionStore};
use crate::pipeline::events::{EventSink, StageOutcome, StageTimer};
use crate::pipeline::filename::match_filename;
use crate::pipeline::llm::CompletionClient;
use crate::pipeline::reference::{resolve_references, ReferenceRegistry, ResolveRequest};
use crate::pipeline::stages::{checklist, classification, critic, summary};
use crate::pipeline::types::{
    CacheEntry, ChecklistMatch, ClassificationDecision, ClassificationResult, ConfidenceFlag,
    DocumentSummary, PipelineInput, PipelineOutput,
};
use crate::pipeline::verifier::verify_classification;

/// Characters of extracted text offered to the reference resolver.
const RESOLVER_TEXT_SAMPLE: usize = 2_000;

/// References handed to each prompt as guidance.
const RESOLVER_MAX_RESULTS: usize = 5;

/// Filename checklist matches at or above this score count as strong
/// enough to warrant model confirmation.
const STRONG_FILENAME_MATCH: f32 = 0.8;

/// The classification pipeline with all its collaborators injected.
pub struct ClassificationPipeline {
    config: PipelineConfig,
    primary: Box<dyn CompletionClient>,
    /// Critic model; when absent the critic stage never runs.
    critic: Option<Box<dyn CompletionClient>>,
    corrections: Box<dyn CorrectionStore>,
    cache: Box<dyn ClassificationCache>,
    registry: Arc<ReferenceRegistry>,
    events: Box<dyn EventSink>,
}

impl ClassificationPipeline {
    pub fn new(
        config: PipelineConfig,
        primary: Box<dyn CompletionClient>,
        critic: Option<Box<dyn CompletionClient>>,
        corrections: Box<dyn CorrectionStore>,
        cache: Box<dyn ClassificationCache>,
        registry: Arc<ReferenceRegistry>,
        events: Box<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            primary,
            critic,
            corrections,
            cache,
            registry,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify one document end to end.
    pub fn classify(&self, input: &PipelineInput) -> PipelineOutput {
        let hash = content_hash(&input.extracted_text);
        info!(
            file_name = %input.file_name,
            content_hash = %hash,
            bypass_cache = input.bypass_cache,
            "Starting classification"
        );

        // ── Cache ──
        if !input.bypass_cache {
            let timer = StageTimer::start("cache");
            if let Some(entry) = self.cache.check(&hash) {
                self.events.emit(timer.finish(
                    StageOutcome::Completed,
                    vec![("hit_count", entry.hit_count.to_string())],
                ));
                return self.from_cache_hit(input, entry);
            }
            self.events
                .emit(timer.finish(StageOutcome::Completed, vec![("hit", "false".to_string())]));
        }

        // ── Filename heuristics ──
        let timer = StageTimer::start("filename");
        let filename_hint = match_filename(&input.file_name);
        let mut matches = checklist::fallback_matches(&input.file_name, &self.config);
        self.events.emit(timer.finish(
            StageOutcome::Completed,
            vec![
                (
                    "hint",
                    filename_hint
                        .as_ref()
                        .map(|h| h.file_type.clone())
                        .unwrap_or_else(|| "none".to_string()),
                ),
                ("checklist_matches", matches.len().to_string()),
            ],
        ));

        // ── Summary ──
        let text_sample: String = input
            .extracted_text
            .chars()
            .take(RESOLVER_TEXT_SAMPLE)
            .collect();
        let summary_refs = resolve_references(
            &self.registry,
            &ResolveRequest {
                context: "summary",
                signals: &[],
                document_type: filename_hint.as_ref().map(|h| h.file_type.as_str()),
                category: None,
                text_sample: Some(&text_sample),
                file_name: Some(&input.file_name),
                max_results: RESOLVER_MAX_RESULTS,
            },
        );
        let timer = StageTimer::start("summary");
        let (doc_summary, outcome) = summary::run(
            self.primary.as_ref(),
            &self.config.retry,
            &input.extracted_text,
            &input.file_name,
            &summary_refs,
        );
        self.events.emit(timer.finish(
            outcome,
            vec![("confidence", format!("{:.2}", doc_summary.analysis_confidence))],
        ));

        // ── Classification ──
        let signals = doc_summary.signals();
        let classification_refs = resolve_references(
            &self.registry,
            &ResolveRequest {
                context: "classification",
                signals: &signals,
                document_type: filename_hint.as_ref().map(|h| h.file_type.as_str()),
                category: None,
                text_sample: Some(&text_sample),
                file_name: Some(&input.file_name),
                max_results: RESOLVER_MAX_RESULTS,
            },
        );
        let timer = StageTimer::start("classification");
        let (mut decision, outcome) = classification::run(
            self.primary.as_ref(),
            &self.config,
            &doc_summary,
            &input.file_name,
            &classification_refs,
            filename_hint.as_ref().map(|h| h.file_type.as_str()),
        );
        self.events.emit(timer.finish(
            outcome,
            vec![
                ("file_type", decision.file_type.clone()),
                ("confidence", format!("{:.2}", decision.confidence)),
            ],
        ));

        // ── Deterministic verifier (below the high band only) ──
        let mut notes = Vec::new();
        if ConfidenceFlag::from_confidence(decision.confidence) != ConfidenceFlag::High {
            let rules = self.corrections.fetch_consolidated_rules(10);
            let timer = StageTimer::start("verifier");
            let outcome = verify_classification(
                &self.registry,
                &doc_summary,
                &input.file_name,
                &decision,
                &self.config.folders,
                &rules,
                &self.config.verifier,
            );
            let stage_outcome = if outcome.verified {
                StageOutcome::Completed
            } else {
                StageOutcome::Overridden
            };
            notes = outcome.notes;
            decision = outcome.decision;
            self.events.emit(timer.finish(
                stage_outcome,
                vec![
                    ("file_type", decision.file_type.clone()),
                    ("confidence", format!("{:.2}", decision.confidence)),
                ],
            ));
        }

        // ── Checklist (only when filename matching left gaps) ──
        if self.needs_checklist_stage(&matches) {
            let timer = StageTimer::start("checklist");
            let (model_matches, outcome) = checklist::run(
                self.primary.as_ref(),
                &self.config,
                &doc_summary,
                &decision,
                &input.file_name,
            );
            matches = checklist::merge_matches(matches, model_matches);
            self.events
                .emit(timer.finish(outcome, vec![("matches", matches.len().to_string())]));
        }

        // ── Critic ──
        let hint_type = filename_hint.as_ref().map(|h| h.file_type.as_str());
        if let Some(critic_client) = &self.critic {
            if critic::should_run(&decision, hint_type) {
                let tier = select_tier(decision.confidence, !decision.alternative_types.is_empty());
                let context =
                    fetch_correction_context(self.corrections.as_ref(), tier, &decision);
                debug!(?tier, "Running critic stage");
                let timer = StageTimer::start("critic");
                let (verdict, merged, outcome) = critic::run(
                    critic_client.as_ref(),
                    &self.config,
                    &doc_summary,
                    &decision,
                    hint_type,
                    &matches,
                    &context,
                );
                decision = verdict;
                matches = merged;
                self.events.emit(timer.finish(
                    outcome,
                    vec![
                        ("file_type", decision.file_type.clone()),
                        ("confidence", format!("{:.2}", decision.confidence)),
                    ],
                ));
            }
        }

        // ── Cache save ──
        if decision.confidence >= CACHE_SAVE_THRESHOLD {
            let timer = StageTimer::start("cache_save");
            // Grouping metadata only; lookups stay content-hash keyed.
            let normalized_name = normalize_filename(&input.file_name);
            info!(
                content_hash = %hash,
                normalized_file_name = %normalized_name,
                confidence = decision.confidence,
                "Caching classification"
            );
            self.cache.save(CacheEntry {
                content_hash: hash.clone(),
                classification: decision.clone(),
                valid: true,
                hit_count: 0,
            });
            self.events.emit(timer.finish(
                StageOutcome::Completed,
                vec![
                    ("content_hash", hash.clone()),
                    ("normalized_file_name", normalized_name),
                ],
            ));
        }

        self.build_output(decision, doc_summary, matches, notes, false, 0)
    }

    /// Model-call-free response assembled from a valid cache entry.
    fn from_cache_hit(&self, input: &PipelineInput, entry: CacheEntry) -> PipelineOutput {
        info!(
            content_hash = %entry.content_hash,
            hit_count = entry.hit_count,
            "Serving classification from cache"
        );
        let doc_summary = summary::fallback_summary(&input.extracted_text, &input.file_name);
        let matches = checklist::fallback_matches(&input.file_name, &self.config);
        self.build_output(
            entry.classification,
            doc_summary,
            matches,
            Vec::new(),
            true,
            entry.hit_count,
        )
    }

    /// Model confirmation is warranted when nothing matched yet, or a
    /// strong filename match still needs corroboration.
    fn needs_checklist_stage(&self, matches: &[ChecklistMatch]) -> bool {
        if self.config.checklist_items.is_empty() {
            return false;
        }
        matches.is_empty() || matches.iter().any(|m| m.confidence >= STRONG_FILENAME_MATCH)
    }

    fn build_output(
        &self,
        decision: ClassificationDecision,
        doc_summary: DocumentSummary,
        matches: Vec<ChecklistMatch>,
        notes: Vec<String>,
        from_cache: bool,
        cache_hit_count: u32,
    ) -> PipelineOutput {
        let flag = ConfidenceFlag::from_confidence(decision.confidence);
        let target_level = folder_level(&decision.suggested_folder, &self.config.folders);
        let result = ClassificationResult {
            file_type: decision.file_type,
            category: decision.category,
            suggested_folder: decision.suggested_folder,
            target_level,
            confidence: decision.confidence,
            confidence_flag: flag,
            requires_review: flag == ConfidenceFlag::Low,
            suggested_checklist_items: matches,
            verification_notes: notes,
            from_cache,
            cache_hit_count,
        };
        PipelineOutput {
            success: true,
            result,
            document_summary: doc_summary,
            available_checklist_items: self.config.checklist_items.clone(),
            available_folders: self.config.folders.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cache::MemoryCache;
    use crate::pipeline::corrections::{MemoryCorrectionStore, record_correction};
    use crate::pipeline::events::RecordingSink;
    use crate::pipeline::llm::MockCompletionClient;
    use crate::pipeline::reference::catalog;
    use crate::pipeline::retry::RetryPolicy;
    use crate::pipeline::types::CorrectionRecord;
    use chrono::Utc;
    use uuid::Uuid;

    fn input(text: &str, file_name: &str) -> PipelineInput {
        PipelineInput {
            extracted_text: text.to_string(),
            file_name: file_name.to_string(),
            file_size: 1024,
            mime_type: "application/pdf".to_string(),
            client_id: None,
            project_id: None,
            client_type: None,
            bypass_cache: false,
        }
    }

    fn pipeline(primary: MockCompletionClient) -> ClassificationPipeline {
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        ClassificationPipeline::new(
            config,
            Box::new(primary),
            None,
            Box::new(MemoryCorrectionStore::new()),
            Box::new(MemoryCache::new()),
            Arc::new(catalog::builtin()),
            Box::new(RecordingSink::new()),
        )
    }

    fn bank_statement_text() -> String {
        "Monthly bank statement for account 12345678. Opening balance 1,000. \
         Closing balance 2,000. Transactions listed below."
            .repeat(3)
    }

    #[test]
    fn unreachable_models_still_produce_a_classification() {
        // Scenario: every model call fails, identity flags come from the
        // filename, and the flag cascade lands on KYC.
        let pipeline = pipeline(MockCompletionClient::unreachable());
        let output = pipeline.classify(&input("tiny", "John_Smith_Passport_2024.pdf"));
        assert!(output.success);
        assert_eq!(output.result.category, "KYC");
        assert_eq!(output.result.suggested_folder, "kyc");
        // Never confident without a model, so never silently filed.
        assert!(output.result.confidence < CACHE_SAVE_THRESHOLD);
        assert!(!output.result.from_cache);
    }

    #[test]
    fn high_confidence_run_is_cached_and_replayed() {
        let response = r#"{"fileType": "Bank Statement", "category": "Financial Documents",
            "suggestedFolder": "operational_model", "confidence": 0.9,
            "reasoning": "statement"}"#;
        // Summary then classification on the first run; cache hit on the
        // second, so the queue is never consulted again.
        let client = MockCompletionClient::new(vec![
            r#"{"description": "bank statement", "isFinancial": true,
                "keyTerms": ["bank", "statement"], "analysisConfidence": 0.9}"#,
            response,
        ]);
        let pipeline = pipeline(client);
        let text = bank_statement_text();

        let first = pipeline.classify(&input(&text, "statement_jan.pdf"));
        assert_eq!(first.result.file_type, "Bank Statement");
        assert!(!first.result.from_cache);

        let second = pipeline.classify(&input(&text, "statement_feb.pdf"));
        assert!(second.result.from_cache);
        assert_eq!(second.result.file_type, "Bank Statement");
        assert_eq!(second.result.category, "Financial Documents");
        assert_eq!(second.result.cache_hit_count, 1);
    }

    #[test]
    fn bypass_cache_skips_replay() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Bank Statement", "category": "Financial Documents",
                "confidence": 0.9, "reasoning": "", "isFinancial": true,
                "description": "statement", "analysisConfidence": 0.9}"#,
        );
        let pipeline = pipeline(client);
        let text = bank_statement_text();
        pipeline.classify(&input(&text, "statement.pdf"));

        let mut request = input(&text, "statement.pdf");
        request.bypass_cache = true;
        let output = pipeline.classify(&request);
        assert!(!output.result.from_cache);
    }

    #[test]
    fn low_confidence_results_are_not_cached() {
        let pipeline = pipeline(MockCompletionClient::unreachable());
        let text = bank_statement_text();
        // Fallback cascade confidence is 0.4, below the save threshold.
        let first = pipeline.classify(&input(&text, "doc.pdf"));
        assert!(first.result.confidence < CACHE_SAVE_THRESHOLD);
        let second = pipeline.classify(&input(&text, "doc.pdf"));
        assert!(!second.result.from_cache);
    }

    #[test]
    fn correction_invalidates_cached_classification() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Bank Statement", "category": "Financial Documents",
                "confidence": 0.9, "reasoning": "", "isFinancial": true,
                "description": "statement", "analysisConfidence": 0.9}"#,
        );
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        let store = MemoryCorrectionStore::new();
        let cache = MemoryCache::new();
        let text = bank_statement_text();
        let hash = content_hash(&text);

        let pipeline = ClassificationPipeline::new(
            config,
            Box::new(client),
            None,
            Box::new(store),
            Box::new(cache),
            Arc::new(catalog::builtin()),
            Box::new(RecordingSink::new()),
        );
        let first = pipeline.classify(&input(&text, "statement.pdf"));
        assert!(first.result.confidence >= CACHE_SAVE_THRESHOLD);

        record_correction(
            &MemoryCorrectionStore::new(),
            pipeline.cache.as_ref(),
            CorrectionRecord {
                id: Uuid::new_v4(),
                content_hash: hash,
                field: "fileType".into(),
                from_value: "Bank Statement".into(),
                to_value: "Financial Statements".into(),
                relevance: 1.0,
                corrected_at: Utc::now(),
            },
        );

        let second = pipeline.classify(&input(&text, "statement.pdf"));
        assert!(!second.result.from_cache);
    }

    #[test]
    fn critic_overrides_doubtful_classification() {
        // Primary queue: summary, then classification at low confidence.
        let primary = MockCompletionClient::new(vec![
            r#"{"description": "unclear scan", "analysisConfidence": 0.5}"#,
            r#"{"fileType": "Other", "category": "Other", "confidence": 0.45,
                "reasoning": "unclear"}"#,
        ]);
        let critic = MockCompletionClient::single(
            r#"{"fileType": "Lease Agreement", "category": "Legal Documents",
                "suggestedFolder": "background", "confidence": 0.82,
                "reasoning": "lease terms present"}"#,
        );
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        let sink = Arc::new(RecordingSink::new());
        let pipeline = ClassificationPipeline::new(
            config,
            Box::new(primary),
            Some(Box::new(critic)),
            Box::new(MemoryCorrectionStore::new()),
            Box::new(MemoryCache::new()),
            Arc::new(catalog::builtin()),
            Box::new(Arc::clone(&sink)),
        );

        let output = pipeline.classify(&input(&bank_statement_text(), "scan_0001.pdf"));
        assert_eq!(output.result.file_type, "Lease Agreement");
        assert_eq!(output.result.suggested_folder, "background");
        assert!(sink.stage_names().contains(&"critic"));
    }

    #[test]
    fn cache_save_reports_normalized_filename_for_grouping() {
        let client = MockCompletionClient::single(
            r#"{"fileType": "Bank Statement", "category": "Financial Documents",
                "confidence": 0.9, "reasoning": "", "isFinancial": true,
                "description": "statement", "analysisConfidence": 0.9}"#,
        );
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        let sink = Arc::new(RecordingSink::new());
        let pipeline = ClassificationPipeline::new(
            config,
            Box::new(client),
            None,
            Box::new(MemoryCorrectionStore::new()),
            Box::new(MemoryCache::new()),
            Arc::new(catalog::builtin()),
            Box::new(Arc::clone(&sink)),
        );

        pipeline.classify(&input(&bank_statement_text(), "Statement_2024-01-15_final.pdf"));

        let save_event = sink
            .events()
            .into_iter()
            .find(|e| e.stage == "cache_save")
            .expect("high-confidence run should record a cache save");
        let normalized = save_event
            .metrics
            .iter()
            .find(|(key, _)| *key == "normalized_file_name")
            .map(|(_, value)| value.clone())
            .expect("save event should carry the normalized filename");
        assert_eq!(normalized, "statement_{date}_final_pdf");
    }

    #[test]
    fn low_confidence_run_records_no_cache_save_event() {
        let sink = Arc::new(RecordingSink::new());
        let mut config = PipelineConfig::with_default_taxonomy();
        config.retry = RetryPolicy::immediate(1);
        let pipeline = ClassificationPipeline::new(
            config,
            Box::new(MockCompletionClient::unreachable()),
            None,
            Box::new(MemoryCorrectionStore::new()),
            Box::new(MemoryCache::new()),
            Arc::new(catalog::builtin()),
            Box::new(Arc::clone(&sink)),
        );
        pipeline.classify(&input(&bank_statement_text(), "doc.pdf"));
        assert!(!sink.stage_names().contains(&"cache_save"));
    }

    #[test]
    fn result_carries_folder_level_and_availability_context() {
        let pipeline = pipeline(MockCompletionClient::unreachable());
        let output = pipeline.classify(&input("tiny", "passport.pdf"));
        assert_eq!(output.result.target_level, crate::pipeline::types::FolderLevel::Client);
        assert_eq!(output.available_folders.len(), 6);
        assert!(output.available_checklist_items.is_empty());
    }
}
