//! Filename pattern matcher.
//!
//! Maps filename text to a candidate type/category/folder hint via an
//! ordered, exclusion-aware keyword table, and scores checklist items
//! against a filename with a four-tier cascade. No model calls — this is
//! the cheapest signal the pipeline has and it runs on every request.

use crate::pipeline::types::{ChecklistItem, ChecklistMatch};

/// Confidence assigned to any filename-table hit.
pub const FILENAME_MATCH_CONFIDENCE: f32 = 0.85;

/// Words ignored by the word-overlap tier.
const STOP_WORDS: &[&str] = &["the", "of", "and", "a", "for", "to", "in", "on"];

/// A candidate classification derived from the filename alone.
#[derive(Debug, Clone, PartialEq)]
pub struct FilenameMatch {
    pub file_type: String,
    pub category: String,
    pub folder: String,
    pub confidence: f32,
}

struct FilenameRule {
    keywords: &'static [&'static str],
    file_type: &'static str,
    category: &'static str,
    folder: &'static str,
    exclude_if: &'static [&'static str],
}

/// Ordered rule table — first matching entry wins, so specific rules must
/// precede general ones ("bank statement" before "statement").
const FILENAME_RULES: &[FilenameRule] = &[
    FilenameRule {
        keywords: &["passport"],
        file_type: "Passport",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["driving licence", "driving license", "drivers licence", "drivers license"],
        file_type: "Driving Licence",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["utility bill", "council tax", "proof of address"],
        file_type: "Proof of Address",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["bank statement"],
        file_type: "Bank Statement",
        category: "Financial Documents",
        folder: "operational_model",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["management accounts", "annual accounts", "statutory accounts"],
        file_type: "Financial Statements",
        category: "Financial Documents",
        folder: "operational_model",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["financial statement", "balance sheet", "profit and loss", "p&l"],
        file_type: "Financial Statements",
        category: "Financial Documents",
        folder: "operational_model",
        // A bank statement also contains "statement"; keep it on its own rule.
        exclude_if: &["bank"],
    },
    FilenameRule {
        keywords: &["tax return", "sa302", "tax computation"],
        file_type: "Tax Return",
        category: "Financial Documents",
        folder: "operational_model",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["cashflow", "cash flow", "budget", "appraisal model", "development appraisal"],
        file_type: "Financial Model",
        category: "Financial Documents",
        folder: "operational_model",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["valuation", "red book"],
        file_type: "Valuation Report",
        category: "Professional Reports",
        folder: "credit_submission",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["survey", "structural report", "condition report"],
        file_type: "Survey Report",
        category: "Professional Reports",
        folder: "credit_submission",
        exclude_if: &["questionnaire"],
    },
    FilenameRule {
        keywords: &["lease", "tenancy agreement", "ast"],
        file_type: "Lease Agreement",
        category: "Legal Documents",
        folder: "background",
        exclude_if: &["release"],
    },
    FilenameRule {
        keywords: &["facility letter", "loan agreement", "facility agreement"],
        file_type: "Loan Agreement",
        category: "Legal Documents",
        folder: "background",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["certificate of incorporation", "cert of inc", "companies house"],
        file_type: "Certificate of Incorporation",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["track record", "portfolio schedule", "development experience"],
        file_type: "Track Record",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["planning permission", "planning decision", "decision notice"],
        file_type: "Planning Permission",
        category: "Legal Documents",
        folder: "background",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["drawing", "floor plan", "site plan", "elevation"],
        file_type: "Design Document",
        category: "Plans",
        folder: "background",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["insurance", "policy schedule", "indemnity"],
        file_type: "Insurance Policy",
        category: "Legal Documents",
        folder: "background",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["cv", "resume", "biography"],
        file_type: "CV",
        category: "KYC",
        folder: "kyc",
        exclude_if: &[],
    },
    FilenameRule {
        keywords: &["invoice", "receipt"],
        file_type: "Invoice",
        category: "Financial Documents",
        folder: "operational_model",
        exclude_if: &[],
    },
];

/// Curated item-name aliases for the checklist scorer's third tier.
const CHECKLIST_ALIASES: &[(&str, &[&str])] = &[
    ("proof of address", &["utility bill", "council tax", "bank statement"]),
    ("proof of identity", &["passport", "driving licence", "driving license", "id card"]),
    ("track record", &["portfolio", "development experience", "project history"]),
    ("financial statements", &["annual accounts", "management accounts", "balance sheet"]),
    ("certificate of incorporation", &["cert of inc", "incorporation", "companies house"]),
    ("planning permission", &["decision notice", "planning decision"]),
    ("valuation report", &["red book", "valuation"]),
];

/// Lowercase a filename and collapse separators to single spaces.
pub fn normalize_filename_text(file_name: &str) -> String {
    let mut out = String::with_capacity(file_name.len());
    let mut last_space = true;
    for ch in file_name.to_lowercase().chars() {
        if ch == '-' || ch == '_' || ch == '.' || ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}

/// Walk the rule table and return the first entry where any keyword is
/// present and no exclusion keyword is. `None` when nothing matches.
pub fn match_filename(file_name: &str) -> Option<FilenameMatch> {
    let normalized = normalize_filename_text(file_name);
    if normalized.is_empty() {
        return None;
    }

    for rule in FILENAME_RULES {
        let hit = rule.keywords.iter().any(|kw| normalized.contains(kw));
        if !hit {
            continue;
        }
        let excluded = rule.exclude_if.iter().any(|kw| normalized.contains(kw));
        if excluded {
            continue;
        }
        return Some(FilenameMatch {
            file_type: rule.file_type.to_string(),
            category: rule.category.to_string(),
            folder: rule.folder.to_string(),
            confidence: FILENAME_MATCH_CONFIDENCE,
        });
    }

    None
}

/// Score checklist items against a filename.
///
/// Four-tier cascade, keeping only the single highest-scoring tier reached
/// per item: item-name containment (0.9), acceptable-type alias containment
/// (0.85), curated alias table (0.8), word overlap (0.6).
pub fn match_checklist_items(file_name: &str, items: &[ChecklistItem]) -> Vec<ChecklistMatch> {
    let normalized = normalize_filename_text(file_name);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for item in items {
        if let Some((confidence, reasoning)) = score_item(&normalized, item) {
            matches.push(ChecklistMatch {
                item_id: item.id.clone(),
                confidence,
                reasoning,
            });
        }
    }
    matches
}

fn score_item(normalized: &str, item: &ChecklistItem) -> Option<(f32, String)> {
    let item_name = item.name.to_lowercase();

    // Tier 1: exact/near-exact phrase containment of the item name
    if normalized.contains(&item_name) {
        return Some((0.9, format!("Filename contains item name '{}'", item.name)));
    }

    // Tier 2: containment of a known acceptable-document-type alias
    for alias in &item.acceptable_types {
        let alias_lower = alias.to_lowercase();
        if !alias_lower.is_empty() && normalized.contains(&alias_lower) {
            return Some((0.85, format!("Filename contains acceptable type '{alias}'")));
        }
    }

    // Tier 3: curated pattern-alias table
    for (name, aliases) in CHECKLIST_ALIASES {
        if *name == item_name {
            for alias in *aliases {
                if normalized.contains(alias) {
                    return Some((0.8, format!("Filename matches alias '{alias}'")));
                }
            }
        }
    }

    // Tier 4: word overlap — ≥ 2 shared meaningful words, or ≥ 1 when the
    // item name only has 2 or fewer meaningful words.
    let item_words = meaningful_words(&item_name);
    let file_words = meaningful_words(normalized);
    let shared: Vec<&String> = item_words.iter().filter(|w| file_words.contains(w)).collect();
    let required = if item_words.len() <= 2 { 1 } else { 2 };
    if !item_words.is_empty() && shared.len() >= required {
        let words = shared
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Some((0.6, format!("Filename shares words: {words}")));
    }

    None
}

fn meaningful_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter(|w| w.len() >= 3 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::ItemStatus;

    fn item(id: &str, name: &str, acceptable: &[&str]) -> ChecklistItem {
        ChecklistItem {
            id: id.to_string(),
            name: name.to_string(),
            acceptable_types: acceptable.iter().map(|s| s.to_string()).collect(),
            status: ItemStatus::Missing,
        }
    }

    #[test]
    fn normalizes_separators_and_case() {
        assert_eq!(
            normalize_filename_text("John_Smith-Passport.2024.pdf"),
            "john smith passport 2024 pdf"
        );
    }

    #[test]
    fn passport_filename_matches() {
        let m = match_filename("John_Smith_Passport_2024.pdf").unwrap();
        assert_eq!(m.file_type, "Passport");
        assert_eq!(m.category, "KYC");
        assert_eq!(m.folder, "kyc");
        assert_eq!(m.confidence, 0.85);
    }

    #[test]
    fn bank_statement_wins_over_generic_statement_rule() {
        let m = match_filename("barclays-bank-statement-jan.pdf").unwrap();
        assert_eq!(m.file_type, "Bank Statement");
    }

    #[test]
    fn exclusion_keyword_skips_rule() {
        // "deed of release" contains "lease" but the exclusion blocks it.
        assert!(match_filename("deed_of_release.pdf").is_none());
    }

    #[test]
    fn unknown_filename_returns_none() {
        assert!(match_filename("scan0001.pdf").is_none());
        assert!(match_filename("").is_none());
    }

    #[test]
    fn checklist_tier1_item_name_containment() {
        let items = vec![item("i1", "Track Record", &[])];
        let matches = match_checklist_items("Smith_Track_Record_2024.pdf", &items);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn checklist_tier2_acceptable_type_alias() {
        let items = vec![item("i1", "Identity Evidence", &["Passport"])];
        let matches = match_checklist_items("john_passport.pdf", &items);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.85);
    }

    #[test]
    fn checklist_tier3_curated_alias() {
        let items = vec![item("i1", "Proof of Address", &[])];
        let matches = match_checklist_items("council_tax_2024.pdf", &items);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.8);
    }

    #[test]
    fn checklist_tier4_word_overlap() {
        let items = vec![item("i1", "Development Appraisal Spreadsheet", &[])];
        let matches = match_checklist_items("final_development_spreadsheet_v3.xlsx", &items);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.6);
    }

    #[test]
    fn checklist_short_item_name_needs_one_shared_word() {
        let items = vec![item("i1", "Valuation", &[])];
        let matches = match_checklist_items("draft_valuation_v2.pdf", &items);
        assert_eq!(matches.len(), 1);
        // Tier 1 containment wins here — the full name appears in the filename.
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn checklist_keeps_only_highest_tier() {
        // The item name is contained AND words overlap; only tier 1 is kept.
        let items = vec![item("i1", "Bank Statement", &["Bank Statement"])];
        let matches = match_checklist_items("bank_statement_march.pdf", &items);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].confidence, 0.9);
    }

    #[test]
    fn checklist_no_match_for_unrelated_filename() {
        let items = vec![item("i1", "Planning Permission", &[])];
        assert!(match_checklist_items("holiday_photo.jpg", &items).is_empty());
    }

    #[test]
    fn rule_table_stays_within_default_taxonomy() {
        // A hint outside the taxonomy can never agree with a canonicalized
        // decision, which would make the critic gate fire on every hit.
        let file_types = crate::config::default_file_types();
        let categories = crate::config::default_categories();
        let folders = crate::config::default_folders();
        for rule in FILENAME_RULES {
            assert!(
                file_types.iter().any(|t| t == rule.file_type),
                "unknown file type '{}' in rule table",
                rule.file_type
            );
            assert!(
                categories.iter().any(|c| c == rule.category),
                "unknown category '{}' in rule table",
                rule.category
            );
            assert!(
                folders.iter().any(|f| f.folder_key == rule.folder),
                "unknown folder '{}' in rule table",
                rule.folder
            );
        }
    }

    #[test]
    fn insurance_hint_matches_taxonomy_label() {
        let hit = match_filename("buildings_insurance_policy.pdf").unwrap();
        assert_eq!(hit.file_type, "Insurance Policy");
        assert_eq!(hit.category, "Legal Documents");
    }
}
