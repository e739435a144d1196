//! Pipeline configuration: the caller-supplied taxonomy (valid file types,
//! categories, folders), outstanding checklist items, and tunables.
//!
//! The pipeline never invents enumeration members; everything it emits is
//! validated against this configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::types::{ChecklistItem, FolderDef, FolderLevel};
use crate::pipeline::verifier::VerifierParams;

pub const APP_NAME: &str = "docroute";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything one classification request needs beyond the document itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Valid file types, e.g. "Passport", "Bank Statement".
    pub file_types: Vec<String>,
    /// Per-type definition keywords used by the canonical cascade.
    #[serde(default)]
    pub file_type_definitions: HashMap<String, Vec<String>>,
    /// Valid categories, e.g. "KYC", "Financial Documents".
    pub categories: Vec<String>,
    #[serde(default)]
    pub category_definitions: HashMap<String, Vec<String>>,
    /// Folder set the suggested folder must belong to.
    pub folders: Vec<FolderDef>,
    /// Outstanding checklist items for the active client/project.
    #[serde(default)]
    pub checklist_items: Vec<ChecklistItem>,
    #[serde(default)]
    pub verifier: VerifierParams,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    /// Configuration over the built-in taxonomy with no checklist.
    pub fn with_default_taxonomy() -> Self {
        Self {
            file_types: default_file_types(),
            file_type_definitions: default_file_type_definitions(),
            categories: default_categories(),
            category_definitions: default_category_definitions(),
            folders: default_folders(),
            checklist_items: Vec::new(),
            verifier: VerifierParams::default(),
            retry: RetryPolicy::default(),
        }
    }
}

pub fn default_file_types() -> Vec<String> {
    [
        "Passport",
        "Driving Licence",
        "ID Document",
        "Proof of Address",
        "Bank Statement",
        "Financial Statements",
        "Management Accounts",
        "Financial Model",
        "Tax Return",
        "Valuation Report",
        "Survey Report",
        "Report",
        "Lease Agreement",
        "Loan Agreement",
        "Certificate of Incorporation",
        "Track Record",
        "Planning Permission",
        "Design Document",
        "Insurance Policy",
        "CV",
        "Invoice",
        "Financial Document",
        "Legal Document",
        "Correspondence",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_categories() -> Vec<String> {
    [
        "KYC",
        "Financial Documents",
        "Legal Documents",
        "Plans",
        "Professional Reports",
        "Correspondence",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

pub fn default_file_type_definitions() -> HashMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("Passport", &["passport", "travel document", "nationality"]),
        ("Driving Licence", &["driving", "licence", "dvla"]),
        ("ID Document", &["identity", "identification", "id card"]),
        ("Proof of Address", &["utility bill", "council tax", "address"]),
        ("Bank Statement", &["bank", "statement", "account", "balance"]),
        ("Financial Statements", &["balance sheet", "profit", "loss", "audited"]),
        ("Management Accounts", &["management", "accounts", "monthly"]),
        ("Financial Model", &["cashflow", "forecast", "appraisal", "model"]),
        ("Tax Return", &["tax", "hmrc", "self assessment", "return"]),
        ("Valuation Report", &["valuation", "market value", "red book"]),
        ("Survey Report", &["survey", "structural", "condition"]),
        ("Lease Agreement", &["lease", "tenancy", "landlord", "tenant"]),
        ("Loan Agreement", &["loan", "facility", "lender", "borrower"]),
        ("Certificate of Incorporation", &["incorporation", "companies house", "certificate"]),
        ("Track Record", &["track record", "portfolio", "experience", "completed projects"]),
        ("Planning Permission", &["planning", "permission", "consent", "application"]),
        ("Design Document", &["drawing", "elevation", "floor plan", "design"]),
        ("Insurance Policy", &["insurance", "policy", "cover", "indemnity"]),
        ("CV", &["curriculum vitae", "cv", "resume"]),
        ("Invoice", &["invoice", "payment due", "vat"]),
    ];
    entries
        .iter()
        .map(|(name, keywords)| {
            (
                name.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}

pub fn default_category_definitions() -> HashMap<String, Vec<String>> {
    let entries: &[(&str, &[&str])] = &[
        ("KYC", &["identity", "passport", "address", "know your customer"]),
        ("Financial Documents", &["bank", "accounts", "tax", "financial", "cashflow"]),
        ("Legal Documents", &["lease", "loan", "agreement", "contract", "legal"]),
        ("Plans", &["planning", "drawing", "design", "architectural"]),
        ("Professional Reports", &["valuation", "survey", "report", "appraisal"]),
        ("Correspondence", &["letter", "email", "correspondence"]),
    ];
    entries
        .iter()
        .map(|(name, keywords)| {
            (
                name.to_string(),
                keywords.iter().map(|k| k.to_string()).collect(),
            )
        })
        .collect()
}

pub fn default_folders() -> Vec<FolderDef> {
    let entries: &[(&str, &str, FolderLevel)] = &[
        ("kyc", "KYC", FolderLevel::Client),
        ("operational_model", "Operational Model", FolderLevel::Project),
        ("background", "Background", FolderLevel::Project),
        ("credit_submission", "Credit Submission", FolderLevel::Project),
        ("correspondence", "Correspondence", FolderLevel::Project),
        ("miscellaneous", "Miscellaneous", FolderLevel::Project),
    ];
    entries
        .iter()
        .map(|(key, name, level)| FolderDef {
            folder_key: key.to_string(),
            name: name.to_string(),
            level: *level,
        })
        .collect()
}
