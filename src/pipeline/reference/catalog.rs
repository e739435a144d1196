//! Built-in reference catalog.
//!
//! Assembles the startup registry from per-category construction functions.
//! Hosts with their own reference data can bypass this entirely via
//! `install_registry`.

use super::{
    DecisionRule, DocumentReference, ReferenceRegistry, ReferenceTag, RuleAction, TagNamespace,
};

/// Contexts every built-in entry participates in.
fn all_contexts() -> Vec<String> {
    vec![
        "summary".to_string(),
        "classification".to_string(),
        "checklist".to_string(),
    ]
}

fn reference(id: &str, name: &str, file_type: &str, category: &str) -> DocumentReference {
    DocumentReference {
        id: id.to_string(),
        name: name.to_string(),
        file_type: file_type.to_string(),
        category: category.to_string(),
        active: true,
        applicable_contexts: all_contexts(),
        tags: Vec::new(),
        keywords: Vec::new(),
        filename_patterns: Vec::new(),
        exclude_patterns: Vec::new(),
        learned_keywords: Vec::new(),
        rules: Vec::new(),
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Build the full built-in registry.
pub fn builtin() -> ReferenceRegistry {
    let mut entries = Vec::new();
    entries.extend(kyc_references());
    entries.extend(financial_references());
    entries.extend(legal_references());
    entries.extend(report_references());
    entries.extend(plan_references());
    ReferenceRegistry::new(entries)
}

fn kyc_references() -> Vec<DocumentReference> {
    let mut passport = reference("ref-passport", "Passport", "Passport", "KYC");
    passport.keywords = strings(&["passport", "nationality", "date of birth", "place of birth"]);
    passport.filename_patterns = strings(&["passport"]);
    passport.exclude_patterns = strings(&["passport\\s*photo\\s*guidelines"]);
    passport.tags = vec![
        ReferenceTag::new(TagNamespace::Type, "passport", 1.0),
        ReferenceTag::new(TagNamespace::Signal, "identity", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "kyc", 1.0),
        ReferenceTag::new(TagNamespace::Context, "classification", 0.5),
    ];
    passport.rules = vec![DecisionRule {
        priority: 3,
        signals: strings(&["identity"]),
        action: RuleAction::Require,
    }];

    let mut address = reference("ref-proof-address", "Proof of Address", "Proof of Address", "KYC");
    address.keywords = strings(&["utility bill", "council tax", "billing address", "account holder"]);
    address.filename_patterns = strings(&["utility", "council.?tax", "proof.?of.?address"]);
    address.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "identity", 0.8),
        ReferenceTag::new(TagNamespace::Domain, "kyc", 1.0),
    ];

    let mut track_record = reference("ref-track-record", "Track Record", "Track Record", "KYC");
    track_record.keywords = strings(&[
        "track record",
        "completed projects",
        "portfolio",
        "gdv",
        "development experience",
    ]);
    track_record.filename_patterns = strings(&["track.?record", "portfolio"]);
    track_record.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "multi_project", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "kyc", 0.8),
        ReferenceTag::new(TagNamespace::Trigger, "multi_project+report", 1.0),
    ];

    let mut incorporation = reference(
        "ref-incorporation",
        "Certificate of Incorporation",
        "Certificate of Incorporation",
        "KYC",
    );
    incorporation.keywords = strings(&[
        "certificate of incorporation",
        "companies house",
        "company number",
        "registrar of companies",
    ]);
    incorporation.filename_patterns = strings(&["incorporation", "cert.?of.?inc"]);
    incorporation.tags = vec![
        ReferenceTag::new(TagNamespace::Domain, "kyc", 1.0),
        ReferenceTag::new(TagNamespace::Signal, "legal", 0.5),
    ];

    vec![passport, address, track_record, incorporation]
}

fn financial_references() -> Vec<DocumentReference> {
    let mut bank = reference("ref-bank-statement", "Bank Statement", "Bank Statement", "Financial Documents");
    bank.keywords = strings(&[
        "statement",
        "account number",
        "sort code",
        "balance",
        "transactions",
        "opening balance",
        "closing balance",
    ]);
    bank.filename_patterns = strings(&["bank.?statement", "statement.*(barclays|hsbc|lloyds|natwest)"]);
    bank.exclude_patterns = strings(&["financial.?statement"]);
    bank.tags = vec![
        ReferenceTag::new(TagNamespace::Type, "bank statement", 1.0),
        ReferenceTag::new(TagNamespace::Signal, "financial", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "financial", 1.0),
    ];
    bank.rules = vec![DecisionRule {
        priority: 2,
        signals: strings(&["financial"]),
        action: RuleAction::Prefer,
    }];

    let mut accounts = reference(
        "ref-financial-statements",
        "Financial Statements",
        "Financial Statements",
        "Financial Documents",
    );
    accounts.keywords = strings(&[
        "balance sheet",
        "profit and loss",
        "income statement",
        "directors report",
        "auditor",
        "fixed assets",
    ]);
    accounts.filename_patterns = strings(&["accounts", "financial.?statement"]);
    accounts.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "financial", 1.0),
        ReferenceTag::new(TagNamespace::Signal, "report", 0.5),
        ReferenceTag::new(TagNamespace::Domain, "financial", 1.0),
    ];

    let mut model = reference("ref-financial-model", "Financial Model", "Financial Model", "Financial Documents");
    model.keywords = strings(&[
        "cashflow",
        "appraisal",
        "gdv",
        "build cost",
        "contingency",
        "profit on cost",
    ]);
    model.filename_patterns = strings(&["cashflow", "appraisal", "model.*xls"]);
    model.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "financial", 1.0),
        ReferenceTag::new(TagNamespace::Trigger, "financial+internal", 0.8),
    ];

    let mut tax = reference("ref-tax-return", "Tax Return", "Tax Return", "Financial Documents");
    tax.keywords = strings(&["tax return", "sa302", "hmrc", "tax year", "taxable income"]);
    tax.filename_patterns = strings(&["tax.?return", "sa302"]);
    tax.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "financial", 0.8),
        ReferenceTag::new(TagNamespace::Domain, "kyc", 0.5),
    ];

    vec![bank, accounts, model, tax]
}

fn legal_references() -> Vec<DocumentReference> {
    let mut lease = reference("ref-lease", "Lease Agreement", "Lease Agreement", "Legal Documents");
    lease.keywords = strings(&[
        "lease",
        "tenant",
        "landlord",
        "term of years",
        "rent",
        "demised premises",
    ]);
    lease.filename_patterns = strings(&["lease", "tenancy"]);
    lease.exclude_patterns = strings(&["release"]);
    lease.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "legal", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "legal", 1.0),
    ];

    let mut loan = reference("ref-loan", "Loan Agreement", "Loan Agreement", "Legal Documents");
    loan.keywords = strings(&[
        "facility",
        "borrower",
        "lender",
        "drawdown",
        "interest rate",
        "security",
        "covenant",
    ]);
    loan.filename_patterns = strings(&["facility", "loan.?agreement"]);
    loan.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "legal", 1.0),
        ReferenceTag::new(TagNamespace::Trigger, "legal+financial", 1.0),
    ];
    loan.rules = vec![DecisionRule {
        priority: 2,
        signals: strings(&["legal", "financial"]),
        action: RuleAction::Prefer,
    }];

    let mut planning = reference("ref-planning", "Planning Permission", "Planning Permission", "Legal Documents");
    planning.keywords = strings(&[
        "planning permission",
        "decision notice",
        "local planning authority",
        "conditions",
        "application number",
    ]);
    planning.filename_patterns = strings(&["planning", "decision.?notice"]);
    planning.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "legal", 0.8),
        ReferenceTag::new(TagNamespace::Domain, "legal", 0.8),
    ];

    vec![lease, loan, planning]
}

fn report_references() -> Vec<DocumentReference> {
    let mut valuation = reference("ref-valuation", "Valuation Report", "Valuation Report", "Professional Reports");
    valuation.keywords = strings(&[
        "valuation",
        "market value",
        "red book",
        "rics",
        "comparable evidence",
        "gross development value",
    ]);
    valuation.filename_patterns = strings(&["valuation", "red.?book"]);
    valuation.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "report", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "professional", 1.0),
        ReferenceTag::new(TagNamespace::Trigger, "report+financial", 0.8),
    ];
    valuation.rules = vec![DecisionRule {
        priority: 3,
        signals: strings(&["report"]),
        action: RuleAction::Prefer,
    }];

    let mut survey = reference("ref-survey", "Survey Report", "Survey Report", "Professional Reports");
    survey.keywords = strings(&[
        "survey",
        "structural",
        "condition",
        "defects",
        "inspection",
    ]);
    survey.filename_patterns = strings(&["survey", "structural"]);
    survey.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "report", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "professional", 0.8),
    ];

    vec![valuation, survey]
}

fn plan_references() -> Vec<DocumentReference> {
    let mut design = reference("ref-design", "Design Document", "Design Document", "Plans");
    design.keywords = strings(&[
        "drawing",
        "floor plan",
        "elevation",
        "scale",
        "site plan",
        "architect",
    ]);
    design.filename_patterns = strings(&["drawing", "plan", "elevation"]);
    design.exclude_patterns = strings(&["business.?plan", "planning"]);
    design.tags = vec![
        ReferenceTag::new(TagNamespace::Signal, "design", 1.0),
        ReferenceTag::new(TagNamespace::Domain, "design", 1.0),
    ];

    vec![design]
}
