//! Row normalization for CMS formulary tables.
//!
//! Column names drift between PUF vintages, so each logical field is read
//! from an ordered list of candidate columns. The first non-empty value wins.
//! Add new spellings to the tables below; the extraction code never changes.

use crate::table::RawRow;

pub const CONTRACT_COLUMNS: &[&str] = &["CONTRACT_ID", "PARENT_ORGANIZATION_CONTRACT_ID"];
pub const PLAN_COLUMNS: &[&str] = &["PLAN_ID", "PBP"];
pub const NDC_COLUMNS: &[&str] = &["NDC", "NDC_11"];
pub const TIER_COLUMNS: &[&str] = &["TIER", "FORMULARY_TIER"];

pub const PRIOR_AUTH_COLUMNS: &[&str] = &["PRIOR_AUTHORIZATION_FLAG"];
pub const STEP_THERAPY_COLUMNS: &[&str] = &["STEP_THERAPY_FLAG"];
pub const QUANTITY_LIMIT_COLUMNS: &[&str] = &["QUANTITY_LIMIT_FLAG"];
pub const QL_QTY_COLUMNS: &[&str] = &["QL_QTY"];
pub const QL_DAYS_COLUMNS: &[&str] = &["QL_DAYS"];

const TRUTHY: &[&str] = &["Y", "YES", "TRUE", "T", "1"];

/// A formulary row that passed field validation but has not been resolved
/// to an RxCUI yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRule {
    pub contract_id: String,
    pub plan_id: String,
    pub ndc: String,
    pub tier: String,
    pub prior_auth: bool,
    pub step_therapy: bool,
    pub quantity_limit: bool,
    pub ql_max_qty: String,
    pub ql_per_days: String,
}

impl CandidateRule {
    pub fn plan_key(&self) -> String {
        format!("{}-{}", self.contract_id, self.plan_id)
    }
}

/// First non-empty value among `candidates`.
pub fn first_present<'a>(row: &'a RawRow, candidates: &[&str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|key| row.get(*key))
        .map(String::as_str)
        .find(|v| !v.is_empty())
}

pub fn normalize_flag(value: &str) -> bool {
    let value = value.trim();
    TRUTHY.iter().any(|t| t.eq_ignore_ascii_case(value))
}

pub fn strip_ndc(raw: &str) -> String {
    raw.replace('-', "").trim().to_string()
}

fn flag(row: &RawRow, candidates: &[&str]) -> bool {
    first_present(row, candidates).is_some_and(normalize_flag)
}

fn passthrough(row: &RawRow, candidates: &[&str]) -> String {
    first_present(row, candidates).unwrap_or("").to_string()
}

/// Returns `None` when contract, plan, NDC or tier is missing.
pub fn normalize_row(row: &RawRow) -> Option<CandidateRule> {
    let contract_id = first_present(row, CONTRACT_COLUMNS)?;
    let plan_id = first_present(row, PLAN_COLUMNS)?;
    let ndc = strip_ndc(first_present(row, NDC_COLUMNS)?);
    if ndc.is_empty() {
        return None;
    }
    let tier = first_present(row, TIER_COLUMNS)?;

    Some(CandidateRule {
        contract_id: contract_id.to_string(),
        plan_id: plan_id.to_string(),
        ndc,
        tier: tier.to_string(),
        prior_auth: flag(row, PRIOR_AUTH_COLUMNS),
        step_therapy: flag(row, STEP_THERAPY_COLUMNS),
        quantity_limit: flag(row, QUANTITY_LIMIT_COLUMNS),
        ql_max_qty: passthrough(row, QL_QTY_COLUMNS),
        ql_per_days: passthrough(row, QL_DAYS_COLUMNS),
    })
}
