pub const DEFAULT_RXNAV_API_URL: &str = "https://rxnav.nlm.nih.gov/REST/rxcui.json";
pub const RXNAV_API_DOC_URL: &str = "https://lhncbc.nlm.nih.gov/RxNav/APIs/api-RxNorm.findRxcuiById.html";

pub const DEFAULT_NDC_CACHE_PATH: &str = "data/.rxnorm_ndc_cache.json";
pub const DEFAULT_RULES_PATH: &str = "data/rules.csv";

/// Provenance marker written to the `notes` column of every rule.
pub const SOURCE_TAG: &str = "CMS-PUF";

pub const RULES_HEADER: [&str; 13] = [
    "plan_id",
    "rxcui",
    "drug_name",
    "strength",
    "route",
    "tier",
    "pa",
    "st",
    "ql",
    "ql_max_qty",
    "ql_per_days",
    "alt_rxcui",
    "notes",
];
