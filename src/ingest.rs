use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use csv::Writer;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cache::NdcCache;
use crate::cli::IngestArgs;
use crate::common::tmp_path;
use crate::constants::{RULES_HEADER, RXNAV_API_DOC_URL, SOURCE_TAG};
use crate::error::{IngestError, Result};
use crate::normalize::{CandidateRule, normalize_row};
use crate::rxnorm::{NdcResolver, RetryPolicy, RxNavClient, RxcuiLookup};
use crate::table::FormularyTable;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub rows_read: usize,
    pub rows_written: usize,
}

/// One line of the canonical rules table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub plan_key: String,
    pub rxcui: String,
    pub drug_name: String,
    pub strength: String,
    pub route: String,
    pub tier: String,
    pub prior_auth: bool,
    pub step_therapy: bool,
    pub quantity_limit: bool,
    pub ql_max_qty: String,
    pub ql_per_days: String,
    pub alt_rxcui: String,
    pub source_tag: &'static str,
}

impl Rule {
    pub fn new(candidate: CandidateRule, rxcui: String) -> Self {
        Self {
            plan_key: candidate.plan_key(),
            rxcui,
            drug_name: String::new(),
            strength: String::new(),
            route: String::new(),
            tier: candidate.tier,
            prior_auth: candidate.prior_auth,
            step_therapy: candidate.step_therapy,
            quantity_limit: candidate.quantity_limit,
            ql_max_qty: candidate.ql_max_qty,
            ql_per_days: candidate.ql_per_days,
            alt_rxcui: String::new(),
            source_tag: SOURCE_TAG,
        }
    }

    /// Fields in `RULES_HEADER` order.
    pub fn record(&self) -> [&str; 13] {
        [
            &self.plan_key,
            &self.rxcui,
            &self.drug_name,
            &self.strength,
            &self.route,
            &self.tier,
            flag_cell(self.prior_auth),
            flag_cell(self.step_therapy),
            flag_cell(self.quantity_limit),
            &self.ql_max_qty,
            &self.ql_per_days,
            &self.alt_rxcui,
            self.source_tag,
        ]
    }
}

// Existing rules consumers expect capitalized booleans.
fn flag_cell(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

pub async fn run(opts: IngestArgs) -> anyhow::Result<()> {
    tracing::info!("RxNav API reference: {}", RXNAV_API_DOC_URL);
    tracing::info!(
        input = %opts.input_path.display(),
        output = %opts.output_path.display(),
        cache = %opts.lookup.cache_path.display(),
        "formulary-ingest ingest"
    );

    let output_path = opts.output_path.clone();
    let stats = tokio::task::spawn_blocking(move || {
        let mut cache = NdcCache::open(&opts.lookup.cache_path);
        ingest_with_rxnav(
            &opts.input_path,
            &opts.output_path,
            &mut cache,
            &opts.lookup.rxnav_url,
            opts.lookup.retry_policy(),
        )
    })
    .await
    .context("ingest task panicked")??;

    println!(
        "Parsed {} rows, wrote {} rules to {}",
        stats.rows_read,
        stats.rows_written,
        output_path.display()
    );
    Ok(())
}

/// Builds an RxNav-backed resolver over `cache` and runs [`ingest`].
pub fn ingest_with_rxnav(
    input_path: &Path,
    output_path: &Path,
    cache: &mut NdcCache,
    rxnav_url: &str,
    policy: RetryPolicy,
) -> Result<IngestStats> {
    let client = RxNavClient::new(rxnav_url).map_err(IngestError::HttpClient)?;
    let mut resolver = NdcResolver::new(cache, client, policy);
    ingest(input_path, output_path, &mut resolver)
}

/// Streams the formulary table at `input_path` into a rules CSV at
/// `output_path`. Rows that fail validation or NDC resolution are counted as
/// read but not written.
pub fn ingest<L: RxcuiLookup>(
    input_path: &Path,
    output_path: &Path,
    resolver: &mut NdcResolver<'_, L>,
) -> Result<IngestStats> {
    let started = Instant::now();
    let mut table = FormularyTable::open(input_path)?;
    tracing::info!(
        input = %input_path.display(),
        table = table.name(),
        "Reading formulary table"
    );

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
    }

    let tmp = tmp_path(output_path);
    let stats = match write_rules(&mut table, &tmp, resolver) {
        Ok(stats) => stats,
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
    };
    fs::rename(&tmp, output_path).map_err(|e| IngestError::io(output_path, e))?;

    tracing::info!(
        output = %output_path.display(),
        rows_read = stats.rows_read,
        rows_written = stats.rows_written,
        remote_lookups = resolver.remote_calls(),
        cache_entries = resolver.cache().len(),
        cache_writes = resolver.cache().writes(),
        "Ingestion finished in {:.1}s",
        started.elapsed().as_secs_f64()
    );
    Ok(stats)
}

fn write_rules<L: RxcuiLookup>(
    table: &mut FormularyTable,
    tmp: &Path,
    resolver: &mut NdcResolver<'_, L>,
) -> Result<IngestStats> {
    let mut writer = Writer::from_path(tmp).map_err(|e| IngestError::csv(tmp, e))?;
    writer
        .write_record(RULES_HEADER)
        .map_err(|e| IngestError::csv(tmp, e))?;

    let progress = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} rows {msg}")
    {
        progress.set_style(style);
    }

    let mut stats = IngestStats::default();
    let rows = table.rows()?;
    tracing::debug!(columns = ?rows.headers(), "Formulary columns");

    for row in rows {
        let row = row?;
        stats.rows_read += 1;
        progress.inc(1);

        let Some(candidate) = normalize_row(&row) else {
            continue;
        };
        let Some(rxcui) = resolver.resolve(&candidate.ndc) else {
            continue;
        };

        let rule = Rule::new(candidate, rxcui);
        writer
            .write_record(rule.record())
            .map_err(|e| IngestError::csv(tmp, e))?;
        stats.rows_written += 1;
        if stats.rows_written % 1000 == 0 {
            progress.set_message(format!("kept={}", stats.rows_written));
        }
    }

    writer.flush().map_err(|e| IngestError::io(tmp, e))?;
    progress.finish_and_clear();
    Ok(stats)
}
