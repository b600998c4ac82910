//! One reconciliation run
//!
//! load → target keys → source keys → match → assemble → write.
//! Everything is held in memory; the first unrecovered error ends the run.

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::config::MappingConfig;
use crate::error::ReconResult;
use crate::keys::{self, RuleFailurePolicy};
use crate::loader;
use crate::matcher;
use crate::record::{MatchedRecord, RecordAssembler};
use crate::rules::RuleSet;
use crate::table::Table;
use crate::writer::{JsonArrayWriter, JsonArrayWriterConfig};

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source_rows: usize,
    pub target_rows: usize,
    /// Source rows without a key (null fragment or skipped rule failure)
    pub unkeyed_source_rows: usize,
    pub unkeyed_target_rows: usize,
    pub skipped_source_rows: usize,
    pub block_join: bool,
    pub primary_matches: usize,
    pub block_matches: usize,
    /// Pairs found by both joins, present twice in the output
    pub overlapping_matches: usize,
    pub records_written: usize,
}

/// Matched records plus the counts that produced them
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub records: Vec<MatchedRecord>,
    pub summary: RunSummary,
}

/// Key construction, matching and assembly for one source/target pairing
#[derive(Debug)]
pub struct Reconciler {
    id_columns: Vec<String>,
    rules: RuleSet,
    timestamp_field: String,
    rule_failure: RuleFailurePolicy,
}

impl Reconciler {
    pub fn new(
        id_columns: Vec<String>,
        rules: RuleSet,
        timestamp_field: impl Into<String>,
        rule_failure: RuleFailurePolicy,
    ) -> Self {
        Self {
            id_columns,
            rules,
            timestamp_field: timestamp_field.into(),
            rule_failure,
        }
    }

    pub fn from_config(mapping: &MappingConfig) -> Self {
        Self::new(
            mapping.id_columns.clone(),
            RuleSet::from_config(&mapping.rules),
            mapping.timestamp_field.clone(),
            mapping.rule_failure,
        )
    }

    /// Mutable access for registering custom rules
    pub fn rules_mut(&mut self) -> &mut RuleSet {
        &mut self.rules
    }

    /// Match `source` against `target` and build the output records
    pub fn reconcile(&self, source: &Table, target: &Table) -> ReconResult<Reconciliation> {
        let assembler = RecordAssembler::new(source, target, &self.timestamp_field)?;

        let target_keys = keys::target_keys(target, &self.id_columns)?;
        let source_keys = keys::source_keys(source, &self.id_columns, &self.rules, self.rule_failure)?;

        let matches = matcher::match_rows(&source_keys, &target_keys);
        let records = assembler.assemble_all(&matches);
        info!("Number of matches between {} and {}: {}", source.env(), target.env(), records.len());

        let summary = RunSummary {
            source_rows: source.len(),
            target_rows: target.len(),
            unkeyed_source_rows: source_keys.primary.iter().filter(|k| k.is_none()).count(),
            unkeyed_target_rows: target_keys.primary.iter().filter(|k| k.is_none()).count(),
            skipped_source_rows: source_keys.skipped_rows.len(),
            block_join: matches.block_join,
            primary_matches: matches.primary_matches,
            block_matches: matches.block_matches,
            overlapping_matches: matches.overlap(),
            records_written: 0,
        };

        Ok(Reconciliation { records, summary })
    }
}

/// Run one configured mapping end to end and write its output document
pub fn run_mapping(name: &str, mapping: &MappingConfig) -> ReconResult<RunSummary> {
    let span = info_span!("mapping", name = %name);
    let _guard = span.enter();

    info!("Applying mapping {} ({} -> {})", name, mapping.source.env, mapping.target.env);

    let source = loader::load_table(&mapping.source.path, &mapping.source.env)?;
    let target = loader::load_table(&mapping.target.path, &mapping.target.env)?;
    info!("Loaded CSV files into tables");
    debug!("{} columns: {:?}", source.env(), source.columns());
    debug!("{} columns: {:?}", target.env(), target.columns());

    let reconciler = Reconciler::from_config(mapping);
    let Reconciliation { records, mut summary } = reconciler.reconcile(&source, &target)?;

    let writer = JsonArrayWriter::new(JsonArrayWriterConfig {
        path: mapping.output.path.clone(),
        use_temp_file: mapping.output.use_temp_file,
    });
    summary.records_written = writer.write_records(&records)?;

    info!(
        "Mapping {} complete: {} records written to {:?}",
        name,
        summary.records_written,
        writer.path()
    );
    debug!("Summary: {:?}", summary);

    Ok(summary)
}
