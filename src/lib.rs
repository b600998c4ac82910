//! Trade Reconciliation Library
//!
//! This library matches trade records from a source feed (e.g. an execution
//! venue) against a target feed (e.g. a booking system). Each row of both
//! feeds is reduced to a composite key, rows with equal keys are joined, and
//! every match is written as a nested JSON record.
//!
//! Pipeline stages:
//! - Loading: `loader`, `table`
//! - Key derivation: `rules`, `keys`
//! - Matching: `matcher`
//! - Output: `record`, `writer`

pub mod config;
pub mod error;
pub mod table;
pub mod loader;
pub mod rules;
pub mod keys;
pub mod matcher;
pub mod record;
pub mod writer;
pub mod pipeline;

// Re-export commonly used types
pub use config::{Config, FeedConfig, MappingConfig, OutputConfig, DEFAULT_CONFIG_PATH};
pub use error::{ReconError, ReconResult, RuleError};
pub use table::{RowView, Table};
pub use loader::load_table;
pub use rules::{Rule, RuleConfig, RuleSet};
pub use keys::{composite_key, RuleFailurePolicy, SourceKeys, TargetKeys, KEY_SEPARATOR};
pub use matcher::{match_rows, MatchKind, MatchSet, MatchedPair};
pub use record::{FieldGroup, MatchedRecord, RecordAssembler, Side};
pub use writer::{JsonArrayWriter, JsonArrayWriterConfig};
pub use pipeline::{run_mapping, Reconciler, Reconciliation, RunSummary};
