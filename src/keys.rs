//! Composite key generation
//!
//! Both feeds are reduced to one string key per row by joining the
//! identifier values with `--` in configured order. The target side uses raw
//! column values; the source side uses rule-derived values. Target feeds that
//! carry a `quoteId` column also get a block key in which `orderIntId` is
//! replaced by `quoteId`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ReconError, ReconResult};
use crate::rules::RuleSet;
use crate::table::{scalar_to_string, Table};

pub const KEY_SEPARATOR: &str = "--";
pub const ORDER_ID_COLUMN: &str = "orderIntId";
pub const QUOTE_ID_COLUMN: &str = "quoteId";

/// What to do when a rule fails on a source row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleFailurePolicy {
    /// Fail the whole run on the first rule error
    #[default]
    Abort,
    /// Leave the row without a key and keep going
    SkipRow,
}

/// Join identifier values into one key. Any null value means no key.
pub fn composite_key<'a, I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Value>,
{
    let parts = values
        .into_iter()
        .map(scalar_to_string)
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(KEY_SEPARATOR))
}

/// Identifier list with `orderIntId` replaced by `quoteId`.
/// `None` when the list has no `orderIntId` entry.
pub fn block_columns(id_columns: &[String]) -> Option<Vec<String>> {
    let position = id_columns.iter().position(|c| c == ORDER_ID_COLUMN)?;
    let mut columns = id_columns.to_vec();
    columns[position] = QUOTE_ID_COLUMN.to_string();
    Some(columns)
}

/// Keys of every target row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetKeys {
    pub primary: Vec<Option<String>>,
    /// Present only when block matching applies to this target feed
    pub block: Option<Vec<Option<String>>>,
}

/// Keys of every source row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKeys {
    pub primary: Vec<Option<String>>,
    /// Rows left unkeyed because a rule failed under `SkipRow`
    pub skipped_rows: Vec<usize>,
}

fn raw_keys(table: &Table, columns: &[String]) -> ReconResult<Vec<Option<String>>> {
    let positions = columns
        .iter()
        .map(|c| table.require_column(c))
        .collect::<ReconResult<Vec<_>>>()?;

    Ok(table
        .rows()
        .map(|row| composite_key(positions.iter().map(|&p| row.value_at(p))))
        .collect())
}

fn count_unkeyed(keys: &[Option<String>]) -> usize {
    keys.iter().filter(|k| k.is_none()).count()
}

/// Build primary and (where applicable) block keys from raw target columns
pub fn target_keys(table: &Table, id_columns: &[String]) -> ReconResult<TargetKeys> {
    let primary = raw_keys(table, id_columns)?;
    info!(
        "Created ID keys for {} using columns: {}",
        table.env(),
        id_columns.join(", ")
    );

    let block = if table.has_column(QUOTE_ID_COLUMN) {
        match block_columns(id_columns) {
            Some(columns) => {
                info!("{} has a {} column, creating block keys", table.env(), QUOTE_ID_COLUMN);
                Some(raw_keys(table, &columns)?)
            }
            None => {
                warn!(
                    "{} has a {} column but {} is not an identifier column, skipping block keys",
                    table.env(),
                    QUOTE_ID_COLUMN,
                    ORDER_ID_COLUMN
                );
                None
            }
        }
    } else {
        debug!("{} has no {} column, block keys not applicable", table.env(), QUOTE_ID_COLUMN);
        None
    };

    let unkeyed = count_unkeyed(&primary);
    if unkeyed > 0 {
        debug!("{} {} rows have a null identifier and cannot match", unkeyed, table.env());
    }

    Ok(TargetKeys { primary, block })
}

/// Build primary keys from rule-derived source values
pub fn source_keys(
    table: &Table,
    id_columns: &[String],
    rules: &RuleSet,
    policy: RuleFailurePolicy,
) -> ReconResult<SourceKeys> {
    if let Some(column) = id_columns.iter().find(|c| rules.get(c).is_none()) {
        return Err(ReconError::MissingRule(column.clone()));
    }

    let mut primary = Vec::with_capacity(table.len());
    let mut skipped_rows = Vec::new();

    for row in table.rows() {
        let derived = id_columns
            .iter()
            .map(|column| rules.evaluate(column, &row))
            .collect::<ReconResult<Vec<_>>>();

        match derived {
            Ok(values) => primary.push(composite_key(values.iter())),
            Err(err @ ReconError::RuleEvaluation { .. }) if policy == RuleFailurePolicy::SkipRow => {
                warn!("Skipping {} row {}: {}", table.env(), row.index(), err);
                skipped_rows.push(row.index());
                primary.push(None);
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        "Created ID keys for {} from {} rules ({} rows skipped)",
        table.env(),
        id_columns.len(),
        skipped_rows.len()
    );

    Ok(SourceKeys {
        primary,
        skipped_rows,
    })
}
