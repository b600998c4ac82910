//! Record assembly
//!
//! Each matched pair becomes one nested record:
//! `{"timestamp": ..., "source": {..., "env": "efx"}, "target": {..., "env": "ibdl"}}`.
//! Groups are keyed by logical role; the `env` entry names the physical
//! system the fields came from.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::{ReconError, ReconResult};
use crate::matcher::{MatchKind, MatchSet, MatchedPair};
use crate::table::{RowView, Table};

/// Key of the environment discriminator inside each field group
pub const ENV_FIELD: &str = "env";

/// Logical role of a feed in the reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Source => "source",
            Side::Target => "target",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields contributed by one side of a match
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    pub side: Side,
    pub env: String,
    pub fields: Vec<(String, Value)>,
}

impl FieldGroup {
    fn from_row(side: Side, row: &RowView<'_>) -> Self {
        Self {
            side,
            env: row.env().to_string(),
            fields: row
                .fields()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }
}

impl Serialize for FieldGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry(ENV_FIELD, &self.env)?;
        map.end()
    }
}

/// One reconciled source/target pair
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRecord {
    pub timestamp: Value,
    pub groups: Vec<FieldGroup>,
    /// Which key produced the match; not part of the written document
    pub kind: MatchKind,
}

impl MatchedRecord {
    pub fn group(&self, side: Side) -> Option<&FieldGroup> {
        self.groups.iter().find(|g| g.side == side)
    }
}

impl Serialize for MatchedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        for group in &self.groups {
            map.serialize_entry(group.side.as_str(), group)?;
        }
        map.end()
    }
}

/// Builds records for pairs of rows from one source and one target table
#[derive(Debug)]
pub struct RecordAssembler<'a> {
    source: &'a Table,
    target: &'a Table,
    timestamp_column: usize,
}

impl<'a> RecordAssembler<'a> {
    pub fn new(source: &'a Table, target: &'a Table, timestamp_field: &str) -> ReconResult<Self> {
        let timestamp_column = source.require_column(timestamp_field)?;

        for table in [source, target] {
            if table.has_column(ENV_FIELD) {
                return Err(ReconError::ReservedColumn {
                    env: table.env().to_string(),
                    column: ENV_FIELD.to_string(),
                });
            }
        }

        Ok(Self {
            source,
            target,
            timestamp_column,
        })
    }

    pub fn assemble(&self, pair: &MatchedPair) -> MatchedRecord {
        let source_row = self.source.row(pair.source);
        let target_row = self.target.row(pair.target);

        MatchedRecord {
            timestamp: source_row.value_at(self.timestamp_column).clone(),
            groups: vec![
                FieldGroup::from_row(Side::Source, &source_row),
                FieldGroup::from_row(Side::Target, &target_row),
            ],
            kind: pair.kind,
        }
    }

    pub fn assemble_all(&self, matches: &MatchSet) -> Vec<MatchedRecord> {
        matches.pairs.iter().map(|pair| self.assemble(pair)).collect()
    }
}
