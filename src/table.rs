//! In-memory tabular dataset
//!
//! A `Table` is one loaded feed: an environment tag naming the physical
//! system it came from, an ordered list of unique column names and the rows.

use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ReconError, ReconResult};

/// Ordered rows sharing one column set, tagged with their environment
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    env: String,
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table. Column names must be unique.
    pub fn new(env: impl Into<String>, columns: Vec<String>) -> ReconResult<Self> {
        let env = env.into();
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if positions.insert(column.clone(), idx).is_some() {
                return Err(ReconError::DuplicateColumn {
                    env,
                    column: column.clone(),
                });
            }
        }

        Ok(Self {
            env,
            columns,
            positions,
            rows: Vec::new(),
        })
    }

    /// Build a table from string column names and row values
    pub fn from_rows<S: Into<String>>(
        env: impl Into<String>,
        columns: Vec<S>,
        rows: Vec<Vec<Value>>,
    ) -> ReconResult<Self> {
        let mut table = Self::new(env, columns.into_iter().map(Into::into).collect())?;
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    /// Append a row; its width must match the column count
    pub fn push_row(&mut self, values: Vec<Value>) -> ReconResult<()> {
        if values.len() != self.columns.len() {
            return Err(ReconError::RowWidth {
                env: self.env.clone(),
                row: self.rows.len(),
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.rows.push(values);
        Ok(())
    }

    /// Append all rows of another table with the same column set
    pub fn extend(&mut self, other: Table) {
        debug_assert_eq!(self.columns, other.columns);
        self.rows.extend(other.rows);
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Position of a column, or a `MissingColumn` error naming this table's env
    pub fn require_column(&self, name: &str) -> ReconResult<usize> {
        self.column_index(name).ok_or_else(|| ReconError::MissingColumn {
            env: self.env.clone(),
            column: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow one row. Panics if `index` is out of bounds.
    pub fn row(&self, index: usize) -> RowView<'_> {
        assert!(index < self.rows.len(), "row {} out of bounds", index);
        RowView { table: self, index }
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        (0..self.rows.len()).map(move |index| RowView { table: self, index })
    }
}

/// Read-only view over a single table row
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> RowView<'a> {
    /// Position of this row within its table
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn env(&self) -> &'a str {
        &self.table.env
    }

    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let table = self.table;
        table
            .column_index(column)
            .map(|idx| &table.rows[self.index][idx])
    }

    pub fn value_at(&self, position: usize) -> &'a Value {
        let table = self.table;
        &table.rows[self.index][position]
    }

    /// `(column, value)` pairs in column order
    pub fn fields(&self) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let table = self.table;
        table
            .columns
            .iter()
            .map(String::as_str)
            .zip(table.rows[self.index].iter())
    }
}

/// Text form of a scalar as it appears in composite keys.
/// Null, arrays and objects have no key form.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
