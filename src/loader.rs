//! CSV loading
//!
//! Every file matching a glob pattern is read and the rows are concatenated
//! into one `Table`. All files must share the first file's header.

use csv::ReaderBuilder;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ReconError, ReconResult};
use crate::table::Table;

/// Type a raw CSV cell: empty → null, then bool, integer, float, string.
/// Surrounding whitespace is dropped for every type.
pub fn coerce_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }

    if trimmed.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }

    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }

    if let Ok(f) = trimmed.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }

    Value::String(trimmed.to_string())
}

/// Paths matching `pattern`, sorted
pub fn matching_paths(pattern: &str) -> ReconResult<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|e| ReconError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(path) => debug!("Skipping non-file match {:?}", path),
            Err(e) => {
                return Err(ReconError::Input {
                    path: e.path().to_path_buf(),
                    source: io::Error::new(e.error().kind(), e.to_string()),
                })
            }
        }
    }
    paths.sort();
    Ok(paths)
}

/// Read one CSV file into a table tagged with `env`
pub fn read_csv(path: &Path, env: &str) -> ReconResult<Table> {
    let csv_error = |source| ReconError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut table = Table::new(env, headers)?;
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        table.push_row(record.iter().map(coerce_cell).collect())?;
    }

    debug!("Read {} rows from {:?}", table.len(), path);
    Ok(table)
}

/// Load and concatenate every CSV file matching `pattern`
pub fn load_table(pattern: &str, env: &str) -> ReconResult<Table> {
    let paths = matching_paths(pattern)?;
    if paths.is_empty() {
        return Err(ReconError::NoInputFiles(pattern.to_string()));
    }

    info!(
        "CSV files loading for {}: {}",
        env,
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut combined: Option<Table> = None;
    for path in &paths {
        let table = read_csv(path, env)?;
        match combined.as_mut() {
            None => combined = Some(table),
            Some(existing) => {
                if existing.columns() != table.columns() {
                    return Err(ReconError::SchemaMismatch {
                        path: path.clone(),
                        expected: existing.columns().to_vec(),
                        found: table.columns().to_vec(),
                    });
                }
                existing.extend(table);
            }
        }
    }

    let table = combined.ok_or_else(|| ReconError::NoInputFiles(pattern.to_string()))?;
    info!("Loaded {} rows for {} from {} files", table.len(), env, paths.len());
    Ok(table)
}
