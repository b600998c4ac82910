//! JSON document writer
//!
//! Writes the matched records as one JSON array, one record per line:
//!
//! ```text
//! [
//! {"timestamp": ...},
//! {"timestamp": ...}
//! ]
//! ```
//!
//! An empty record list still produces a valid array (`[\n\n]\n`).

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};

use crate::error::{ReconError, ReconResult};

/// Configuration for JsonArrayWriter
#[derive(Debug, Clone)]
pub struct JsonArrayWriterConfig {
    /// Final output file
    pub path: PathBuf,
    /// Write to a temporary file next to `path` and rename it into place
    pub use_temp_file: bool,
}

/// Writes a full record set as a JSON array document
pub struct JsonArrayWriter {
    config: JsonArrayWriterConfig,
}

impl JsonArrayWriter {
    pub fn new(config: JsonArrayWriterConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn io_error(&self, source: std::io::Error) -> ReconError {
        ReconError::Output {
            path: self.config.path.clone(),
            source,
        }
    }

    /// Hidden sibling of the output file, unique per process and instant
    fn temp_path(&self) -> PathBuf {
        let filename = self
            .config
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let pid = std::process::id();

        self.config
            .path
            .with_file_name(format!(".{}.{}.{}.tmp", filename, pid, nanos))
    }

    fn ensure_parent_dir(&self) -> ReconResult<()> {
        let Some(parent) = self.config.path.parent() else {
            return Ok(());
        };
        if parent.as_os_str().is_empty() || parent.exists() {
            return Ok(());
        }

        // 0775 - rwxrwxr-x
        #[cfg(unix)]
        {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true).mode(0o775);
            builder.create(parent).map_err(|e| self.io_error(e))?;
        }

        #[cfg(not(unix))]
        fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;

        Ok(())
    }

    fn open(&self, path: &Path) -> ReconResult<File> {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        // 0664 - rw-rw-r--
        #[cfg(unix)]
        options.mode(0o664);
        options.open(path).map_err(|e| self.io_error(e))
    }

    fn write_document<T: Serialize>(&self, path: &Path, records: &[T]) -> ReconResult<()> {
        let file = self.open(path)?;
        let mut out = BufWriter::new(file);

        out.write_all(b"[\n").map_err(|e| self.io_error(e))?;
        for (idx, record) in records.iter().enumerate() {
            if idx > 0 {
                out.write_all(b",\n").map_err(|e| self.io_error(e))?;
            }
            serde_json::to_writer(&mut out, record)?;
        }
        out.write_all(b"\n]\n").map_err(|e| self.io_error(e))?;

        let file = out.into_inner().map_err(|e| self.io_error(e.into_error()))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Write all records, replacing any existing document at the output path
    pub fn write_records<T: Serialize>(&self, records: &[T]) -> ReconResult<usize> {
        self.ensure_parent_dir()?;
        info!("Writing {} records to file: {:?}", records.len(), self.config.path);

        if !self.config.use_temp_file {
            self.write_document(&self.config.path, records)?;
            info!("Finished writing records");
            return Ok(records.len());
        }

        let temp_path = self.temp_path();
        debug!("Writing through temporary file {:?}", temp_path);

        let written = self
            .write_document(&temp_path, records)
            .and_then(|_| fs::rename(&temp_path, &self.config.path).map_err(|e| self.io_error(e)));

        if let Err(err) = written {
            if let Err(e) = fs::remove_file(&temp_path) {
                warn!("Failed to remove temporary file {:?}: {}", temp_path, e);
            }
            return Err(err);
        }

        info!("Finished writing records (via temp file {:?})", temp_path);
        Ok(records.len())
    }
}
