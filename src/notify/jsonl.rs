//! JSON Lines output, one finding per line.

use crate::notify::FindingSink;
use crate::types::{Finding, HijackError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::error;

pub struct JsonlSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| HijackError::from(e).context(format!("could not open {}", path.display())))?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line(&self, finding: &Finding) -> Result<()> {
        let line = serde_json::to_string(finding)?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl FindingSink for JsonlSink {
    fn emit(&self, finding: &Finding) {
        if let Err(e) = self.write_line(finding) {
            error!(package = %finding.package, "could not write finding: {}", e);
        }
    }
}
