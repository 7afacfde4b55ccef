//! Per-run log artifact.
//!
//! Every run appends timestamped lines (`2025-01-31T14:02:11 message`) to
//! `run_YYYYMMDD_HHMMSS.log`. Each line is also emitted as a `tracing` event so the
//! console shows the same milestones.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;

use crate::error::{EnrichError, Result};

/// Used when the configured log directory cannot be written.
const FALLBACK_LOG_DIR: &str = "./logs";

/// Append-only sink for run milestones.
pub struct RunLog {
    path: Option<PathBuf>,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl RunLog {
    /// Open a new log file in `dir`, falling back to `./logs` if `dir` is unusable.
    pub fn create_in(dir: &Path) -> Result<Self> {
        let file_name = format!("run_{}.log", Local::now().format("%Y%m%d_%H%M%S"));

        let (path, file) = match open_log_file(dir, &file_name) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "log directory not writable, using {FALLBACK_LOG_DIR}");
                open_log_file(Path::new(FALLBACK_LOG_DIR), &file_name)?
            }
        };

        Ok(Self {
            path: Some(path),
            sink: Mutex::new(Box::new(file)),
        })
    }

    /// Write lines to an arbitrary writer instead of a file.
    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            path: None,
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// A log that only forwards to `tracing`.
    pub fn discard() -> Self {
        Self::to_writer(std::io::sink())
    }

    /// Location of the log file, when backed by one.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::info!("{msg}");
        self.append(msg);
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        tracing::warn!("{msg}");
        self.append(msg);
    }

    fn append(&self, msg: &str) {
        let ts = Local::now().format("%Y-%m-%dT%H:%M:%S");
        let mut sink = self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(sink, "{ts} {msg}").and_then(|_| sink.flush()) {
            tracing::warn!(error = %e, "failed to append to run log");
        }
    }
}

fn open_log_file(dir: &Path, file_name: &str) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir).map_err(|e| EnrichError::io(dir, e))?;
    let path = dir.join(file_name);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| EnrichError::io(&path, e))?;
    Ok((path, file))
}

// ---------------------------------------------------------------------------
// In-memory buffer
// ---------------------------------------------------------------------------

/// Cloneable in-memory writer, handy for inspecting a [`RunLog`] after a run.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(|p| p.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Written lines with the timestamp prefix removed.
    pub fn messages(&self) -> Vec<String> {
        self.contents()
            .lines()
            .map(|line| match line.split_once(' ') {
                Some((_, msg)) => msg.to_string(),
                None => line.to_string(),
            })
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
