//! Append-only JSONL record of every answered question.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{RagError, Result};
use crate::model::{AuditLogEntry, ScoredChunk};
use crate::util::{ensure_parent_directory, now_utc_millis_string};

pub struct AuditLog {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            append_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line. Earlier lines are never read or rewritten.
    pub fn append(&self, question: &str, answer: &str, chunks: &[ScoredChunk]) -> Result<()> {
        let entry = AuditLogEntry {
            timestamp: now_utc_millis_string(),
            question: question.to_string(),
            answer: answer.to_string(),
            contexts: chunks
                .iter()
                .map(|scored| scored.chunk.text.clone())
                .collect(),
        };
        let mut line = serde_json::to_string(&entry)
            .map_err(|err| RagError::LogWrite(format!("failed to serialize entry: {err}")))?;
        line.push('\n');

        let _guard = self
            .append_lock
            .lock()
            .map_err(|_| RagError::LogWrite("audit log lock poisoned".to_string()))?;

        ensure_parent_directory(&self.path).map_err(|err| self.write_error(err))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.write_error(err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| self.write_error(err))
    }

    /// Number of non-empty lines; zero when the log does not exist yet.
    pub fn count_records(&self) -> Result<usize> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut count = 0usize;
        for line in BufReader::new(file).lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    fn write_error(&self, err: std::io::Error) -> RagError {
        RagError::LogWrite(format!("{}: {err}", self.path.display()))
    }
}
