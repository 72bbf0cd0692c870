//! Append-only CSV audit log of download outcomes.
//!
//! Every download job writes exactly one terminal row here. Rows are written
//! whole under a single async lock and flushed immediately, so concurrent
//! workers never interleave partial lines and never block a runtime thread. A failed write is reported with `error!`
//! and otherwise swallowed: the log must never be the reason a job fails.
//!
//! The reader half ([`failed_rows`]) feeds the `--retry-failed` mode.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

use crate::model::TaskType;

/// Column names, in write order.
pub const HEADER: [&str; 9] = [
    "timestamp",
    "task_type",
    "identifier",
    "file_name",
    "status",
    "size_kb",
    "url",
    "elapsed_s",
    "error",
];

/// Timestamp format for the `timestamp` column.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors opening or reading the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The log file could not be created, opened or read.
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        /// Log file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A row in the log could not be interpreted.
    #[error("malformed audit row at {path}:{line}: {reason}")]
    Malformed {
        /// Log file path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },
}

impl AuditError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Terminal outcome of one download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// Destination already present; nothing fetched.
    Exists,
    /// Fetched and written.
    Success,
    /// Fetch or write failed.
    Failed,
}

impl JobStatus {
    /// Returns the lowercase label written to the log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exists => "exists",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses a log label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "exists" => Some(Self::Exists),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: String,
    pub task_type: TaskType,
    pub identifier: String,
    pub file_name: String,
    pub status: JobStatus,
    pub size_kb: f64,
    pub url: String,
    pub elapsed_s: f64,
    pub error: String,
}

impl LogEntry {
    /// Starts an entry stamped with the current local time.
    #[must_use]
    pub fn now(
        task_type: TaskType,
        identifier: impl Into<String>,
        file_name: impl Into<String>,
        url: impl Into<String>,
        status: JobStatus,
    ) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            task_type,
            identifier: identifier.into(),
            file_name: file_name.into(),
            status,
            size_kb: 0.0,
            url: url.into(),
            elapsed_s: 0.0,
            error: String::new(),
        }
    }

    /// Renders the entry as one CSV line, including the trailing newline.
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        let fields = [
            self.timestamp.clone(),
            self.task_type.as_str().to_string(),
            self.identifier.clone(),
            self.file_name.clone(),
            self.status.as_str().to_string(),
            format!("{:.2}", self.size_kb),
            self.url.clone(),
            format!("{:.2}", self.elapsed_s),
            self.error.clone(),
        ];
        join_csv(fields.iter().map(String::as_str))
    }
}

/// Thread-safe append-only sink.
///
/// Share it behind an `Arc`; every writer goes through the same lock.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Opens `path` for appending, creating it with the header row if it does
    /// not exist yet. Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be created or opened.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AuditError::io(path, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AuditError::io(path, e))?;

        let is_empty = file.metadata().map_err(|e| AuditError::io(path, e))?.len() == 0;
        if is_empty {
            debug!("writing audit log header");
            file.write_all(join_csv(HEADER.iter().copied()).as_bytes())
                .and_then(|()| file.flush())
                .map_err(|e| AuditError::io(path, e))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(File::from_std(file)),
        })
    }

    /// A log over a read-only handle: every row write fails.
    #[cfg(test)]
    pub(crate) fn unwritable(path: &Path) -> Self {
        fs::write(path, "").ok();
        let file = fs::File::open(path).unwrap_or_else(|e| panic!("open {}: {e}", path.display()));
        Self {
            path: path.to_path_buf(),
            file: Mutex::new(File::from_std(file)),
        }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row. Never fails; write errors are logged and dropped.
    pub async fn record(&self, entry: &LogEntry) {
        let line = entry.to_csv_line();
        let mut file = self.file.lock().await;
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            error!(
                path = %self.path.display(),
                identifier = %entry.identifier,
                url = %entry.url,
                error = %e,
                "failed to write audit log row"
            );
        }
    }
}

/// A row read back from an existing log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub task_type: TaskType,
    pub identifier: String,
    pub file_name: String,
    pub status: JobStatus,
    pub url: String,
}

/// Reads every row of the log at `path`.
///
/// # Errors
///
/// Returns [`AuditError::Io`] if the file cannot be read and
/// [`AuditError::Malformed`] for a row with the wrong shape or unknown labels.
pub fn read_rows(path: &Path) -> Result<Vec<AuditRow>, AuditError> {
    let text = fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
    let records = split_csv_records(&text);

    let mut rows = Vec::new();
    for (index, (line, fields)) in records.into_iter().enumerate() {
        if index == 0 && fields.first().map(String::as_str) == Some(HEADER[0]) {
            continue;
        }
        let malformed = |reason: String| AuditError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        };
        if fields.len() != HEADER.len() {
            return Err(malformed(format!(
                "expected {} fields, found {}",
                HEADER.len(),
                fields.len()
            )));
        }
        let task_type = TaskType::parse(&fields[1])
            .ok_or_else(|| malformed(format!("unknown task type {:?}", fields[1])))?;
        let status = JobStatus::parse(&fields[4])
            .ok_or_else(|| malformed(format!("unknown status {:?}", fields[4])))?;
        rows.push(AuditRow {
            task_type,
            identifier: fields[2].clone(),
            file_name: fields[3].clone(),
            status,
            url: fields[6].clone(),
        });
    }
    Ok(rows)
}

/// Returns the rows whose URL's most recent outcome is `failed`, in the order
/// the URLs first appeared.
///
/// # Errors
///
/// Same as [`read_rows`].
pub fn failed_rows(path: &Path) -> Result<Vec<AuditRow>, AuditError> {
    let rows = read_rows(path)?;
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, AuditRow> = HashMap::new();
    for row in rows {
        if !latest.contains_key(&row.url) {
            order.push(row.url.clone());
        }
        latest.insert(row.url.clone(), row);
    }
    Ok(order
        .into_iter()
        .filter_map(|url| latest.remove(&url))
        .filter(|row| row.status == JobStatus::Failed)
        .collect())
}

fn join_csv<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(quote_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits CSV text into records, honoring quoted fields that span lines.
/// Each record is paired with the 1-based line it started on.
fn split_csv_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => {
                    if c == '\n' {
                        line += 1;
                    }
                    field.push(c);
                }
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut fields)));
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push((record_line, fields));
    }
    records
}
