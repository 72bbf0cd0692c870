//! Patient metadata documents.
//!
//! Each patient gets its own pretty-printed JSON document as soon as its
//! detail page is extracted, so a crash loses at most the patient in flight.
//! The whole pass is written once more as an aggregate array at the end.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::filename::sanitize_filename;
use crate::model::{PatientRecord, PatientRow};

/// File name of the aggregate document, in the patient directory root.
pub const AGGREGATE_FILE_NAME: &str = "all_patients_metadata.json";

/// Errors writing metadata documents.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Directory creation or file write failed.
    #[error("I/O error writing metadata {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be serialized.
    #[error("JSON serialization error for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Merges a list row with its detail record into one JSON object.
///
/// Holds the list columns, `detail_url` and `page`, then the detail fields;
/// on a key collision the detail value wins.
#[must_use]
pub fn merge_patient_document(row: &PatientRow, record: &PatientRecord) -> Value {
    let mut doc = Map::new();
    for (name, value) in &row.columns {
        doc.insert(name.clone(), Value::String(value.clone()));
    }
    doc.insert(
        "detail_url".to_string(),
        row.detail_url.clone().map_or(Value::Null, Value::String),
    );
    doc.insert("page".to_string(), Value::from(row.page));
    if let Ok(Value::Object(detail)) = serde_json::to_value(record) {
        doc.extend(detail);
    }
    Value::Object(doc)
}

/// Writes per-patient and aggregate documents under one patient directory.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    metadata_dir: PathBuf,
    aggregate_path: PathBuf,
}

impl MetadataStore {
    /// Per-patient files go to `patient_dir/metadata`, the aggregate to
    /// `patient_dir/all_patients_metadata.json`.
    #[must_use]
    pub fn new(patient_dir: &Path) -> Self {
        Self {
            metadata_dir: patient_dir.join("metadata"),
            aggregate_path: patient_dir.join(AGGREGATE_FILE_NAME),
        }
    }

    /// Path the document for `row`/`record` is written to:
    /// `Patient_{ID}_{Records}.json`, sanitized.
    #[must_use]
    pub fn patient_path(&self, row: &PatientRow, record: &PatientRecord) -> PathBuf {
        let id = row.id().unwrap_or(record.id.as_str());
        let records = row.records().unwrap_or_default();
        self.metadata_dir
            .join(sanitize_filename(&format!("Patient_{id}_{records}.json")))
    }

    /// Writes one patient's merged document and returns its path.
    ///
    /// # Errors
    ///
    /// [`MetadataError`] if the directory or file cannot be written.
    #[instrument(level = "debug", skip_all, fields(id = %record.id))]
    pub fn save_patient(
        &self,
        row: &PatientRow,
        record: &PatientRecord,
    ) -> Result<PathBuf, MetadataError> {
        let path = self.patient_path(row, record);
        write_json(&path, &merge_patient_document(row, record))?;
        debug!(path = %path.display(), "patient metadata saved");
        Ok(path)
    }

    /// Writes the ordered collection of merged documents.
    ///
    /// # Errors
    ///
    /// [`MetadataError`] if the file cannot be written.
    pub fn save_aggregate(&self, documents: &[Value]) -> Result<&Path, MetadataError> {
        write_json(&self.aggregate_path, &documents)?;
        Ok(&self.aggregate_path)
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), MetadataError> {
    let io_err = |source: std::io::Error| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| {
        MetadataError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    writer.flush().map_err(io_err)
}
