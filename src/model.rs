//! Records discovered while crawling the portal.
//!
//! These types flow from the extractors into the job producer and the
//! metadata store. They carry no behavior beyond small accessors and the
//! file-type classification rule.

use serde::Serialize;

/// Which traversal produced a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Image gallery pass.
    Gallery,
    /// Patient directory pass.
    Patient,
}

impl TaskType {
    /// Returns the stable label written to the audit log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gallery => "gallery",
            Self::Patient => "patient",
        }
    }

    /// Parses an audit-log label back into a task type.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "gallery" => Some(Self::Gallery),
            "patient" => Some(Self::Patient),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An image anchor found on a gallery page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImageRef {
    /// Absolute image URL.
    pub url: String,
    /// File name derived from the URL path.
    pub file_name: String,
}

/// One row of the patient list table.
///
/// Columns are kept in table order, keyed by the header text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientRow {
    /// `(header, cell text)` pairs in column order.
    pub columns: Vec<(String, String)>,
    /// Absolute URL of the detail page, when the row links to one.
    pub detail_url: Option<String>,
    /// 1-based list page the row was read from.
    pub page: u32,
}

impl PatientRow {
    /// Returns the cell under `header`, if present.
    #[must_use]
    pub fn column(&self, header: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == header)
            .map(|(_, value)| value.as_str())
    }

    /// The `ID` column.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.column("ID")
    }

    /// The `Records` column.
    #[must_use]
    pub fn records(&self) -> Option<&str> {
        self.column("Records")
    }
}

/// Kind of file referenced from a patient detail page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// `.jpg` / `.png` thermogram.
    Image,
    /// `.txt` temperature matrix.
    ThermalMatrix,
    /// Anything else; never downloaded.
    Other,
}

impl FileType {
    /// Classifies a file name by extension, case-insensitively.
    #[must_use]
    pub fn classify(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".jpg") || lower.ends_with(".png") {
            Self::Image
        } else if lower.ends_with(".txt") {
            Self::ThermalMatrix
        } else {
            Self::Other
        }
    }
}

/// A file linked from a patient detail page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRef {
    pub file_name: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
}

/// Structured fields scraped from a patient detail page.
///
/// Every field except `id` and `files` is independently optional: a pattern
/// that does not match leaves its field `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientRecord {
    pub page_url: String,
    pub scraped_at: String,
    pub id: String,
    pub name: Option<String>,
    pub age: Option<u32>,
    pub register_date: Option<String>,
    pub marital_status: Option<String>,
    pub race: Option<String>,
    pub diagnosis: Option<String>,
    pub personal_history: Option<String>,
    pub medical_history: Option<String>,
    pub protocol_recommendations: Option<String>,
    pub temperature: Option<f64>,
    pub files: Vec<FileRef>,
}
