//! Page extractors: pure functions from portal HTML to records.
//!
//! Everything here is synchronous. A parsed [`scraper::Html`] never outlives
//! the function that built it, so extractors can be called from async code
//! without holding a non-`Send` document across an await point.
//!
//! Extraction tolerates missing or malformed individual fields; it only fails
//! when the container a page type is defined by is absent.

mod detail;
mod gallery;
pub mod login;
mod patients;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use thiserror::Error;
use url::Url;

use crate::model::{GalleryImageRef, PatientRecord, PatientRow};

pub use detail::parse_patient_detail;
pub use gallery::{detect_page_count, gallery_page_url, parse_gallery_page};
pub use login::{LoginForm, parse_login_form};
pub use patients::parse_patient_table;

/// Errors raised by extractors.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The element that defines this page type is not on the page.
    #[error("page has no {what}")]
    MissingContainer {
        /// CSS description of the missing element.
        what: &'static str,
    },

    /// A detail page yielded no patient identifier.
    #[error("no patient ID found on {page_url}")]
    MissingId {
        /// Detail page URL.
        page_url: String,
    },

    /// A CSS selector failed to parse.
    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector {
        /// The selector text.
        selector: String,
        /// Parser message.
        reason: String,
    },
}

/// Page-type extractors used by the job producer.
///
/// One implementation per site layout; the producer only depends on this
/// contract.
pub trait Extractor: Send + Sync {
    /// Image anchors on one gallery page, resolved to absolute URLs.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::MissingContainer`] when the page has no image grid.
    fn parse_gallery_page(&self, html: &str) -> Result<Vec<GalleryImageRef>, ExtractionError>;

    /// Highest page number in the gallery pagination control; 1 if none.
    fn detect_page_count(&self, html: &str) -> u32;

    /// Rows of one patient list page.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::MissingContainer`] when the list table is absent.
    fn parse_patient_table(&self, html: &str, page: u32) -> Result<Vec<PatientRow>, ExtractionError>;

    /// Structured fields of one patient detail page.
    ///
    /// # Errors
    ///
    /// [`ExtractionError::MissingContainer`] without an info block,
    /// [`ExtractionError::MissingId`] when no identifier can be found.
    fn parse_patient_detail(
        &self,
        html: &str,
        page_url: &str,
    ) -> Result<PatientRecord, ExtractionError>;
}

/// Extractors for the DMI portal layout.
#[derive(Debug, Clone)]
pub struct PortalExtractor {
    base_url: Url,
}

impl PortalExtractor {
    /// Creates an extractor resolving relative links against `base_url`.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }
}

impl Extractor for PortalExtractor {
    fn parse_gallery_page(&self, html: &str) -> Result<Vec<GalleryImageRef>, ExtractionError> {
        parse_gallery_page(html, &self.base_url)
    }

    fn detect_page_count(&self, html: &str) -> u32 {
        detect_page_count(html)
    }

    fn parse_patient_table(&self, html: &str, page: u32) -> Result<Vec<PatientRow>, ExtractionError> {
        parse_patient_table(html, &self.base_url, page)
    }

    fn parse_patient_detail(
        &self,
        html: &str,
        page_url: &str,
    ) -> Result<PatientRecord, ExtractionError> {
        parse_patient_detail(html, page_url, &self.base_url)
    }
}

/// Compiles a regex literal; panics on an invalid pattern.
pub(crate) fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::InvalidSelector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Text of an element with each text node trimmed, joined by single spaces.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves `href` against `base`, trimming stray quotes and whitespace.
pub(crate) fn absolutize(base: &Url, href: &str) -> Option<Url> {
    let cleaned = href.trim_matches(|c: char| matches!(c, ' ' | '\'' | '"' | '\n' | '\r' | '\t'));
    if cleaned.is_empty() {
        return None;
    }
    base.join(cleaned).ok()
}

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// Collapses runs of whitespace to one space and trims.
pub(crate) fn squash_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_element_text_joins_trimmed_nodes() {
        let html = Html::parse_fragment("<div> <p> ID: 42 </p>\n<p>Ana  Silva</p> </div>");
        let div = html.select(&selector("div").unwrap()).next().unwrap();
        assert_eq!(element_text(div), "ID: 42 Ana  Silva");
    }

    #[test]
    fn test_absolutize_strips_quotes() {
        let base = Url::parse("https://visual.ic.uff.br/dmi/prontuario/").unwrap();
        assert_eq!(
            absolutize(&base, " 'imgs/a.jpg'\n").unwrap().as_str(),
            "https://visual.ic.uff.br/dmi/prontuario/imgs/a.jpg"
        );
        assert!(absolutize(&base, "  ").is_none());
    }

    #[test]
    fn test_invalid_selector_reported() {
        let err = selector("div[").unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidSelector { .. }));
    }

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  Ana \n  Silva "), "Ana Silva");
    }
}
