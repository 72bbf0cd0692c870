//! Patient detail page extraction.

use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use scraper::Html;
use url::Url;

use super::{ExtractionError, absolutize, compile_static_regex, element_text, selector};
use crate::download::filename::file_name_from_url;
use crate::model::{FileRef, FileType, PatientRecord};

static ID_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"ID:\s*(\d+)"));
static AGE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"(\d+)\s*years"));
static REGISTERED_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"Registered at\s*([\d-]+)"));
static MARITAL_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"Marital status:\s*([\w\s]+)"));
static RACE_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"Race:\s*([\w\s]+)"));
static PERSONAL_HISTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)Personal history:\s*([^.]+)"));
static TEMPERATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"Body temperature:\s*([\d.]+)"));

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_matches(|c| c == '.' || c == ' ').to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts a [`PatientRecord`] from a detail page.
///
/// Each field comes from its own pattern; a pattern that does not match
/// leaves the field `None`. The ID falls back to the `id` query parameter of
/// `page_url`. Only `div.imagenspaciente` anchors contribute files.
///
/// # Errors
///
/// [`ExtractionError::MissingContainer`] without `div.descripcion1`;
/// [`ExtractionError::MissingId`] when neither the page nor its URL carry an ID.
pub fn parse_patient_detail(
    html: &str,
    page_url: &str,
    base: &Url,
) -> Result<PatientRecord, ExtractionError> {
    let document = Html::parse_document(html);
    let info_sel = selector("div.descripcion1")?;
    let p_sel = selector("p")?;
    let diagnosis_sel = selector("p.view-diagnostico span")?;
    let history_sel = selector("div.descripcion2")?;
    let protocol_sel = selector("div.descripcion3")?;
    let files_sel = selector("div.imagenspaciente a[href]")?;

    let info = document
        .select(&info_sel)
        .next()
        .ok_or(ExtractionError::MissingContainer {
            what: "div.descripcion1",
        })?;
    let info_text = element_text(info);

    let id = capture(&ID_RE, &info_text)
        .or_else(|| id_from_url(page_url))
        .ok_or_else(|| ExtractionError::MissingId {
            page_url: page_url.to_string(),
        })?;

    let name = info
        .select(&p_sel)
        .nth(1)
        .map(element_text)
        .filter(|s| !s.is_empty());

    let diagnosis = document
        .select(&diagnosis_sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty());

    let medical_history = document
        .select(&history_sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty());
    let personal_history = medical_history
        .as_deref()
        .and_then(|text| capture(&PERSONAL_HISTORY_RE, text));

    let protocol_recommendations = document
        .select(&protocol_sel)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty());
    let temperature = protocol_recommendations
        .as_deref()
        .and_then(|text| capture(&TEMPERATURE_RE, text))
        .and_then(|value| value.parse::<f64>().ok());

    let files = document
        .select(&files_sel)
        .filter_map(|a| {
            let url = absolutize(base, a.value().attr("href")?)?;
            let file_name = file_name_from_url(&url)?;
            Some(FileRef {
                file_type: FileType::classify(&file_name),
                title: a.value().attr("title").unwrap_or_default().to_string(),
                url: url.to_string(),
                file_name,
            })
        })
        .collect();

    Ok(PatientRecord {
        page_url: page_url.to_string(),
        scraped_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        id,
        name,
        age: capture(&AGE_RE, &info_text).and_then(|age| age.parse().ok()),
        register_date: capture(&REGISTERED_RE, &info_text),
        marital_status: capture(&MARITAL_RE, &info_text),
        race: capture(&RACE_RE, &info_text),
        diagnosis,
        personal_history,
        medical_history,
        protocol_recommendations,
        temperature,
        files,
    })
}

fn id_from_url(page_url: &str) -> Option<String> {
    Url::parse(page_url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
