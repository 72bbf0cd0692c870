//! Gallery page extraction.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use tracing::debug;
use url::Url;

use super::{ExtractionError, absolutize, compile_static_regex, element_text, selector};
use crate::download::filename::file_name_from_url;
use crate::model::GalleryImageRef;

static IMAGE_HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"(?i)\.(jpg|jpeg|png|bmp|gif|tif|tiff)$"));

static PAGE_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"pagina=(\d+)"));

/// Extracts the first image anchor of every `div.imagem` cell.
///
/// Cells without an image anchor, or whose URL has no file name, are skipped.
///
/// # Errors
///
/// [`ExtractionError::MissingContainer`] when the page has no `div.imagem`.
pub fn parse_gallery_page(html: &str, base: &Url) -> Result<Vec<GalleryImageRef>, ExtractionError> {
    let document = Html::parse_document(html);
    let cell_sel = selector("div.imagem")?;
    let anchor_sel = selector("a[href]")?;

    let mut cells = document.select(&cell_sel).peekable();
    if cells.peek().is_none() {
        return Err(ExtractionError::MissingContainer {
            what: "div.imagem",
        });
    }

    let mut images = Vec::new();
    for cell in cells {
        let href = cell
            .select(&anchor_sel)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| href.trim_matches(|c: char| matches!(c, ' ' | '\'' | '"' | '\n')))
            .find(|href| IMAGE_HREF_RE.is_match(href));
        let Some(href) = href else {
            continue;
        };
        let Some(url) = absolutize(base, href) else {
            continue;
        };
        let Some(file_name) = file_name_from_url(&url) else {
            debug!(url = %url, "image URL has no file name");
            continue;
        };
        images.push(GalleryImageRef {
            url: url.to_string(),
            file_name,
        });
    }
    Ok(images)
}

/// Returns the largest `pagina=N` among the pagination links, ignoring the
/// "Next" control. Defaults to 1.
#[must_use]
pub fn detect_page_count(html: &str) -> u32 {
    let document = Html::parse_document(html);
    let Ok(link_sel) = selector("div.pagination li a") else {
        return 1;
    };

    document
        .select(&link_sel)
        .filter(|a| !element_text(*a).contains("Next"))
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| PAGE_PARAM_RE.captures(href))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(1)
}

/// Rewrites the `pagina=` parameter of `url` to `page`.
#[must_use]
pub fn gallery_page_url(url: &str, page: u32) -> String {
    PAGE_PARAM_RE
        .replace(url, format!("pagina={page}").as_str())
        .into_owned()
}
