//! Shared fixtures for integration tests: a scripted in-memory navigator and
//! HTML builders for the portal's page types.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::crawl::CrawlSettings;
use harvester_core::download::DownloadError;
use harvester_core::{DelayRange, NavigationError, Navigator};
use url::Url;

pub const BASE: &str = "https://portal.test/dmi/";

/// Serves fixed pages by URL and records every load.
#[derive(Debug, Default)]
pub struct ScriptedNavigator {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    current_url: Option<String>,
    source: String,
    pub loads: Vec<String>,
}

impl ScriptedNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `html` at `url` (relative to [`BASE`] unless absolute).
    pub fn page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(absolute(url), html.into());
        self
    }

    /// Loading `from` lands on `to`.
    pub fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(absolute(from), absolute(to));
        self
    }

    /// Makes a registered page current without recording a load.
    pub fn starting_at(mut self, url: &str) -> Self {
        let url = absolute(url);
        self.source = self.pages.get(&url).cloned().unwrap_or_default();
        self.current_url = Some(url);
        self
    }

    /// Number of loads whose URL contains `needle`.
    pub fn loads_of(&self, needle: &str) -> usize {
        self.loads.iter().filter(|url| url.contains(needle)).count()
    }
}

#[async_trait]
impl Navigator for ScriptedNavigator {
    async fn load(&mut self, url: &str) -> Result<(), NavigationError> {
        self.loads.push(url.to_string());
        let landed = self.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        match self.pages.get(&landed) {
            Some(html) => {
                self.source = html.clone();
                self.current_url = Some(landed);
                Ok(())
            }
            None => Err(NavigationError::Load {
                url: url.to_string(),
                source: DownloadError::http_status(url, 404),
            }),
        }
    }

    fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    fn page_source(&self) -> &str {
        &self.source
    }
}

pub fn absolute(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("{BASE}{url}")
    }
}

pub fn base_url() -> Url {
    Url::parse(BASE).expect("valid base URL")
}

/// Crawl settings rooted in `root` with a 1 ms page delay.
pub fn settings(root: &Path, gallery_max_pages: Option<u32>) -> CrawlSettings {
    let patient_dir = root.join("patients");
    CrawlSettings {
        base_url: base_url(),
        gallery_dir: root.join("gallery"),
        patient_images_dir: patient_dir.join("images"),
        patient_matrix_dir: patient_dir.join("thermal_matrix"),
        patient_dir,
        gallery_max_pages,
        page_delay: DelayRange::new(Duration::from_millis(1), Duration::from_millis(1))
            .expect("valid delay"),
    }
}

/// URL of gallery page `n`.
pub fn gallery_url(n: u32) -> String {
    format!("{BASE}images.php?p=1&pos=7&prot=4&race=0&pagina={n}")
}

/// A gallery page with pagination links up to `page_count` (plus "Next")
/// and one `div.imagem` cell per image path.
pub fn gallery_html(page_count: u32, images: &[&str]) -> String {
    let mut html = String::from("<div class=\"pagination\"><ul>");
    for n in 1..=page_count {
        html.push_str(&format!(
            "<li><a href=\"images.php?p=1&pos=7&prot=4&race=0&pagina={n}\">{n}</a></li>"
        ));
    }
    html.push_str(
        "<li><a href=\"images.php?p=1&pos=7&prot=4&race=0&pagina=2\">Next</a></li></ul></div>",
    );
    for image in images {
        html.push_str(&format!(
            "<div class=\"imagem\"><a href=\"{image}\"><img src=\"thumb.png\"></a></div>"
        ));
    }
    html
}

/// A patient list page. Each row is `(id, name, linked)`.
pub fn list_html(rows: &[(&str, &str, bool)], next: Option<&str>) -> String {
    let mut html = String::from(
        "<table id=\"mytable\"><tr><th>ID</th><th>Records</th><th>Action</th></tr>",
    );
    for (id, name, linked) in rows {
        let link = if *linked {
            format!("<a href=\"details.php?id={id}\">View</a>")
        } else {
            String::new()
        };
        html.push_str(&format!("<tr><td>{id}</td><td>{name}</td><td>{link}</td></tr>"));
    }
    html.push_str("</table>");
    if let Some(next) = next {
        html.push_str(&format!("<ul><li><a href=\"{next}\">Next</a></li></ul>"));
    }
    html
}

/// A patient detail page linking `files` (paths relative to the base URL).
pub fn detail_html(id: &str, name: &str, files: &[&str]) -> String {
    let mut html = format!(
        "<div class=\"descripcion1\"><p>ID: {id}</p><p>{name}</p>\
         <p>35 years, Registered at 2004-05-11. Marital status: Married. Race: White.</p></div>\
         <p class=\"view-diagnostico\">Diagnosis: <span>Healthy</span></p>\
         <div class=\"descripcion3\">Body temperature: 36.5 C.</div>\
         <div class=\"imagenspaciente\">"
    );
    for file in files {
        html.push_str(&format!("<a href=\"{file}\" title=\"{file}\">f</a>"));
    }
    html.push_str("</div>");
    html
}
