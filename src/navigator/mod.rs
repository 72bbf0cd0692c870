//! The stateful browsing session the job producer drives.
//!
//! A [`Navigator`] is owned exclusively by the producer: one page is current
//! at a time, and every traversal step goes through `&mut self`. Workers never
//! see it.

mod http;

use async_trait::async_trait;
use scraper::Html;
use thiserror::Error;
use url::Url;

use crate::download::DownloadError;
use crate::extract::{ExtractionError, element_text, selector};

pub use http::{HttpNavigator, LOGIN_SUCCESS_MARKER};

/// Errors raised while moving between pages.
#[derive(Debug, Error)]
pub enum NavigationError {
    /// A page could not be fetched.
    #[error("failed to load {url}: {source}")]
    Load {
        /// Requested URL.
        url: String,
        /// Transport or status failure.
        #[source]
        source: DownloadError,
    },

    /// An element lookup used a selector that does not parse.
    #[error(transparent)]
    Selector(#[from] ExtractionError),
}

/// Errors raised while establishing the authenticated session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No username or password was supplied.
    #[error("missing credentials: pass --username/--password or set PORTAL_USERNAME/PORTAL_PASSWORD")]
    MissingCredentials,

    /// The login page carries no recognizable form.
    #[error("no login form found at {url}")]
    FormNotFound {
        /// Login page URL.
        url: String,
    },

    /// The login page or the form post failed.
    #[error("login request failed: {0}")]
    Request(#[source] NavigationError),

    /// The portal did not land on its home page after the post.
    #[error("login rejected; landed on {url}")]
    Rejected {
        /// Where the session ended up.
        url: String,
    },
}

/// Portal credentials. `Debug` never prints the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Builds credentials from optional parts.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingCredentials`] if either part is absent or empty.
    pub fn new(username: Option<String>, password: Option<String>) -> Result<Self, AuthError> {
        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Self { username, password })
            }
            _ => Err(AuthError::MissingCredentials),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An anchor on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    /// Visible text, whitespace-trimmed.
    pub text: String,
    /// Target, resolved against the current URL when possible.
    pub href: String,
}

/// Sequential page retrieval over one session.
#[async_trait]
pub trait Navigator: Send {
    /// Makes `url` the current page.
    async fn load(&mut self, url: &str) -> Result<(), NavigationError>;

    /// URL of the current page, after redirects.
    fn current_url(&self) -> Option<&str>;

    /// Source of the current page; empty before the first load.
    fn page_source(&self) -> &str;

    /// Anchors with an `href` matching `css` on the current page.
    ///
    /// # Errors
    ///
    /// [`NavigationError::Selector`] when `css` does not parse.
    fn find_links(&self, css: &str) -> Result<Vec<PageLink>, NavigationError> {
        let sel = selector(css)?;
        let base = self.current_url().and_then(|u| Url::parse(u).ok());
        let document = Html::parse_document(self.page_source());
        Ok(document
            .select(&sel)
            .filter_map(|element| {
                let raw = element.value().attr("href")?;
                let href = base
                    .as_ref()
                    .and_then(|b| b.join(raw.trim()).ok())
                    .map_or_else(|| raw.trim().to_string(), String::from);
                Some(PageLink {
                    text: element_text(element),
                    href,
                })
            })
            .collect())
    }

    /// Follows `link`.
    async fn click(&mut self, link: &PageLink) -> Result<(), NavigationError> {
        self.load(&link.href).await
    }
}
