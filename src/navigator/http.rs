//! Navigator backed by the shared HTTP session.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{AuthError, Credentials, NavigationError, Navigator};
use crate::download::{FetchedPage, HttpClient};
use crate::extract::parse_login_form;

/// Substring of the post-login URL that marks a successful login.
pub const LOGIN_SUCCESS_MARKER: &str = "home.php";

/// Login page, relative to the portal base URL.
const LOGIN_PAGE: &str = "index.php";

/// A [`Navigator`] that fetches pages with the run's [`HttpClient`].
///
/// Because it shares the client's cookie jar, logging in here authenticates
/// every download worker too.
#[derive(Debug)]
pub struct HttpNavigator {
    client: HttpClient,
    base_url: Url,
    current_url: Option<String>,
    source: String,
}

impl HttpNavigator {
    /// Creates a navigator with no current page.
    #[must_use]
    pub fn new(client: HttpClient, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            current_url: None,
            source: String::new(),
        }
    }

    /// Signs in through the portal's login form.
    ///
    /// # Errors
    ///
    /// [`AuthError::Request`] if the login page or post fails,
    /// [`AuthError::FormNotFound`] if the page has no login form, and
    /// [`AuthError::Rejected`] if the session does not land on the home page.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), AuthError> {
        let login_url = self
            .base_url
            .join(LOGIN_PAGE)
            .unwrap_or_else(|_| self.base_url.clone());
        info!(url = %login_url, "opening login page");
        self.load(login_url.as_str())
            .await
            .map_err(AuthError::Request)?;

        let page_url = self
            .current_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .unwrap_or(login_url);
        let form = parse_login_form(&self.source, &page_url).ok_or_else(|| {
            AuthError::FormNotFound {
                url: page_url.to_string(),
            }
        })?;
        debug!(action = %form.action, "submitting login form");

        let page = self
            .client
            .post_form(
                form.action.as_str(),
                &form.fields(&credentials.username, &credentials.password),
            )
            .await
            .map_err(|source| {
                AuthError::Request(NavigationError::Load {
                    url: form.action.to_string(),
                    source,
                })
            })?;
        self.set_page(page);

        let landed = self.current_url.clone().unwrap_or_default();
        if landed.contains(LOGIN_SUCCESS_MARKER) {
            info!("login succeeded");
            Ok(())
        } else {
            warn!(url = %landed, "login did not reach the home page");
            Err(AuthError::Rejected { url: landed })
        }
    }

    fn set_page(&mut self, page: FetchedPage) {
        self.current_url = Some(page.url.to_string());
        self.source = page.body;
    }
}

#[async_trait]
impl Navigator for HttpNavigator {
    #[instrument(level = "debug", skip(self))]
    async fn load(&mut self, url: &str) -> Result<(), NavigationError> {
        let page = self
            .client
            .fetch_page(url)
            .await
            .map_err(|source| NavigationError::Load {
                url: url.to_string(),
                source,
            })?;
        self.set_page(page);
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    fn page_source(&self) -> &str {
        &self.source
    }
}
