//! Login form discovery.

use scraper::{ElementRef, Html};
use url::Url;

use super::selector;

/// The fields needed to submit the portal's login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginForm {
    /// Absolute URL the form posts to.
    pub action: Url,
    /// Name of the text input that takes the username.
    pub username_field: String,
    /// Name of the password input.
    pub password_field: String,
    /// Hidden inputs and the submit control, sent as-is.
    pub extra_fields: Vec<(String, String)>,
}

impl LoginForm {
    /// Builds the urlencoded field list for `username`/`password`.
    #[must_use]
    pub fn fields(&self, username: &str, password: &str) -> Vec<(String, String)> {
        let mut fields = self.extra_fields.clone();
        fields.push((self.username_field.clone(), username.to_string()));
        fields.push((self.password_field.clone(), password.to_string()));
        fields
    }
}

/// Finds the form holding a password input on a login page.
///
/// Returns `None` when the page has no named password input or no named text
/// input next to it.
#[must_use]
pub fn parse_login_form(html: &str, page_url: &Url) -> Option<LoginForm> {
    let document = Html::parse_document(html);
    let form_sel = selector("form").ok()?;
    let password_sel = selector(r#"input[type="password"]"#).ok()?;

    let form = document
        .select(&form_sel)
        .find(|form| form.select(&password_sel).next().is_some());

    match form {
        Some(form) => {
            let action = form
                .value()
                .attr("action")
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .and_then(|a| page_url.join(a).ok())
                .unwrap_or_else(|| page_url.clone());
            fields_within(form, action)
        }
        None => fields_within(document.root_element(), page_url.clone()),
    }
}

fn fields_within(scope: ElementRef<'_>, action: Url) -> Option<LoginForm> {
    let password_sel = selector(r#"input[type="password"]"#).ok()?;
    let text_sel = selector(r#"input[type="text"], input[type="email"]"#).ok()?;
    let hidden_sel = selector(r#"input[type="hidden"]"#).ok()?;
    let submit_sel = selector(r#"input[type="submit"], button[type="submit"]"#).ok()?;

    let password_field = scope
        .select(&password_sel)
        .find_map(|input| input.value().attr("name"))?
        .to_string();
    let username_field = scope
        .select(&text_sel)
        .find_map(|input| input.value().attr("name"))?
        .to_string();

    let mut extra_fields: Vec<(String, String)> = scope
        .select(&hidden_sel)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    if let Some(submit) = scope.select(&submit_sel).next()
        && let Some(name) = submit.value().attr("name")
    {
        let value = submit.value().attr("value").unwrap_or_default();
        extra_fields.push((name.to_string(), value.to_string()));
    }

    Some(LoginForm {
        action,
        username_field,
        password_field,
        extra_fields,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page() -> Url {
        Url::parse("https://visual.ic.uff.br/dmi/prontuario/index.php").unwrap()
    }

    #[test]
    fn test_parse_login_form() {
        let html = r#"
            <form action="search.php"><input type="text" name="q"></form>
            <form method="post" action="login.php">
              <input type="hidden" name="token" value="abc">
              <input type="text" name="usuario">
              <input type="password" name="senha">
              <input type="submit" name="entrar" value="Login">
            </form>"#;
        let form = parse_login_form(html, &page()).unwrap();
        assert_eq!(
            form.action.as_str(),
            "https://visual.ic.uff.br/dmi/prontuario/login.php"
        );
        assert_eq!(form.username_field, "usuario");
        assert_eq!(form.password_field, "senha");
        assert_eq!(
            form.fields("ana", "pw"),
            vec![
                ("token".to_string(), "abc".to_string()),
                ("entrar".to_string(), "Login".to_string()),
                ("usuario".to_string(), "ana".to_string()),
                ("senha".to_string(), "pw".to_string()),
            ]
        );
    }

    #[test]
    fn test_form_without_action_posts_to_page() {
        let html = r#"<form><input type="text" name="u"><input type="password" name="p"></form>"#;
        let form = parse_login_form(html, &page()).unwrap();
        assert_eq!(form.action, page());
        assert!(form.extra_fields.is_empty());
    }

    #[test]
    fn test_page_without_password_input() {
        assert!(parse_login_form("<form><input type='text' name='u'></form>", &page()).is_none());
    }
}
