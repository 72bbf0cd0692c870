//! File names derived from URLs and record identifiers.

use url::Url;

/// Maximum length, in characters, of a sanitized metadata file name.
const MAX_SANITIZED_LEN: usize = 150;

/// Returns the decoded last path segment of `url`, or `None` when the path
/// ends in a slash or has no segments.
#[must_use]
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| last.to_string());
    let cleaned = sanitize_filename(&decoded);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Replaces characters that are unsafe in file names with `_` and truncates
/// the result to 150 characters.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_SANITIZED_LEN)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url_last_segment() {
        let url = Url::parse("https://example.com/dmi/imgs/T0001.jpg").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("T0001.jpg"));
    }

    #[test]
    fn test_file_name_from_url_decodes_percent_escapes() {
        let url = Url::parse("https://example.com/a/img%2001.png").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("img 01.png"));
    }

    #[test]
    fn test_file_name_from_url_ignores_query() {
        let url = Url::parse("https://example.com/a/m.txt?session=1").unwrap();
        assert_eq!(file_name_from_url(&url).as_deref(), Some("m.txt"));
    }

    #[test]
    fn test_file_name_from_url_trailing_slash_is_none() {
        let url = Url::parse("https://example.com/a/").unwrap();
        assert_eq!(file_name_from_url(&url), None);
    }

    #[test]
    fn test_sanitize_filename_replaces_unsafe_chars() {
        assert_eq!(
            sanitize_filename(r#"Patient_1_A/B:C*D?"E<F>G|H\I.json"#),
            "Patient_1_A_B_C_D__E_F_G_H_I.json"
        );
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_filename(&long).chars().count(), 150);
    }
}
