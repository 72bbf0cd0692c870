//! Patient list table extraction.

use scraper::Html;
use url::Url;

use super::{ExtractionError, absolutize, element_text, selector};
use crate::model::PatientRow;

/// Reads every data row of `table#mytable`.
///
/// Cells are keyed by the table's `th` texts in order; cells beyond the
/// header count get positional names. A row's detail link is the first
/// anchor pointing at `details.php?id=`.
///
/// # Errors
///
/// [`ExtractionError::MissingContainer`] when the table is absent.
pub fn parse_patient_table(
    html: &str,
    base: &Url,
    page: u32,
) -> Result<Vec<PatientRow>, ExtractionError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table#mytable")?;
    let th_sel = selector("th")?;
    let tr_sel = selector("tr")?;
    let td_sel = selector("td")?;
    let link_sel = selector(r#"a[href*="details.php?id="]"#)?;

    let table = document
        .select(&table_sel)
        .next()
        .ok_or(ExtractionError::MissingContainer {
            what: "table#mytable",
        })?;

    let headers: Vec<String> = table.select(&th_sel).map(element_text).collect();

    let mut rows = Vec::new();
    for tr in table.select(&tr_sel) {
        let cells: Vec<String> = tr.select(&td_sel).map(element_text).collect();
        if cells.is_empty() {
            continue;
        }
        let columns = cells
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let name = headers
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("column_{}", i + 1));
                (name, value)
            })
            .collect();
        let detail_url = tr
            .select(&link_sel)
            .filter_map(|a| a.value().attr("href"))
            .find_map(|href| absolutize(base, href))
            .map(String::from);
        rows.push(PatientRow {
            columns,
            detail_url,
            page,
        });
    }
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LIST: &str = r#"
        <table id="mytable">
          <tr><th>ID</th><th>Records</th><th>Age</th></tr>
          <tr><td>42</td><td> Ana Silva </td><td>35</td>
              <td><a href="details.php?id=42">View</a></td></tr>
          <tr><td>43</td><td>Bea</td><td>51</td></tr>
          <tr></tr>
        </table>"#;

    fn base() -> Url {
        Url::parse("https://visual.ic.uff.br/dmi/prontuario/").unwrap()
    }

    #[test]
    fn test_parse_patient_table_rows() {
        let rows = parse_patient_table(LIST, &base(), 3).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].id(), Some("42"));
        assert_eq!(rows[0].records(), Some("Ana Silva"));
        assert_eq!(rows[0].column("Age"), Some("35"));
        assert_eq!(rows[0].column("column_4"), Some("View"));
        assert_eq!(
            rows[0].detail_url.as_deref(),
            Some("https://visual.ic.uff.br/dmi/prontuario/details.php?id=42")
        );
        assert_eq!(rows[0].page, 3);

        assert_eq!(rows[1].detail_url, None);
    }

    #[test]
    fn test_missing_table_is_error() {
        let err = parse_patient_table("<table id='other'></table>", &base(), 1).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::MissingContainer { what: "table#mytable" }
        ));
    }
}
