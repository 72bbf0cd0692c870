//! Patient pass: reach the list, collect rows across its pages, then visit
//! each detail page.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::{CrawlError, JobProducer, JobSink, PassReport, StepOutcome};
use crate::download::DownloadJob;
use crate::extract::Extractor;
use crate::metadata::{MetadataStore, merge_patient_document};
use crate::model::{FileType, PatientRow, TaskType};
use crate::navigator::{Navigator, PageLink};

/// Direct patient list URL, relative to the portal base URL.
pub const PATIENT_LIST_PATH: &str = "patients.php";

fn is_list_link(link: &PageLink) -> bool {
    let text = link.text.to_lowercase();
    text.contains("patient") || text.contains("list")
}

fn is_next_link(link: &PageLink) -> bool {
    link.text.contains("Next") || link.text.contains('»')
}

impl<N: Navigator, E: Extractor> JobProducer<N, E> {
    /// Walks the patient directory: list pages first, then one detail page
    /// per row. Writes a metadata document per patient and the aggregate at
    /// the end, and submits one job per image or thermal matrix.
    ///
    /// # Errors
    ///
    /// [`CrawlError::ListUnreachable`] when neither the list link nor the
    /// direct URL reaches the list; nothing is submitted in that case.
    #[instrument(skip_all)]
    pub async fn run_patient_pass<S: JobSink>(
        &mut self,
        sink: &mut S,
    ) -> Result<PassReport, CrawlError> {
        let mut report = PassReport::new(TaskType::Patient);
        self.open_patient_list().await?;

        let rows = self.collect_patient_rows().await;
        if rows.is_empty() {
            warn!("patient list has no rows");
            return Ok(report);
        }
        info!(rows = rows.len(), "patient rows collected");

        let store = MetadataStore::new(&self.settings.patient_dir);
        let mut documents = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let outcome = self.patient_step(row, &store, &mut documents, sink).await;
            let position = index + 1;
            match &outcome {
                StepOutcome::Submitted(n) => {
                    debug!(position, total = rows.len(), jobs = n, "patient queued");
                }
                StepOutcome::Skipped { reason } => warn!(position, %reason, "patient skipped"),
                StepOutcome::Failed { reason } => warn!(position, %reason, "patient failed"),
            }
            report.record(&outcome);
        }

        match store.save_aggregate(&documents) {
            Ok(path) => info!(path = %path.display(), patients = documents.len(), "aggregate metadata saved"),
            Err(e) => error!(error = %e, "could not write aggregate metadata"),
        }
        info!(
            patients = report.steps,
            submitted = report.submitted,
            skipped = report.skipped,
            failed = report.failed,
            "patient pass finished"
        );
        Ok(report)
    }

    /// Follows a list link from the current page, falling back to the direct
    /// list URL.
    async fn open_patient_list(&mut self) -> Result<(), CrawlError> {
        let link = match self.navigator.find_links("a[href]") {
            Ok(links) => links.into_iter().find(is_list_link),
            Err(e) => {
                warn!(error = %e, "could not scan for patient list link");
                None
            }
        };
        if let Some(link) = link {
            debug!(text = %link.text, href = %link.href, "following patient list link");
            match self.navigator.click(&link).await {
                Ok(()) => {
                    self.pause().await;
                    return Ok(());
                }
                Err(e) => warn!(error = %e, "patient list link failed, trying direct URL"),
            }
        } else {
            debug!("no patient list link, trying direct URL");
        }

        let url = self.resolve(PATIENT_LIST_PATH);
        if let Err(e) = self.navigator.load(&url).await {
            return Err(CrawlError::ListUnreachable {
                url,
                source: Some(e),
            });
        }
        self.pause().await;
        let reached = self
            .navigator
            .current_url()
            .is_some_and(|current| current.contains(PATIENT_LIST_PATH));
        if reached {
            Ok(())
        } else {
            Err(CrawlError::ListUnreachable { url, source: None })
        }
    }

    /// Parses list pages, following the "next" control until it disappears,
    /// fails, or points back at a page already visited.
    async fn collect_patient_rows(&mut self) -> Vec<PatientRow> {
        let mut rows = Vec::new();
        let mut visited: HashSet<String> = self
            .navigator
            .current_url()
            .map(String::from)
            .into_iter()
            .collect();
        let mut page: u32 = 1;

        loop {
            match self
                .extractor
                .parse_patient_table(self.navigator.page_source(), page)
            {
                Ok(page_rows) => {
                    info!(page, rows = page_rows.len(), "patient list page parsed");
                    rows.extend(page_rows);
                }
                Err(e) => {
                    warn!(page, error = %e, "patient list page unreadable");
                    break;
                }
            }

            let next = match self.navigator.find_links("a[href]") {
                Ok(links) => links.into_iter().find(is_next_link),
                Err(e) => {
                    warn!(error = %e, "could not scan for next page link");
                    None
                }
            };
            let Some(next) = next else {
                debug!(page, "no next page link");
                break;
            };
            if !visited.insert(next.href.clone()) {
                warn!(href = %next.href, "next page link already visited, stopping");
                break;
            }
            if let Err(e) = self.navigator.click(&next).await {
                warn!(error = %e, "next page failed to load");
                break;
            }
            self.pause().await;
            page += 1;
        }
        rows
    }

    async fn patient_step<S: JobSink>(
        &mut self,
        row: &PatientRow,
        store: &MetadataStore,
        documents: &mut Vec<Value>,
        sink: &mut S,
    ) -> StepOutcome {
        let Some(detail_url) = row.detail_url.as_deref() else {
            return StepOutcome::Skipped {
                reason: format!("no detail link for row {}", row.id().unwrap_or("?")),
            };
        };
        if let Err(e) = self.navigator.load(detail_url).await {
            return StepOutcome::Failed {
                reason: e.to_string(),
            };
        }
        self.pause().await;

        let page_url = self.navigator.current_url().unwrap_or(detail_url).to_string();
        let record = match self
            .extractor
            .parse_patient_detail(self.navigator.page_source(), &page_url)
        {
            Ok(record) => record,
            Err(e) => {
                return StepOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        documents.push(merge_patient_document(row, &record));
        if let Err(e) = store.save_patient(row, &record) {
            error!(id = %record.id, error = %e, "could not write patient metadata");
        }

        let identifier = format!("Patient_{}", record.id);
        let mut submitted = 0;
        for file in record.files {
            let dir = match file.file_type {
                FileType::Image => &self.settings.patient_images_dir,
                FileType::ThermalMatrix => &self.settings.patient_matrix_dir,
                FileType::Other => {
                    debug!(file = %file.file_name, "not a download type, skipping");
                    continue;
                }
            };
            sink.submit(DownloadJob::new(
                TaskType::Patient,
                identifier.clone(),
                file.url,
                dir.join(&file.file_name),
            ));
            submitted += 1;
        }
        StepOutcome::Submitted(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(text: &str) -> PageLink {
        PageLink {
            text: text.to_string(),
            href: "https://x/p".to_string(),
        }
    }

    #[test]
    fn test_list_link_matching_is_case_insensitive() {
        assert!(is_list_link(&link("Patient List")));
        assert!(is_list_link(&link("LIST")));
        assert!(is_list_link(&link("patients")));
        assert!(!is_list_link(&link("Images")));
    }

    #[test]
    fn test_next_link_matching() {
        assert!(is_next_link(&link("Next")));
        assert!(is_next_link(&link("»")));
        assert!(!is_next_link(&link("next")));
        assert!(!is_next_link(&link("Previous")));
    }
}
