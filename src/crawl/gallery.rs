//! Gallery pass: detect the page count, then walk pages 1..=N.

use tracing::{info, instrument, warn};

use super::{JobProducer, JobSink, PassReport, StepOutcome};
use crate::download::DownloadJob;
use crate::extract::{Extractor, gallery_page_url};
use crate::model::TaskType;
use crate::navigator::Navigator;

/// Gallery entry point, relative to the portal base URL.
pub const GALLERY_START_PATH: &str = "images.php?p=1&pos=7&prot=4&race=0&pagina=1";

/// Pages to visit given the detected count and an optional cap.
fn pages_to_visit(detected: u32, cap: Option<u32>) -> u32 {
    let detected = detected.max(1);
    cap.map_or(detected, |cap| detected.min(cap.max(1)))
}

impl<N: Navigator, E: Extractor> JobProducer<N, E> {
    /// Walks the gallery and submits one job per image anchor.
    ///
    /// The first load both detects the page count and serves as page 1. A
    /// first page that fails to load counts as a single-page gallery and is
    /// tried once more in the walk. Any page that fails to load or parse is
    /// skipped.
    #[instrument(skip_all)]
    pub async fn run_gallery_pass<S: JobSink>(&mut self, sink: &mut S) -> PassReport {
        let mut report = PassReport::new(TaskType::Gallery);
        let start_url = self.resolve(GALLERY_START_PATH);

        self.pause().await;
        let first_loaded = match self.navigator.load(&start_url).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, url = %start_url, "first gallery page failed, assuming one page");
                false
            }
        };
        let detected = if first_loaded {
            self.extractor.detect_page_count(self.navigator.page_source())
        } else {
            1
        };
        let pages = pages_to_visit(detected, self.settings.gallery_max_pages);
        info!(
            detected,
            pages,
            cap = ?self.settings.gallery_max_pages,
            "gallery pages to visit"
        );

        for page in 1..=pages {
            let outcome = if page == 1 && first_loaded {
                self.queue_current_page(page, sink)
            } else {
                self.pause().await;
                self.gallery_step(&start_url, page, sink).await
            };
            match &outcome {
                StepOutcome::Submitted(n) => info!(page, jobs = n, "gallery page queued"),
                StepOutcome::Skipped { reason } => info!(page, %reason, "gallery page skipped"),
                StepOutcome::Failed { reason } => warn!(page, %reason, "gallery page failed"),
            }
            report.record(&outcome);
        }

        info!(
            pages = report.steps,
            submitted = report.submitted,
            failed = report.failed,
            "gallery pass finished"
        );
        report
    }

    async fn gallery_step<S: JobSink>(
        &mut self,
        start_url: &str,
        page: u32,
        sink: &mut S,
    ) -> StepOutcome {
        let url = gallery_page_url(start_url, page);
        if let Err(e) = self.navigator.load(&url).await {
            return StepOutcome::Failed {
                reason: e.to_string(),
            };
        }
        self.queue_current_page(page, sink)
    }

    /// Submits the images on the page the navigator is showing.
    fn queue_current_page<S: JobSink>(&self, page: u32, sink: &mut S) -> StepOutcome {
        let images = match self.extractor.parse_gallery_page(self.navigator.page_source()) {
            Ok(images) => images,
            Err(e) => {
                return StepOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        if images.is_empty() {
            return StepOutcome::Skipped {
                reason: "no image links".to_string(),
            };
        }

        let identifier = format!("Page_{page}");
        let count = images.len();
        for image in images {
            let destination = self.settings.gallery_dir.join(&image.file_name);
            sink.submit(DownloadJob::new(
                TaskType::Gallery,
                identifier.clone(),
                image.url,
                destination,
            ));
        }
        StepOutcome::Submitted(count)
    }
}
