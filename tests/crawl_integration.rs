//! Integration tests for the gallery and patient traversals.
//!
//! A scripted navigator serves fixed HTML, so these run without a network and
//! exercise the real portal extractors.

mod support;

use std::fs;

use harvester_core::crawl::{CrawlError, JobProducer};
use harvester_core::{DownloadJob, PortalExtractor, TaskType};
use serde_json::Value;
use tempfile::TempDir;

use support::{
    BASE, ScriptedNavigator, base_url, detail_html, gallery_html, gallery_url, list_html, settings,
};

fn producer(
    navigator: ScriptedNavigator,
    temp: &TempDir,
    cap: Option<u32>,
) -> JobProducer<ScriptedNavigator, PortalExtractor> {
    JobProducer::new(
        navigator,
        PortalExtractor::new(base_url()),
        settings(temp.path(), cap),
    )
}

fn gallery_site(pages: u32) -> ScriptedNavigator {
    let mut nav = ScriptedNavigator::new();
    for n in 1..=pages {
        let a = format!("imgs/p{n}_a.jpg");
        let b = format!("imgs/p{n}_b.PNG");
        nav = nav.page(&gallery_url(n), gallery_html(pages, &[&a, &b, "docs/readme.pdf"]));
    }
    nav
}

#[tokio::test]
async fn test_gallery_cap_limits_pages_and_jobs() {
    let temp = TempDir::new().expect("temp dir");
    let mut producer = producer(gallery_site(7), &temp, Some(2));
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_gallery_pass(&mut jobs).await;

    assert_eq!(report.steps, 2);
    assert_eq!(report.submitted, 4);
    assert_eq!(jobs.len(), 4);
    assert!(jobs.iter().all(|j| j.task_type == TaskType::Gallery));
    assert_eq!(
        jobs.iter().map(|j| j.identifier.as_str()).collect::<Vec<_>>(),
        vec!["Page_1", "Page_1", "Page_2", "Page_2"]
    );
    assert_eq!(jobs[0].source_url, format!("{BASE}imgs/p1_a.jpg"));
    assert_eq!(jobs[0].destination, temp.path().join("gallery").join("p1_a.jpg"));

    let nav = producer.into_navigator();
    assert_eq!(nav.loads_of("pagina=1"), 1);
    assert_eq!(nav.loads_of("pagina=2"), 1);
    assert_eq!(nav.loads_of("pagina=3"), 0);
}

#[tokio::test]
async fn test_gallery_without_cap_visits_every_detected_page() {
    let temp = TempDir::new().expect("temp dir");
    let mut producer = producer(gallery_site(3), &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_gallery_pass(&mut jobs).await;

    assert_eq!(report.steps, 3);
    assert_eq!(jobs.len(), 6);
    assert_eq!(jobs[5].identifier, "Page_3");
}

#[tokio::test]
async fn test_gallery_bad_page_is_skipped() {
    let temp = TempDir::new().expect("temp dir");
    let nav = ScriptedNavigator::new()
        .page(&gallery_url(1), gallery_html(3, &["imgs/a.jpg"]))
        .page(&gallery_url(2), "<p>no grid here</p>")
        .page(&gallery_url(3), gallery_html(3, &["imgs/c.jpg"]));
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_gallery_pass(&mut jobs).await;

    assert_eq!(report.steps, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(
        jobs.iter().map(|j| j.identifier.as_str()).collect::<Vec<_>>(),
        vec!["Page_1", "Page_3"]
    );
}

#[tokio::test]
async fn test_gallery_unreachable_first_page_assumes_one_page() {
    let temp = TempDir::new().expect("temp dir");
    let mut producer = producer(ScriptedNavigator::new(), &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_gallery_pass(&mut jobs).await;

    assert_eq!(report.steps, 1);
    assert_eq!(report.failed, 1);
    assert!(jobs.is_empty());
}

fn patient_site() -> ScriptedNavigator {
    ScriptedNavigator::new()
        .page(
            "home.php",
            r#"<a href="images.php">Images</a><a href="patients.php">Patient List</a>"#,
        )
        .page(
            "patients.php",
            list_html(
                &[("42", "Ana Silva", true), ("43", "Bea", false)],
                Some("patients.php?page=2"),
            ),
        )
        .page(
            "patients.php?page=2",
            // "Next" on the last page points back at the first one.
            list_html(&[("44", "Carla", true)], Some("patients.php")),
        )
        .page(
            "details.php?id=42",
            detail_html(
                "42",
                "Ana Silva",
                &["imgs/42/T0001.jpg", "imgs/42/matrix01.TXT", "imgs/42/report.pdf"],
            ),
        )
        .page(
            "details.php?id=44",
            detail_html("44", "Carla", &["imgs/44/T0009.png"]),
        )
}

#[tokio::test]
async fn test_patient_pass_follows_list_link_and_pagination() {
    let temp = TempDir::new().expect("temp dir");
    let nav = patient_site().starting_at("home.php");
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_patient_pass(&mut jobs).await.expect("pass runs");

    assert_eq!(report.steps, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.submitted, 3);

    let patients = temp.path().join("patients");
    let destinations: Vec<_> = jobs.iter().map(|j| j.destination.clone()).collect();
    assert_eq!(
        destinations,
        vec![
            patients.join("images").join("T0001.jpg"),
            patients.join("thermal_matrix").join("matrix01.TXT"),
            patients.join("images").join("T0009.png"),
        ]
    );
    assert!(jobs.iter().all(|j| j.task_type == TaskType::Patient));
    assert_eq!(jobs[0].identifier, "Patient_42");
    assert_eq!(jobs[2].identifier, "Patient_44");
    assert!(jobs.iter().all(|j| !j.source_url.ends_with(".pdf")));

    let nav = producer.into_navigator();
    assert_eq!(nav.loads_of("patients.php?page=2"), 1);
    assert_eq!(nav.loads_of("details.php"), 2);
}

#[tokio::test]
async fn test_patient_pass_writes_metadata_documents() {
    let temp = TempDir::new().expect("temp dir");
    let mut producer = producer(patient_site().starting_at("home.php"), &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    producer.run_patient_pass(&mut jobs).await.expect("pass runs");

    let patients = temp.path().join("patients");
    let single = patients.join("metadata").join("Patient_42_Ana Silva.json");
    let doc: Value =
        serde_json::from_str(&fs::read_to_string(&single).expect("patient file")).expect("json");
    assert_eq!(doc["id"], "42");
    assert_eq!(doc["age"], 35);
    assert_eq!(doc["page"], 1);
    assert_eq!(doc["diagnosis"], "Healthy");
    assert_eq!(doc["files"].as_array().map(Vec::len), Some(3));

    let aggregate: Value = serde_json::from_str(
        &fs::read_to_string(patients.join("all_patients_metadata.json")).expect("aggregate"),
    )
    .expect("json");
    let ids: Vec<_> = aggregate
        .as_array()
        .expect("array")
        .iter()
        .map(|d| d["id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, vec!["42", "44"]);
}

#[tokio::test]
async fn test_patient_pass_falls_back_to_direct_list_url() {
    let temp = TempDir::new().expect("temp dir");
    let nav = patient_site()
        .page("start.php", r#"<a href="images.php">Images</a>"#)
        .starting_at("start.php");
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_patient_pass(&mut jobs).await.expect("pass runs");

    assert_eq!(report.submitted, 3);
    assert_eq!(producer.into_navigator().loads_of("images.php"), 0);
}

#[tokio::test]
async fn test_patient_pass_aborts_when_list_unreachable() {
    let temp = TempDir::new().expect("temp dir");
    let nav = ScriptedNavigator::new()
        .page("home.php", "<p>nothing to click</p>")
        .starting_at("home.php");
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let err = producer.run_patient_pass(&mut jobs).await.unwrap_err();

    assert!(matches!(err, CrawlError::ListUnreachable { source: Some(_), .. }));
    assert!(jobs.is_empty());
    assert!(!temp.path().join("patients").exists());
}

#[tokio::test]
async fn test_patient_pass_aborts_when_list_redirects_away() {
    let temp = TempDir::new().expect("temp dir");
    let nav = ScriptedNavigator::new()
        .page("home.php", "<p>nothing to click</p>")
        .page("index.php", "<form></form>")
        .redirect("patients.php", "index.php")
        .starting_at("home.php");
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let err = producer.run_patient_pass(&mut jobs).await.unwrap_err();

    assert!(matches!(err, CrawlError::ListUnreachable { source: None, .. }));
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn test_patient_failures_do_not_stop_the_pass() {
    let temp = TempDir::new().expect("temp dir");
    let nav = ScriptedNavigator::new()
        .page(
            "patients.php",
            list_html(
                &[
                    ("41", "Missing Page", true),
                    ("42", "Ana Silva", true),
                    ("45", "Broken Layout", true),
                    ("44", "Carla", true),
                ],
                None,
            ),
        )
        // details.php?id=41 is never registered, so loading it fails.
        .page(
            "details.php?id=42",
            detail_html("42", "Ana Silva", &["imgs/42/T0001.jpg"]),
        )
        .page(
            "details.php?id=45",
            r#"<div class="imagenspaciente"><a href="imgs/45/T1.jpg">f</a></div>"#,
        )
        .page(
            "details.php?id=44",
            detail_html("44", "Carla", &["imgs/44/T0009.png", "imgs/44/m.txt"]),
        )
        .starting_at("patients.php");
    let mut producer = producer(nav, &temp, None);
    let mut jobs: Vec<DownloadJob> = Vec::new();

    let report = producer.run_patient_pass(&mut jobs).await.expect("pass runs");

    assert_eq!(report.steps, 4);
    assert_eq!(report.failed, 2);
    assert_eq!(report.submitted, 3);
    assert_eq!(
        jobs.iter().map(|j| j.identifier.as_str()).collect::<Vec<_>>(),
        vec!["Patient_42", "Patient_44", "Patient_44"]
    );

    let aggregate: Value = serde_json::from_str(
        &fs::read_to_string(temp.path().join("patients").join("all_patients_metadata.json"))
            .expect("aggregate"),
    )
    .expect("json");
    assert_eq!(aggregate.as_array().map(Vec::len), Some(2));

    let nav = producer.into_navigator();
    assert_eq!(nav.loads_of("details.php?id=44"), 1);
}
