//! Integration tests for the ledger
//!
//! These tests run the diff engine against an on-disk SQLite ledger and
//! walk a page through first, repeated and changed visits.

use chrono::{Duration, Utc};
use image_ledger::config::IdentityConfig;
use image_ledger::hash::digest;
use image_ledger::ledger::{DiffEngine, ImageSnapshot, LedgerStore, PageRecord, SqliteLedger};
use image_ledger::url::derive_page_identity;
use tempfile::TempDir;

const PAGE: &str = "https://shop.example/products/jacket?sku=1234&utm_source=newsletter";

fn snapshot(bytes: &[u8], url: &str) -> ImageSnapshot {
    ImageSnapshot {
        content_hash: digest(bytes),
        url: url.to_string(),
        width: 800,
        height: 600,
        alt: Some(format!("alt for {}", url)),
        context: Some("img".to_string()),
        first_seen_at: Utc::now(),
    }
}

fn engine(dir: &TempDir) -> DiffEngine<SqliteLedger> {
    let ledger = SqliteLedger::new(&dir.path().join("ledger.db")).expect("open ledger");
    DiffEngine::new(ledger, IdentityConfig::default())
}

/// Visits `page` with `images`, recording only what is new
fn visit(engine: &DiffEngine<SqliteLedger>, page: &str, images: &[ImageSnapshot]) -> image_ledger::DiffResult {
    let diff = engine.compute_diff(page, images).unwrap();
    engine.update_record(page, &diff.new).unwrap();
    diff
}

#[test]
fn test_scenario_a_first_visit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    let images = vec![
        snapshot(b"front", "https://cdn.example/front.jpg"),
        snapshot(b"back", "https://cdn.example/back.jpg"),
    ];
    let diff = visit(&engine, PAGE, &images);

    assert!(diff.is_first_visit);
    assert_eq!(diff.new, images);
    assert!(diff.existing.is_empty());
}

#[test]
fn test_scenario_b_unchanged_revisit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    let images = vec![
        snapshot(b"front", "https://cdn.example/front.jpg"),
        snapshot(b"back", "https://cdn.example/back.jpg"),
    ];
    visit(&engine, PAGE, &images);

    // Tracking noise and a fragment do not change the page
    let diff = visit(
        &engine,
        "https://www.shop.example/products/jacket/?utm_medium=email&sku=1234#reviews",
        &images,
    );

    assert!(!diff.is_first_visit);
    assert!(diff.new.is_empty());
    assert_eq!(diff.existing.len(), 2);

    let store = engine.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 1);
    assert_eq!(store.count_images().unwrap(), 2);
}

#[test]
fn test_scenario_c_changed_revisit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    let front = snapshot(b"front", "https://cdn.example/front.jpg");
    visit(&engine, PAGE, &[front.clone()]);

    // Same front image under a new URL, plus one genuinely new image
    let moved_front = snapshot(b"front", "https://cdn2.example/front-large.jpg");
    let detail = snapshot(b"detail", "https://cdn.example/detail.jpg");
    let diff = visit(&engine, PAGE, &[moved_front, detail.clone()]);

    assert!(!diff.is_first_visit);
    assert_eq!(diff.new, vec![detail]);
    assert_eq!(diff.existing.len(), 1);
    assert_eq!(diff.existing[0].url, front.url);
}

#[test]
fn test_significant_parameter_separates_pages() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);
    let image = snapshot(b"front", "https://cdn.example/front.jpg");

    visit(&engine, PAGE, &[image.clone()]);
    let other = visit(
        &engine,
        "https://shop.example/products/jacket?sku=9999",
        &[image],
    );

    assert!(other.is_first_visit);
}

#[test]
fn test_record_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let image = snapshot(b"front", "https://cdn.example/front.jpg");

    visit(&engine(&dir), PAGE, &[image.clone()]);

    let diff = engine(&dir).compute_diff(PAGE, &[image]).unwrap();
    assert!(!diff.is_first_visit);
    assert_eq!(diff.existing.len(), 1);
}

#[test]
fn test_cleanup_removes_only_stale_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut ledger = SqliteLedger::new(&dir.path().join("ledger.db")).unwrap();
    let config = IdentityConfig::default();
    let now = Utc::now();

    let stale = derive_page_identity("https://a.example/stale", &config).unwrap();
    let fresh = derive_page_identity("https://a.example/fresh", &config).unwrap();

    let mut stale_record = PageRecord::new(&stale, now - Duration::days(91));
    stale_record.images.push(snapshot(b"old", "https://cdn.example/old.jpg"));
    ledger.put(&stale_record).unwrap();
    ledger
        .put(&PageRecord::new(&fresh, now - Duration::days(10)))
        .unwrap();

    let engine = DiffEngine::new(ledger, config);
    assert_eq!(engine.cleanup(90).unwrap(), 1);

    assert!(engine.compute_diff("https://a.example/stale", &[]).unwrap().is_first_visit);
    assert!(!engine.compute_diff("https://a.example/fresh", &[]).unwrap().is_first_visit);

    let store = engine.store().lock().unwrap();
    assert_eq!(store.count_images().unwrap(), 0);
}

#[test]
fn test_cleanup_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(engine(&dir).cleanup(90).unwrap(), 0);
}

#[test]
fn test_malformed_page_url_is_empty_and_not_first_visit() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(&dir);

    let diff = engine
        .compute_diff("not a url", &[snapshot(b"front", "https://cdn.example/front.jpg")])
        .unwrap();

    assert!(!diff.is_first_visit);
    assert!(diff.new.is_empty());
    assert!(diff.existing.is_empty());
    assert!(engine.update_record("not a url", &[]).unwrap().is_none());

    let store = engine.store().lock().unwrap();
    assert_eq!(store.count_records().unwrap(), 0);
}
