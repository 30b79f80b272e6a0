//! Integration tests for checkpoints and continuation

use crate::support::{climatology_path, day, raw_observation, Harness};
use aemet_harvester::fetcher::aemet_parser::AemetParser;
use aemet_harvester::harvest::merge::{merge_into_progress, merge_observations};
use aemet_harvester::output::DatasetFile;
use aemet_harvester::resume::{HistoricalProgress, ProgressStore, SCHEMA_VERSION};
use aemet_harvester::HistoricalDataset;
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, ResponseTemplate};

fn parsed(records: serde_json::Value) -> Vec<aemet_harvester::ObservationRecord> {
    AemetParser::parse_observations("fixture", &records, Utc::now()).unwrap()
}

#[tokio::test]
async fn test_resume_skips_groups_already_stored() {
    let h = Harness::start().await;
    h.write_json(
        "codes_group.json",
        &json!({"grupo_1": "3195,3196", "grupo_2": "B278"}),
    );

    let mut durable = HistoricalDataset::new();
    merge_observations(
        &mut durable,
        parsed(json!([
            raw_observation("3195", "2025-01-01"),
            raw_observation("3196", "2025-01-01"),
        ])),
    );
    DatasetFile::new(h.layout().historical_dataset()).save(&durable).unwrap();

    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195%2C3196")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;
    h.mount_group("B278", "/datos/B278", json!([raw_observation("B278", "2025-01-01")]))
        .await;

    let report = h.executor().run_historical_harvest(day(1), true).await.unwrap();

    assert_eq!(report.summary.total_units, 1);
    assert_eq!(report.dataset.len(), 3);
    assert_eq!(report.summary.new_dates, 1);
}

#[tokio::test]
async fn test_resume_refetches_group_with_one_missing_station() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195,3196"}));

    let mut durable = HistoricalDataset::new();
    merge_observations(&mut durable, parsed(json!([raw_observation("3195", "2025-01-01")])));
    DatasetFile::new(h.layout().historical_dataset()).save(&durable).unwrap();

    h.mount_group(
        "3195%2C3196",
        "/datos/grupo_1",
        json!([
            raw_observation("3195", "2025-01-01"),
            raw_observation("3196", "2025-01-01"),
        ]),
    )
    .await;

    let report = h.executor().run_historical_harvest(day(1), true).await.unwrap();
    assert_eq!(report.summary.total_units, 1);
    assert_eq!(report.summary.new_dates, 1);
    assert!(report.dataset.contains_station("3196"));
}

#[tokio::test]
async fn test_resume_with_nothing_pending_keeps_dataset() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));

    let mut durable = HistoricalDataset::new();
    merge_observations(&mut durable, parsed(json!([raw_observation("3195", "2025-01-01")])));
    DatasetFile::new(h.layout().historical_dataset()).save(&durable).unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let report = h.executor().run_historical_harvest(day(1), true).await.unwrap();
    assert_eq!(report.summary.total_units, 0);
    assert_eq!(report.dataset, durable);
}

#[tokio::test]
async fn test_interrupted_run_checkpoint_is_folded_in() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195", "grupo_2": "B278"}));

    // A previous run stored grupo_1 in its checkpoint and then died.
    let store = ProgressStore::<HistoricalProgress>::new(h.layout().historical_checkpoint());
    let mut progress = HistoricalProgress::default();
    merge_into_progress(&mut progress, parsed(json!([raw_observation("3195", "2025-01-01")])));
    store.save(&progress).unwrap();

    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;
    h.mount_group("B278", "/datos/B278", json!([raw_observation("B278", "2025-01-01")]))
        .await;

    let report = h.executor().run_historical_harvest(day(1), true).await.unwrap();

    assert!(report.dataset.contains_station("3195"));
    assert!(report.dataset.contains_station("B278"));
    assert!(!store.exists());
}

#[tokio::test]
async fn test_checkpoint_written_with_schema_version() {
    let h = Harness::start().await;
    let store = ProgressStore::<HistoricalProgress>::new(h.layout().historical_checkpoint());
    let mut progress = HistoricalProgress::default();
    merge_into_progress(&mut progress, parsed(json!([raw_observation("3195", "2025-01-01")])));

    store.save(&progress).unwrap();

    let raw = h.read_json(store.path());
    assert_eq!(raw["schema_version"], SCHEMA_VERSION);
    assert!(raw["processed_dates"]["3195"]["dates"].is_array());
    assert!(raw["stations_data"]["3195"]["date"]["2025-01-01"].is_object());

    let loaded = store.load();
    assert!(loaded.is_processed("3195", day(1)));
    assert!(!loaded.is_processed("3195", day(2)));
}

#[tokio::test]
async fn test_corrupt_checkpoint_starts_fresh() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    std::fs::write(h.layout().historical_checkpoint(), "{ not json").unwrap();
    h.mount_group("3195", "/datos/3195", json!([raw_observation("3195", "2025-01-01")]))
        .await;

    let report = h.executor().run_historical_harvest(day(1), false).await.unwrap();
    assert_eq!(report.dataset.date_count(), 1);
}

#[tokio::test]
async fn test_corrupt_durable_dataset_aborts_without_overwrite() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    std::fs::write(h.layout().historical_dataset(), "[1, 2").unwrap();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    assert!(h.executor().run_historical_harvest(day(1), false).await.is_none());
    let content = std::fs::read_to_string(h.layout().historical_dataset()).unwrap();
    assert_eq!(content, "[1, 2");
}
