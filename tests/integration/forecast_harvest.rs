//! Integration tests for the forecast harvest

use crate::support::{forecast_path, raw_forecast, Harness};
use aemet_harvester::fetcher::aemet_parser::FORECAST_DAYS;
use aemet_harvester::output::DatasetFile;
use aemet_harvester::resume::{ErrorJournal, JournalEntry};
use aemet_harvester::{ForecastDataset, MetricValue};
use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_forecast_keeps_seven_days_and_queried_code() {
    let h = Harness::start().await;
    h.write_json("towns_codes.json", &json!({"01001": "Alegría-Dulantzi"}));
    h.mount_forecast("01001", "/datos/01001", raw_forecast("01001", "Alegría-Dulantzi", 8))
        .await;

    let report = h.executor().run_forecast_harvest(false).await.unwrap();

    assert_eq!(report.summary.succeeded, 1);
    assert_eq!(report.summary.new_dates, 1);
    let record = report.dataset.get("01001").expect("stored under the queried code");
    assert_eq!(record.town, "Alegría-Dulantzi");
    assert_eq!(record.elaborated, "2025-01-05T08:37:51");
    assert_eq!(record.prediction.len(), FORECAST_DAYS);

    let first = &record.prediction["day_1"];
    assert_eq!(first.date, "2025-01-05T00:00:00");
    assert_eq!(first.values.uv_max, MetricValue::Measured("2".to_string()));
    assert_eq!(first.values.sky_state.len(), 1);

    let raw = h.read_json(h.layout().forecast_dataset());
    assert!(raw[0]["prediction"]["day_1"]["2025-01-05T00:00:00"]["estadoCielo"].is_array());
    assert!(!h.layout().forecast_checkpoint().exists());
}

#[tokio::test]
async fn test_forecast_refresh_keeps_insert_time() {
    let h = Harness::start().await;
    h.write_json("towns_codes.json", &json!({"28079": "Madrid"}));
    h.mount_forecast("28079", "/datos/28079", raw_forecast("28079", "Madrid", 7))
        .await;
    let executor = h.executor();

    let first = executor.run_forecast_harvest(false).await.unwrap();
    let second = executor.run_forecast_harvest(false).await.unwrap();

    assert_eq!(second.summary.new_dates, 0);
    assert_eq!(second.dataset.len(), 1);
    let (a, b) = (first.dataset.get("28079").unwrap(), second.dataset.get("28079").unwrap());
    assert_eq!(b.ts_insert, a.ts_insert);
    assert!(b.fetched >= a.fetched);
}

#[tokio::test]
async fn test_forecast_resume_skips_stored_towns() {
    let h = Harness::start().await;
    h.write_json(
        "towns_codes.json",
        &json!({"01001": "Alegría-Dulantzi", "28079": "Madrid"}),
    );
    h.mount_forecast("01001", "/datos/01001", raw_forecast("01001", "Alegría-Dulantzi", 7))
        .await;
    h.mount_forecast("28079", "/datos/28079", raw_forecast("28079", "Madrid", 7))
        .await;
    h.executor().run_forecast_harvest(false).await.unwrap();

    // Drop Madrid from the stored dataset, then resume.
    let file = DatasetFile::<ForecastDataset>::new(h.layout().forecast_dataset());
    let stored = file.load().unwrap();
    let mut partial = ForecastDataset::new();
    partial.upsert(stored.get("01001").unwrap().clone());
    file.save(&partial).unwrap();

    let report = h.executor().run_forecast_harvest(true).await.unwrap();
    assert_eq!(report.summary.total_units, 1);
    assert_eq!(report.dataset.len(), 2);
}

#[tokio::test]
async fn test_forecast_failure_goes_to_forecast_journal() {
    let h = Harness::start().await;
    h.write_json("towns_codes.json", &json!({"99999": "Nowhere"}));
    Mock::given(method("GET"))
        .and(path_regex(forecast_path("99999")))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.executor().run_forecast_harvest(false).await.is_none());

    let layout = h.layout();
    assert_eq!(ErrorJournal::new(layout.forecast_journal()).len().unwrap(), 1);
    assert!(ErrorJournal::new(layout.historical_journal()).is_empty().unwrap());
}

#[tokio::test]
async fn test_empty_forecast_list_is_not_an_error() {
    let h = Harness::start().await;
    h.write_json("towns_codes.json", &json!({"01001": "Alegría-Dulantzi"}));
    h.mount_forecast("01001", "/datos/01001", json!([])).await;

    let report = h.executor().run_forecast_harvest(false).await;

    assert!(report.is_none());
    assert!(ErrorJournal::new(h.layout().forecast_journal()).is_empty().unwrap());
}

#[tokio::test]
async fn test_later_forecast_success_drains_journal() {
    let h = Harness::start().await;
    h.write_json("towns_codes.json", &json!({"01001": "Alegría-Dulantzi"}));
    Mock::given(method("GET"))
        .and(path_regex(forecast_path("01001")))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    h.mount_forecast("01001", "/datos/01001", raw_forecast("01001", "Alegría-Dulantzi", 7))
        .await;
    let executor = h.executor();
    let journal = ErrorJournal::new(h.layout().forecast_journal());

    assert!(executor.run_forecast_harvest(false).await.is_none());
    assert_eq!(journal.len().unwrap(), 1);

    let report = executor.run_forecast_harvest(true).await.unwrap();
    assert_eq!(report.summary.succeeded, 1);
    assert!(journal.is_empty().unwrap());
    assert!(executor.run_forecast_replay().await.is_none());
}

#[tokio::test]
async fn test_forecast_replay_recovers_data_and_envelope_urls() {
    let h = Harness::start().await;
    let journal = ErrorJournal::new(h.layout().forecast_journal());
    let data_url = format!("{}/datos/01001", h.server.uri());
    let envelope_url = format!("{}/prediccion/especifica/municipio/diaria/28079", h.server.uri());
    journal
        .append(JournalEntry::new("01001", Some(data_url), "HTTP 503"))
        .unwrap();
    journal
        .append(JournalEntry::new("28079", Some(envelope_url), "timeout"))
        .unwrap();
    h.mount_data("/datos/01001", raw_forecast("01001", "Alegría-Dulantzi", 7))
        .await;
    h.mount_forecast("28079", "/datos/28079", raw_forecast("28079", "Madrid", 7))
        .await;

    let report = h.executor().run_forecast_replay().await.unwrap();

    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.new_dates, 2);
    assert!(journal.is_empty().unwrap());
    let stored = DatasetFile::<ForecastDataset>::new(h.layout().forecast_dataset())
        .load()
        .unwrap();
    assert_eq!(stored.get("01001").unwrap().prediction.len(), 7);
    assert!(stored.contains("28079"));
}

#[tokio::test]
async fn test_forecast_replay_keeps_failing_entry_untouched() {
    let h = Harness::start().await;
    let journal = ErrorJournal::new(h.layout().forecast_journal());
    let url = format!("{}/datos/99999", h.server.uri());
    journal.append(JournalEntry::new("99999", Some(url), "HTTP 500")).unwrap();
    let before = std::fs::read_to_string(journal.path()).unwrap();

    Mock::given(method("GET"))
        .and(path_regex("^/datos/99999$"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.executor().run_forecast_replay().await.is_none());
    assert_eq!(std::fs::read_to_string(journal.path()).unwrap(), before);
    assert!(!h.layout().forecast_dataset().exists());
}
