//! Integration tests for retry classification against a mocked upstream

use crate::support::{climatology_path, day, envelope, raw_observation, Harness};
use aemet_harvester::harvest::{HarvestContext, RetryPolicy};
use aemet_harvester::fetcher::aemet_http::AemetHttpClient;
use aemet_harvester::fetcher::FetcherError;
use aemet_harvester::resume::ErrorJournal;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_server_errors_exhaust_attempts_and_journal_once() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&h.server)
        .await;

    let report = h.executor().run_historical_harvest(day(1), false).await;
    assert!(report.is_none());

    let entries = ErrorJournal::new(h.layout().historical_journal()).entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].cause.contains("after 5 attempts"));
}

#[tokio::test]
async fn test_rate_limited_envelope_is_retried_until_success() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&h.server)
        .await;
    h.mount_group("3195", "/datos/3195", json!([raw_observation("3195", "2025-01-01")]))
        .await;

    let report = h.executor().run_historical_harvest(day(1), false).await.unwrap();

    assert_eq!(report.summary.succeeded, 1);
    assert!(ErrorJournal::new(h.layout().historical_journal()).is_empty().unwrap());
}

#[tokio::test]
async fn test_rate_limit_in_body_is_retried() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "descripcion": "Limite de peticiones o caudal por minuto excedido para este usuario.",
            "estado": 429
        })))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&h.server)
        .await;
    h.mount_group("3195", "/datos/3195", json!([raw_observation("3195", "2025-01-01")]))
        .await;

    let report = h.executor().run_historical_harvest(day(1), false).await.unwrap();
    assert!(report.dataset.contains_station("3195"));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;

    assert!(h.executor().run_historical_harvest(day(1), false).await.is_none());
    assert_eq!(ErrorJournal::new(h.layout().historical_journal()).len().unwrap(), 1);
}

#[tokio::test]
async fn test_data_call_failure_journals_the_data_url() {
    let h = Harness::start().await;
    h.write_json("codes_group.json", &json!({"grupo_1": "3195"}));
    Mock::given(method("GET"))
        .and(path_regex(climatology_path("3195")))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&h.server, "/datos/broken")))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/datos/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&h.server)
        .await;

    let executor = h.executor_with(RetryPolicy::immediate(3));
    assert!(executor.run_historical_harvest(day(1), false).await.is_none());

    let entries = ErrorJournal::new(h.layout().historical_journal()).entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].failed_url().unwrap(),
        format!("{}/datos/broken", h.server.uri())
    );
}

#[tokio::test]
async fn test_html_body_is_fatal() {
    let h = Harness::start().await;
    Mock::given(method("GET"))
        .and(path("/datos/html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>Mantenimiento</body></html>"),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let client = AemetHttpClient::new(
        "k",
        Duration::from_secs(2),
        Duration::from_secs(5),
        RetryPolicy::immediate(5),
    )
    .unwrap();
    let ctx = HarvestContext::new(Duration::ZERO);
    let url = format!("{}/datos/html", h.server.uri());

    let err = client.get_json(&ctx, "3195", &url).await.unwrap_err();
    assert!(matches!(err, FetcherError::Fatal { .. }));
    assert_eq!(err.url(), Some(url.as_str()));
    assert_eq!(ctx.requests_sent(), 1);
}
