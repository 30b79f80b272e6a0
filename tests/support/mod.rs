//! Shared fixtures: a scratch data root and a mocked upstream

#![allow(dead_code)]

use aemet_harvester::fetcher::aemet::AemetFetcher;
use aemet_harvester::fetcher::aemet_http::AemetHttpClient;
use aemet_harvester::harvest::{HarvestConfig, HarvestExecutor, RetryPolicy};
use aemet_harvester::output::DataLayout;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const API_KEY: &str = "test-key";

/// Regex matching the climatology envelope path of one station group
pub fn climatology_path(encoded_codes: &str) -> String {
    format!(r"^/valores/climatologicos/diarios/datos/fechaini/.+/fechafin/.+/estacion/{encoded_codes}$")
}

/// Regex matching the forecast envelope path of one municipality
pub fn forecast_path(code: &str) -> String {
    format!(r"^/prediccion/especifica/municipio/diaria/{code}$")
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
}

/// One raw daily climatology record as upstream sends it
pub fn raw_observation(station: &str, date: &str) -> Value {
    json!({
        "fecha": date,
        "indicativo": station,
        "nombre": format!("ESTACION {station}"),
        "provincia": "MADRID",
        "altitud": "667",
        "tmed": "8,4",
        "prec": "0,0",
        "tmin": "3,1",
        "tmax": "13,7",
        "velmedia": "1,9",
        "racha": "7,2",
        "hrMedia": "71",
        "hrMax": "95",
        "hrMin": "44"
    })
}

/// Envelope pointing at `data_path` on the mock server
pub fn envelope(server: &MockServer, data_path: &str) -> Value {
    json!({
        "descripcion": "exito",
        "estado": 200,
        "datos": format!("{}{}", server.uri(), data_path),
        "metadatos": format!("{}/metadatos", server.uri())
    })
}

/// Municipal forecast reply with `days` days
pub fn raw_forecast(code: &str, town: &str, days: usize) -> Value {
    let dia: Vec<Value> = (0..days)
        .map(|i| {
            json!({
                "fecha": format!("2025-01-{:02}T00:00:00", i + 5),
                "probPrecipitacion": [{"value": 10, "periodo": "00-24"}],
                "cotaNieveProv": [{"value": "", "periodo": "00-24"}],
                "estadoCielo": [{"value": "11", "periodo": "00-24", "descripcion": "Despejado"}],
                "viento": [{"direccion": "N", "velocidad": 10, "periodo": "00-24"}],
                "rachaMax": [{"value": "", "periodo": "00-24"}],
                "temperatura": {"maxima": 14, "minima": 2, "dato": []},
                "sensTermica": {"maxima": 13, "minima": 0, "dato": []},
                "humedadRelativa": {"maxima": 90, "minima": 45, "dato": []},
                "uvMax": 2
            })
        })
        .collect();

    json!([{
        "origen": {"productor": "Agencia Estatal de Meteorología - AEMET"},
        "elaborado": "2025-01-05T08:37:51",
        "nombre": town,
        "provincia": "Araba/Álava",
        "prediccion": {"dia": dia},
        "id": code.trim_start_matches('0'),
        "version": "1.0"
    }])
}

/// Route harvest logs through the libtest capture
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aemet_harvester=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Scratch data root plus a mock upstream
pub struct Harness {
    pub dir: TempDir,
    pub server: MockServer,
}

impl Harness {
    pub async fn start() -> Self {
        init_test_tracing();
        Self {
            dir: TempDir::new().unwrap(),
            server: MockServer::start().await,
        }
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::under(self.dir.path())
    }

    pub fn config(&self) -> HarvestConfig {
        let layout = self.layout();
        HarvestConfig::new(API_KEY, layout.json_dir(), layout.journal_dir())
            .with_base_url(self.server.uri())
            .with_start_date(day(1))
            .with_pacing(Duration::ZERO, Duration::ZERO)
    }

    /// Executor against the mock with zero-delay retries
    pub fn executor(&self) -> HarvestExecutor {
        self.executor_with(RetryPolicy::immediate(5))
    }

    pub fn executor_with(&self, policy: RetryPolicy) -> HarvestExecutor {
        let http = AemetHttpClient::new(API_KEY, Duration::from_secs(2), Duration::from_secs(5), policy)
            .unwrap();
        let fetcher = AemetFetcher::new(http, self.server.uri());
        HarvestExecutor::new(self.config(), Arc::new(fetcher))
    }

    /// Write a code file under `json/`
    pub fn write_json(&self, name: &str, value: &Value) {
        let layout = self.layout();
        std::fs::create_dir_all(layout.json_dir()).unwrap();
        std::fs::write(
            layout.json_dir().join(name),
            serde_json::to_string_pretty(value).unwrap(),
        )
        .unwrap();
    }

    pub fn read_json(&self, path: impl AsRef<std::path::Path>) -> Value {
        let content = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// Mount envelope and data for a station group
    pub async fn mount_group(&self, encoded_codes: &str, data_path: &str, records: Value) {
        Mock::given(method("GET"))
            .and(path_regex(climatology_path(encoded_codes)))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&self.server, data_path)))
            .mount(&self.server)
            .await;
        self.mount_data(data_path, records).await;
    }

    /// Mount envelope and data for a municipality forecast
    pub async fn mount_forecast(&self, code: &str, data_path: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path_regex(forecast_path(code)))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope(&self.server, data_path)))
            .mount(&self.server)
            .await;
        self.mount_data(data_path, body).await;
    }

    pub async fn mount_data(&self, data_path: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(data_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}
