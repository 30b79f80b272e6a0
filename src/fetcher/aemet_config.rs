//! AEMET OpenData endpoint configuration and URL construction

use crate::HarvestWindow;
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Production base URL
pub const AEMET_BASE_URL: &str = "https://opendata.aemet.es/opendata/api";

/// Daily climatology endpoint, relative to the base URL
pub const CLIMATOLOGY_PATH: &str = "/valores/climatologicos/diarios/datos";

/// Municipal daily forecast endpoint, relative to the base URL
pub const FORECAST_PATH: &str = "/prediccion/especifica/municipio/diaria";

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "api_key";

/// Characters escaped inside a path segment. Upstream expects `:` and `,`
/// encoded.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b',')
    .add(b'?');

/// Encode a path segment.
pub fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

/// Midnight-UTC timestamp in the format the climatology endpoint expects,
/// already encoded (`2025-01-01T00%3A00%3A00UTC`).
pub fn encode_date(date: NaiveDate) -> String {
    encode_segment(&format!("{}T00:00:00UTC", date.format("%Y-%m-%d")))
}

/// Envelope URL for a station group over a window.
pub fn observations_url(base_url: &str, window: HarvestWindow, station_codes: &str) -> String {
    format!(
        "{}{}/fechaini/{}/fechafin/{}/estacion/{}",
        base_url.trim_end_matches('/'),
        CLIMATOLOGY_PATH,
        encode_date(window.start),
        encode_date(window.end),
        encode_segment(station_codes)
    )
}

/// Envelope URL for a municipality forecast.
pub fn forecast_url(base_url: &str, municipality_code: &str) -> String {
    format!(
        "{}{}/{}",
        base_url.trim_end_matches('/'),
        FORECAST_PATH,
        encode_segment(municipality_code)
    )
}
