use aemet_harvester::fetcher::aemet_config::{
    encode_date, encode_segment, forecast_url, observations_url, AEMET_BASE_URL,
};
use aemet_harvester::HarvestWindow;
use chrono::NaiveDate;

#[test]
fn station_lists_and_timestamps_are_encoded() {
    assert_eq!(encode_segment("3195,3196,B278"), "3195%2C3196%2CB278");
    assert_eq!(
        encode_date(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
        "2025-12-31T00%3A00%3A00UTC"
    );
}

#[test]
fn single_day_window_uses_same_date_twice() {
    let day = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
    let url = observations_url(AEMET_BASE_URL, HarvestWindow::new(day, day).unwrap(), "0016A");

    assert!(url.starts_with(AEMET_BASE_URL));
    assert_eq!(url.matches("2025-03-09T00%3A00%3A00UTC").count(), 2);
    assert!(url.ends_with("/estacion/0016A"));
}

#[test]
fn forecast_code_keeps_leading_zeros() {
    assert!(forecast_url(AEMET_BASE_URL, "01001").ends_with("/municipio/diaria/01001"));
}
