//! Historical weather extremes from the Open-Meteo archive.

use crate::fetch::{decode_json, HttpGateway, HEAVY_TIMEOUT};
use chrono::{Months, NaiveDate, Utc};
use geoscope_core::geo::round_to;
use geoscope_core::sources::{DailyExtreme, WeatherHistory};
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde::Deserialize;

const SOURCE: SourceId = SourceId::OpenMeteoArchive;
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max";
/// The archive lags real time by a few days.
const ARCHIVE_LAG_DAYS: u64 = 7;
pub const HEAVY_RAIN_MM: f64 = 50.0;
pub const MAX_YEARS: u32 = 30;

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    daily: Option<Daily>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Daily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
}

/// Inclusive date range covering the last `years` years of archive data.
pub fn date_range(today: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    let years = years.clamp(1, MAX_YEARS);
    let end = today
        .checked_sub_days(chrono::Days::new(ARCHIVE_LAG_DAYS))
        .unwrap_or(today);
    let start = end
        .checked_sub_months(Months::new(12 * years))
        .unwrap_or(end);
    (start, end)
}

pub async fn weather_history(
    gateway: &HttpGateway,
    url: &str,
    lat: f64,
    lon: f64,
    years: u32,
) -> SourceResult<WeatherHistory> {
    let (start, end) = date_range(Utc::now().date_naive(), years);
    let query = [
        ("latitude", lat.to_string()),
        ("longitude", lon.to_string()),
        ("start_date", start.format("%Y-%m-%d").to_string()),
        ("end_date", end.format("%Y-%m-%d").to_string()),
        ("daily", DAILY_FIELDS.to_string()),
        ("timezone", "auto".to_string()),
    ];
    match gateway.get_text(url, &query, HEAVY_TIMEOUT).await {
        Ok(body) => parse(url, &body, start, end),
        Err(err) => err.into_result(SOURCE),
    }
}

pub fn parse(url: &str, body: &str, start: NaiveDate, end: NaiveDate) -> SourceResult<WeatherHistory> {
    let parsed: Body = match decode_json(url, body) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_result(SOURCE),
    };
    if parsed.error {
        return SourceResult::failed(
            SOURCE,
            FailureKind::Upstream,
            parsed.reason.unwrap_or_else(|| "unspecified error".to_string()),
        );
    }
    match parsed.daily {
        Some(daily) if !daily.time.is_empty() => {
            SourceResult::ok(SOURCE, summarize(&daily, start, end))
        }
        _ => SourceResult::failed(
            SOURCE,
            FailureKind::NotFound,
            "archive returned no daily series for this location",
        ),
    }
}

fn summarize(daily: &Daily, start: NaiveDate, end: NaiveDate) -> WeatherHistory {
    let days = daily.time.len();
    let precip_total: f64 = daily.precipitation_sum.iter().flatten().sum();
    let heavy_rain_days = daily
        .precipitation_sum
        .iter()
        .flatten()
        .filter(|mm| **mm >= HEAVY_RAIN_MM)
        .count() as u32;

    WeatherHistory {
        start_date: start.format("%Y-%m-%d").to_string(),
        end_date: end.format("%Y-%m-%d").to_string(),
        days: days as u32,
        hottest: extreme(&daily.time, &daily.temperature_2m_max, |a, b| a > b),
        coldest: extreme(&daily.time, &daily.temperature_2m_min, |a, b| a < b),
        wettest: extreme(&daily.time, &daily.precipitation_sum, |a, b| a > b),
        windiest: extreme(&daily.time, &daily.wind_speed_10m_max, |a, b| a > b),
        heavy_rain_days,
        mean_annual_precip_mm: (days > 0)
            .then(|| round_to(precip_total / (days as f64 / 365.25), 1)),
    }
}

/// First day whose value beats every other under `better`.
fn extreme(
    dates: &[String],
    values: &[Option<f64>],
    better: impl Fn(f64, f64) -> bool,
) -> Option<DailyExtreme> {
    let mut best: Option<(usize, f64)> = None;
    for (i, value) in values.iter().enumerate().take(dates.len()) {
        let Some(value) = value.filter(|v| v.is_finite()) else {
            continue;
        };
        if best.is_none_or(|(_, current)| better(value, current)) {
            best = Some((i, value));
        }
    }
    best.map(|(i, value)| DailyExtreme {
        date: dates[i].clone(),
        value,
    })
}
