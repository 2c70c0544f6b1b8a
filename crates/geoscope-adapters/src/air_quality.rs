//! Current air quality from the Open-Meteo air-quality API.

use crate::fetch::{decode_json, HttpGateway, DEFAULT_TIMEOUT};
use geoscope_core::sources::AirQuality;
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde::Deserialize;

const SOURCE: SourceId = SourceId::OpenMeteoAir;
const CURRENT_FIELDS: &str = "european_aqi,pm10,pm2_5,nitrogen_dioxide,ozone";

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    current: Option<Current>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Current {
    #[serde(default)]
    time: String,
    european_aqi: Option<f64>,
    pm10: Option<f64>,
    pm2_5: Option<f64>,
    nitrogen_dioxide: Option<f64>,
    ozone: Option<f64>,
}

pub async fn air_quality(
    gateway: &HttpGateway,
    url: &str,
    lat: f64,
    lon: f64,
) -> SourceResult<AirQuality> {
    let query = [
        ("latitude", lat.to_string()),
        ("longitude", lon.to_string()),
        ("current", CURRENT_FIELDS.to_string()),
        ("timezone", "auto".to_string()),
    ];
    match gateway.get_text(url, &query, DEFAULT_TIMEOUT).await {
        Ok(body) => parse(url, &body),
        Err(err) => err.into_result(SOURCE),
    }
}

pub fn parse(url: &str, body: &str) -> SourceResult<AirQuality> {
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
    let Some(current) = parsed.current else {
        return SourceResult::failed(
            SOURCE,
            FailureKind::InvalidResponse,
            "response has no current block",
        );
    };
    SourceResult::ok(
        SOURCE,
        AirQuality {
            time: current.time,
            band: current.european_aqi.map(|aqi| aqi_band(aqi).to_string()),
            european_aqi: current.european_aqi,
            pm10: current.pm10,
            pm2_5: current.pm2_5,
            nitrogen_dioxide: current.nitrogen_dioxide,
            ozone: current.ozone,
        },
    )
}

/// European AQI band label.
pub fn aqi_band(aqi: f64) -> &'static str {
    match aqi {
        a if a < 20.0 => "Good",
        a if a < 40.0 => "Fair",
        a if a < 60.0 => "Moderate",
        a if a < 80.0 => "Poor",
        a if a < 100.0 => "Very poor",
        _ => "Extremely poor",
    }
}
