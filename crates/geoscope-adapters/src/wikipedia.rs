//! Geotagged Wikipedia articles near a point, used as historical events.

use crate::fetch::{decode_json, HttpGateway, DEFAULT_TIMEOUT};
use geoscope_core::sources::{HistoricalEvent, HistoricalEvents};
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde::Deserialize;

const SOURCE: SourceId = SourceId::Wikipedia;
/// `gsradius` upper bound enforced by the API.
const MAX_RADIUS_M: u32 = 10_000;
const LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(default)]
    query: Option<Query>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Query {
    #[serde(default)]
    geosearch: Vec<GeoHit>,
}

#[derive(Debug, Deserialize)]
struct GeoHit {
    pageid: u64,
    title: String,
    #[serde(default)]
    dist: f64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    info: String,
}

pub async fn historical_events(
    gateway: &HttpGateway,
    api_url: &str,
    language: &str,
    lat: f64,
    lon: f64,
    radius_m: u32,
) -> SourceResult<HistoricalEvents> {
    let radius_m = radius_m.clamp(10, MAX_RADIUS_M);
    let query = [
        ("action", "query".to_string()),
        ("list", "geosearch".to_string()),
        ("gscoord", format!("{lat}|{lon}")),
        ("gsradius", radius_m.to_string()),
        ("gslimit", LIMIT.to_string()),
        ("format", "json".to_string()),
    ];
    match gateway.get_text(api_url, &query, DEFAULT_TIMEOUT).await {
        Ok(body) => parse(api_url, &body, language, radius_m),
        Err(err) => err.into_result(SOURCE),
    }
}

pub fn parse(api_url: &str, body: &str, language: &str, radius_m: u32) -> SourceResult<HistoricalEvents> {
    let parsed: Body = match decode_json(api_url, body) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_result(SOURCE),
    };
    if let Some(error) = parsed.error {
        return SourceResult::failed(
            SOURCE,
            FailureKind::Upstream,
            format!("{}: {}", error.code, error.info),
        );
    }
    let mut hits = parsed.query.map(|q| q.geosearch).unwrap_or_default();
    hits.sort_by(|a, b| a.dist.total_cmp(&b.dist));

    let items = hits
        .into_iter()
        .map(|hit| HistoricalEvent {
            url: format!("https://{language}.wikipedia.org/?curid={}", hit.pageid),
            title: hit.title,
            distance_m: hit.dist,
        })
        .collect();

    SourceResult::ok(
        SOURCE,
        HistoricalEvents {
            radius_m,
            language: language.to_string(),
            items,
        },
    )
}
