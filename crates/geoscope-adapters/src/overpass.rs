//! Infrastructure around a point from the Overpass API.
//!
//! Mirrors are tried in order. A 429 pauses before moving on; any other
//! failure moves on immediately. The last error is reported when every
//! mirror fails.

use crate::fetch::{decode_json, FetchError, HttpGateway, HEAVY_TIMEOUT};
use geoscope_core::geo::{haversine_m, round_to};
use geoscope_core::sources::{Infrastructure, InfrastructureCategory, NamedFeature};
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

const SOURCE: SourceId = SourceId::Overpass;
const MAX_EXAMPLES: usize = 3;

/// `(category, osm key, value regex)` clauses of the query.
const CLAUSES: &[(&str, &str, &str)] = &[
    ("education", "amenity", "school|kindergarten|college|university"),
    ("health", "amenity", "hospital|clinic|doctors|pharmacy"),
    ("safety", "amenity", "police|fire_station"),
    ("culture", "amenity", "library|theatre|arts_centre|community_centre"),
    ("culture", "tourism", "museum"),
    ("green", "leisure", "park|garden|playground"),
    ("retail", "shop", "supermarket|convenience|bakery|mall"),
    ("transport", "highway", "bus_stop"),
    ("transport", "railway", "station|halt|tram_stop|subway_entrance"),
];

#[derive(Debug, Deserialize)]
struct OverpassBody {
    #[serde(default)]
    elements: Vec<Element>,
    #[serde(default)]
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Element {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    center: Option<Center>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Center {
    lat: f64,
    lon: f64,
}

pub fn build_query(lat: f64, lon: f64, radius_m: u32) -> String {
    let mut query = String::from("[out:json][timeout:25];\n(\n");
    for (_, key, values) in CLAUSES {
        query.push_str(&format!(
            "  nwr(around:{radius_m},{lat},{lon})[\"{key}\"~\"^({values})$\"];\n"
        ));
    }
    query.push_str(");\nout tags center 500;\n");
    query
}

pub async fn infrastructure(
    gateway: &HttpGateway,
    endpoints: &[String],
    lat: f64,
    lon: f64,
    radius_m: u32,
    rate_limit_pause: Duration,
) -> SourceResult<Infrastructure> {
    let query = build_query(lat, lon, radius_m);
    let mut last_error: Option<(FailureKind, String)> = None;

    for (attempt, endpoint) in endpoints.iter().enumerate() {
        let outcome = gateway
            .post_form_text(endpoint, &[("data", query.as_str())], HEAVY_TIMEOUT)
            .await
            .and_then(|body| parse_response(endpoint, &body, lat, lon, radius_m));
        match outcome {
            Ok(found) => return SourceResult::ok(SOURCE, found),
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, attempt, error = %err, "overpass mirror failed");
                let rate_limited = err.is_rate_limited();
                last_error = Some((err.failure_kind(), err.to_string()));
                if rate_limited && attempt + 1 < endpoints.len() {
                    tokio::time::sleep(rate_limit_pause).await;
                }
            }
        }
    }

    let (kind, error) = last_error.unwrap_or((
        FailureKind::Upstream,
        "no Overpass endpoints configured".to_string(),
    ));
    SourceResult::failed(SOURCE, kind, error)
}

fn parse_response(
    endpoint: &str,
    body: &str,
    lat: f64,
    lon: f64,
    radius_m: u32,
) -> Result<Infrastructure, FetchError> {
    let parsed: OverpassBody = decode_json(endpoint, body)?;
    // Overpass reports query timeouts as a 200 with a remark and no elements.
    if let Some(remark) = parsed.remark.as_deref().filter(|r| r.contains("error")) {
        if parsed.elements.is_empty() {
            return Err(FetchError::Decode {
                host: endpoint.to_string(),
                message: remark.to_string(),
            });
        }
    }
    Ok(summarize(endpoint, &parsed.elements, lat, lon, radius_m))
}

fn summarize(
    endpoint: &str,
    elements: &[Element],
    lat: f64,
    lon: f64,
    radius_m: u32,
) -> Infrastructure {
    let mut categories: BTreeMap<String, InfrastructureCategory> = BTreeMap::new();
    let mut total = 0;

    for element in elements {
        let Some((category, kind)) = classify(&element.tags) else {
            continue;
        };
        let position = match (&element.center, element.lat, element.lon) {
            (Some(center), _, _) => Some((center.lat, center.lon)),
            (None, Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        let distance = position.map(|(el_lat, el_lon)| round_to(haversine_m(lat, lon, el_lat, el_lon), 0));

        let entry = categories.entry(category.to_string()).or_default();
        entry.count += 1;
        total += 1;
        if let Some(distance) = distance {
            entry.nearest_m = Some(entry.nearest_m.map_or(distance, |d| d.min(distance)));
            if let Some(name) = element.tags.get("name").filter(|n| !n.trim().is_empty()) {
                entry.examples.push(NamedFeature {
                    name: name.trim().to_string(),
                    kind,
                    distance_m: distance,
                });
            }
        }
    }

    for category in categories.values_mut() {
        category
            .examples
            .sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        category.examples.truncate(MAX_EXAMPLES);
    }

    Infrastructure {
        radius_m,
        endpoint: endpoint.to_string(),
        total,
        categories,
    }
}

fn classify(tags: &HashMap<String, String>) -> Option<(&'static str, String)> {
    CLAUSES.iter().find_map(|(category, key, values)| {
        let value = tags.get(*key)?;
        values
            .split('|')
            .any(|v| v == value)
            .then(|| (*category, value.clone()))
    })
}
