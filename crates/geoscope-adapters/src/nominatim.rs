//! OpenStreetMap Nominatim: forward and reverse geocoding.

use crate::fetch::{decode_json, HttpGateway, DEFAULT_TIMEOUT};
use geoscope_core::sources::{GeocodeHit, ReverseGeocode};
use geoscope_core::{Address, FailureKind, SourceId, SourceResult};
use serde::Deserialize;
use std::collections::BTreeMap;

const SOURCE: SourceId = SourceId::Nominatim;

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    extratags: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReverseBody {
    Error { error: String },
    Place(Place),
}

pub async fn geocode(
    gateway: &HttpGateway,
    base_url: &str,
    address: &str,
) -> SourceResult<GeocodeHit> {
    let url = format!("{}/search", base_url.trim_end_matches('/'));
    let query = [
        ("q", address.to_string()),
        ("format", "jsonv2".to_string()),
        ("addressdetails", "1".to_string()),
        ("limit", "1".to_string()),
    ];
    match gateway.get_text(&url, &query, DEFAULT_TIMEOUT).await {
        Ok(body) => parse_search(&url, &body, address),
        Err(err) => err.into_result(SOURCE),
    }
}

pub async fn reverse(
    gateway: &HttpGateway,
    base_url: &str,
    lat: f64,
    lon: f64,
    zoom: u8,
) -> SourceResult<ReverseGeocode> {
    let url = format!("{}/reverse", base_url.trim_end_matches('/'));
    let query = [
        ("lat", lat.to_string()),
        ("lon", lon.to_string()),
        ("zoom", zoom.to_string()),
        ("format", "jsonv2".to_string()),
        ("addressdetails", "1".to_string()),
        ("extratags", "1".to_string()),
    ];
    match gateway.get_text(&url, &query, DEFAULT_TIMEOUT).await {
        Ok(body) => parse_reverse(&url, &body),
        Err(err) => err.into_result(SOURCE),
    }
}

pub fn parse_search(url: &str, body: &str, address: &str) -> SourceResult<GeocodeHit> {
    let places: Vec<Place> = match decode_json(url, body) {
        Ok(places) => places,
        Err(err) => return err.into_result(SOURCE),
    };
    let Some(place) = places.into_iter().next() else {
        return SourceResult::failed(
            SOURCE,
            FailureKind::NotFound,
            format!("no results for '{address}'"),
        );
    };
    match coordinates(&place) {
        Some((lat, lon)) => SourceResult::ok(
            SOURCE,
            GeocodeHit {
                lat,
                lon,
                display_name: place.display_name.clone(),
                address: place.address.as_ref().map(string_fields),
            },
        ),
        None => SourceResult::failed(
            SOURCE,
            FailureKind::InvalidResponse,
            format!("unparseable coordinates '{}', '{}'", place.lat, place.lon),
        ),
    }
}

pub fn parse_reverse(url: &str, body: &str) -> SourceResult<ReverseGeocode> {
    match decode_json::<ReverseBody>(url, body) {
        Ok(ReverseBody::Error { error }) => {
            SourceResult::failed(SOURCE, FailureKind::NotFound, error)
        }
        Ok(ReverseBody::Place(place)) => SourceResult::ok(
            SOURCE,
            ReverseGeocode {
                display_name: place.display_name,
                address: place.address.as_ref().map(string_fields).unwrap_or_default(),
                wikidata: place
                    .extratags
                    .as_ref()
                    .and_then(|tags| tags.get("wikidata"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
        ),
        Err(err) => err.into_result(SOURCE),
    }
}

fn coordinates(place: &Place) -> Option<(f64, f64)> {
    let lat = place.lat.trim().parse::<f64>().ok()?;
    let lon = place.lon.trim().parse::<f64>().ok()?;
    (lat.is_finite() && lon.is_finite()).then_some((lat, lon))
}

/// Address details are documented as strings; anything else is dropped.
fn string_fields(raw: &BTreeMap<String, serde_json::Value>) -> Address {
    raw.iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}
