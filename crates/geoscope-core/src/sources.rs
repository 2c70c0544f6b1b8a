//! Tagged results returned by the upstream adapters.
//!
//! Every adapter answers with a [`SourceResult`]: either the normalized payload
//! or a failure descriptor. Both serialize to the flat
//! `{ "ok": bool, "source": "<id>", ... }` shape that the model and API
//! consumers see.

use crate::coords::Address;
use serde::ser::{Error as _, SerializeMap};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Identifier of an upstream data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Nominatim,
    Overpass,
    FloodWms,
    Wikidata,
    OpenMeteoAir,
    OpenMeteoArchive,
    Wikipedia,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Nominatim => "nominatim",
            SourceId::Overpass => "overpass",
            SourceId::FloodWms => "flood_wms",
            SourceId::Wikidata => "wikidata",
            SourceId::OpenMeteoAir => "open_meteo_air",
            SourceId::OpenMeteoArchive => "open_meteo_archive",
            SourceId::Wikipedia => "wikipedia",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The upstream answered but had nothing for this query.
    NotFound,
    Timeout,
    /// Transport error or non-success status.
    Upstream,
    /// The upstream answered with a body we could not interpret.
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: SourceId,
    pub kind: FailureKind,
    pub error: String,
}

/// Normalized adapter result.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceResult<T> {
    Ok { source: SourceId, data: T },
    Failed(SourceFailure),
}

impl<T> SourceResult<T> {
    pub fn ok(source: SourceId, data: T) -> Self {
        SourceResult::Ok { source, data }
    }

    pub fn failed(source: SourceId, kind: FailureKind, error: impl Into<String>) -> Self {
        SourceResult::Failed(SourceFailure {
            source,
            kind,
            error: error.into(),
        })
    }

    pub fn source(&self) -> SourceId {
        match self {
            SourceResult::Ok { source, .. } => *source,
            SourceResult::Failed(failure) => failure.source,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            SourceResult::Ok { data, .. } => Some(data),
            SourceResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SourceFailure> {
        match self {
            SourceResult::Ok { .. } => None,
            SourceResult::Failed(failure) => Some(failure),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SourceResult::Ok { .. })
    }
}

impl<T: Serialize> Serialize for SourceResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SourceResult::Ok { source, data } => {
                let fields = match serde_json::to_value(data).map_err(S::Error::custom)? {
                    serde_json::Value::Object(fields) => fields,
                    other => {
                        let mut wrapped = serde_json::Map::new();
                        wrapped.insert("data".to_string(), other);
                        wrapped
                    }
                };
                let mut map = serializer.serialize_map(Some(fields.len() + 2))?;
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("source", source.as_str())?;
                for (key, value) in &fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            SourceResult::Failed(failure) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("source", failure.source.as_str())?;
                map.serialize_entry("error", &failure.error)?;
                map.serialize_entry("kind", &failure.kind)?;
                map.end()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocode {
    pub display_name: String,
    #[serde(default)]
    pub address: Address,
    /// Wikidata item of the matched place, when the upstream knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikidata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedFeature {
    pub name: String,
    pub kind: String,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InfrastructureCategory {
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nearest_m: Option<f64>,
    #[serde(default)]
    pub examples: Vec<NamedFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub radius_m: u32,
    /// Mirror that produced the answer.
    pub endpoint: String,
    pub total: u32,
    pub categories: BTreeMap<String, InfrastructureCategory>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FloodRisk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
    /// `None` when neither path could decide.
    pub in_flood_zone: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_label: Option<String>,
    /// Heuristic from the reverse-geocode fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_water: Option<bool>,
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wms_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_format: Option<String>,
}

/// Which step of the stats resolution chain produced the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsResolution {
    EntityId,
    NameSearch,
    Proximity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityStats {
    pub entity_id: String,
    pub label: String,
    pub population: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_date: Option<String>,
    pub area_km2: Option<f64>,
    /// Set when the area unit was missing or not recognised.
    pub area_estimated: bool,
    pub density_per_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_m: Option<f64>,
    pub resolved_by: StatsResolution,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AirQuality {
    pub time: String,
    pub european_aqi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<String>,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub ozone: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyExtreme {
    pub date: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherHistory {
    pub start_date: String,
    pub end_date: String,
    pub days: u32,
    pub hottest: Option<DailyExtreme>,
    pub coldest: Option<DailyExtreme>,
    pub wettest: Option<DailyExtreme>,
    pub windiest: Option<DailyExtreme>,
    /// Days with at least 50 mm of precipitation.
    pub heavy_rain_days: u32,
    pub mean_annual_precip_mm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub title: String,
    pub distance_m: f64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvents {
    pub radius_m: u32,
    pub language: String,
    pub items: Vec<HistoricalEvent>,
}
