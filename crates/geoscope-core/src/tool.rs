//! Tool names and the per-tool result slots held by a run.

use crate::sources::{
    AirQuality, CityStats, FloodRisk, GeocodeHit, HistoricalEvents, Infrastructure,
    ReverseGeocode, SourceFailure, SourceResult, WeatherHistory,
};
use serde::{Serialize, Serializer};

/// Every adapter the model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    Geocode,
    ReverseGeocode,
    Infrastructure,
    FloodRisk,
    CityStats,
    AirQuality,
    WeatherHistory,
    HistoricalEvents,
}

impl ToolName {
    pub const ALL: [ToolName; 8] = [
        ToolName::Geocode,
        ToolName::ReverseGeocode,
        ToolName::Infrastructure,
        ToolName::FloodRisk,
        ToolName::CityStats,
        ToolName::AirQuality,
        ToolName::WeatherHistory,
        ToolName::HistoricalEvents,
    ];

    /// Name exposed to the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Geocode => "geocode_address",
            ToolName::ReverseGeocode => "reverse_geocode",
            ToolName::Infrastructure => "get_infrastructure",
            ToolName::FloodRisk => "get_flood_risk",
            ToolName::CityStats => "get_city_stats",
            ToolName::AirQuality => "get_air_quality",
            ToolName::WeatherHistory => "get_weather_history",
            ToolName::HistoricalEvents => "get_historical_events",
        }
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        let name = name.trim();
        ToolName::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// Field name of this tool's result in the response object.
    pub fn result_key(&self) -> &'static str {
        match self {
            ToolName::Geocode => "geocode",
            ToolName::ReverseGeocode => "reverse",
            ToolName::Infrastructure => "urban",
            ToolName::FloodRisk => "flood",
            ToolName::CityStats => "stats",
            ToolName::AirQuality => "air",
            ToolName::WeatherHistory => "weather",
            ToolName::HistoricalEvents => "events",
        }
    }

    /// Human label used in limitations.
    pub fn label(&self) -> &'static str {
        match self {
            ToolName::Geocode => "Geocoding",
            ToolName::ReverseGeocode => "Reverse geocoding",
            ToolName::Infrastructure => "Infrastructure",
            ToolName::FloodRisk => "Flood risk",
            ToolName::CityStats => "City statistics",
            ToolName::AirQuality => "Air quality",
            ToolName::WeatherHistory => "Historical weather",
            ToolName::HistoricalEvents => "Historical events",
        }
    }

    pub fn needs_coordinates(&self) -> bool {
        !matches!(self, ToolName::Geocode)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ToolName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Last-seen result of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Geocode(SourceResult<GeocodeHit>),
    ReverseGeocode(SourceResult<ReverseGeocode>),
    Infrastructure(SourceResult<Infrastructure>),
    FloodRisk(SourceResult<FloodRisk>),
    CityStats(SourceResult<CityStats>),
    AirQuality(SourceResult<AirQuality>),
    WeatherHistory(SourceResult<WeatherHistory>),
    HistoricalEvents(SourceResult<HistoricalEvents>),
}

impl ToolOutput {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolOutput::Geocode(_) => ToolName::Geocode,
            ToolOutput::ReverseGeocode(_) => ToolName::ReverseGeocode,
            ToolOutput::Infrastructure(_) => ToolName::Infrastructure,
            ToolOutput::FloodRisk(_) => ToolName::FloodRisk,
            ToolOutput::CityStats(_) => ToolName::CityStats,
            ToolOutput::AirQuality(_) => ToolName::AirQuality,
            ToolOutput::WeatherHistory(_) => ToolName::WeatherHistory,
            ToolOutput::HistoricalEvents(_) => ToolName::HistoricalEvents,
        }
    }

    pub fn failure(&self) -> Option<&SourceFailure> {
        match self {
            ToolOutput::Geocode(r) => r.failure(),
            ToolOutput::ReverseGeocode(r) => r.failure(),
            ToolOutput::Infrastructure(r) => r.failure(),
            ToolOutput::FloodRisk(r) => r.failure(),
            ToolOutput::CityStats(r) => r.failure(),
            ToolOutput::AirQuality(r) => r.failure(),
            ToolOutput::WeatherHistory(r) => r.failure(),
            ToolOutput::HistoricalEvents(r) => r.failure(),
        }
    }

    /// Serialized JSON body sent back to the model.
    pub fn to_message_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            serde_json::json!({
                "ok": false,
                "error": format!("failed to encode {} result: {err}", self.tool()),
            })
            .to_string()
        })
    }
}
