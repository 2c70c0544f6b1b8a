//! Tool declarations presented to the model and argument parsing for the
//! calls it makes.

use geoscope_core::coords::{valid_lat, valid_lon};
use geoscope_core::ToolName;
use serde::{Deserialize, Serialize};
use serde_json::json;

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Tool definitions for the LLM
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: serde_json::Value,
}

/// Declarations for `tools`, in the order given.
pub fn tool_definitions(tools: &[ToolName]) -> Vec<ToolDefinition> {
    tools.iter().map(|tool| definition(*tool)).collect()
}

fn definition(tool: ToolName) -> ToolDefinition {
    let (description, parameters) = match tool {
        ToolName::Geocode => (
            "Resolve a postal address or place name to coordinates. Call this first when the request names an address.",
            object_schema(
                json!({
                    "address": {"type": "string", "description": "Address or place name to geocode"}
                }),
                &["address"],
            ),
        ),
        ToolName::ReverseGeocode => (
            "Describe the place at a coordinate: display name and address parts (street, city, region, country).",
            object_schema(point_properties(), &[]),
        ),
        ToolName::Infrastructure => (
            "Count nearby infrastructure from OpenStreetMap (education, health, transport, green space, retail, safety, culture) within a radius, with the nearest examples.",
            object_schema(
                with_radius(point_properties(), "Search radius in metres (100-5000)"),
                &[],
            ),
        ),
        ToolName::FloodRisk => (
            "Check whether a coordinate lies inside a mapped flood zone. May return a low-confidence estimate when the flood map service is unavailable.",
            object_schema(point_properties(), &[]),
        ),
        ToolName::CityStats => (
            "Population, area, density and elevation of the municipality containing a coordinate, from Wikidata.",
            object_schema(
                {
                    let mut props = point_properties();
                    props["entity_id"] = json!({"type": "string", "description": "Wikidata item id such as Q8818, when known"});
                    props["name"] = json!({"type": "string", "description": "Municipality name to search for"});
                    props
                },
                &[],
            ),
        ),
        ToolName::AirQuality => (
            "Current air quality at a coordinate: European AQI with its band, PM10, PM2.5, NO2 and ozone.",
            object_schema(point_properties(), &[]),
        ),
        ToolName::WeatherHistory => (
            "Daily weather extremes over recent years at a coordinate: hottest, coldest, wettest and windiest days, and heavy-rain day counts.",
            object_schema(
                {
                    let mut props = point_properties();
                    props["years"] = json!({"type": "integer", "minimum": 1, "maximum": 30, "description": "Number of past years to summarise"});
                    props
                },
                &[],
            ),
        ),
        ToolName::HistoricalEvents => (
            "Notable places and historical events documented on Wikipedia near a coordinate.",
            object_schema(
                with_radius(point_properties(), "Search radius in metres (max 10000)"),
                &[],
            ),
        ),
    };

    ToolDefinition {
        tool_type: "function",
        function: FunctionDefinition {
            name: tool.as_str(),
            description,
            parameters,
        },
    }
}

fn point_properties() -> serde_json::Value {
    json!({
        "lat": {"type": "number", "minimum": -90, "maximum": 90, "description": "Latitude in decimal degrees; defaults to the report location"},
        "lon": {"type": "number", "minimum": -180, "maximum": 180, "description": "Longitude in decimal degrees; defaults to the report location"}
    })
}

fn with_radius(mut props: serde_json::Value, description: &str) -> serde_json::Value {
    props["radius_m"] = json!({"type": "number", "description": description});
    props
}

fn object_schema(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

// ═══════════════════════════════════════════════════════════════════════════
//  ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════════

/// Parsed arguments of one call. Fields a tool does not accept stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub radius_m: Option<f64>,
    pub years: Option<u32>,
    pub entity_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GeocodeArgs {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PointArgs {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RadiusArgs {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    radius_m: Option<f64>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CityStatsArgs {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WeatherArgs {
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lon: Option<f64>,
    #[serde(default)]
    years: Option<u32>,
}

/// Parse the JSON argument string of a call to `tool`.
pub fn parse_arguments(tool: ToolName, raw: &str) -> Result<ToolArgs, String> {
    let raw = match raw.trim() {
        "" | "null" => "{}",
        trimmed => trimmed,
    };
    let args = match tool {
        ToolName::Geocode => {
            let a: GeocodeArgs = decode(raw)?;
            ToolArgs {
                address: a
                    .address
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                ..ToolArgs::default()
            }
        }
        ToolName::ReverseGeocode | ToolName::FloodRisk | ToolName::AirQuality => {
            let a: PointArgs = decode(raw)?;
            ToolArgs {
                lat: a.lat,
                lon: a.lon,
                ..ToolArgs::default()
            }
        }
        ToolName::Infrastructure | ToolName::HistoricalEvents => {
            let a: RadiusArgs = decode(raw)?;
            ToolArgs {
                lat: a.lat,
                lon: a.lon,
                radius_m: a.radius_m,
                ..ToolArgs::default()
            }
        }
        ToolName::CityStats => {
            let a: CityStatsArgs = decode(raw)?;
            ToolArgs {
                lat: a.lat,
                lon: a.lon,
                entity_id: a.entity_id.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                name: a.name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
                ..ToolArgs::default()
            }
        }
        ToolName::WeatherHistory => {
            let a: WeatherArgs = decode(raw)?;
            ToolArgs {
                lat: a.lat,
                lon: a.lon,
                years: a.years,
                ..ToolArgs::default()
            }
        }
    };

    if args.lat.is_some_and(|lat| !valid_lat(lat)) {
        return Err("lat must be between -90 and 90".to_string());
    }
    if args.lon.is_some_and(|lon| !valid_lon(lon)) {
        return Err("lon must be between -180 and 180".to_string());
    }
    if args.radius_m.is_some_and(|r| !r.is_finite() || r <= 0.0) {
        return Err("radius_m must be a positive number".to_string());
    }
    Ok(args)
}

fn decode<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, String> {
    serde_json::from_str(raw).map_err(|err| format!("Invalid arguments: {err}"))
}
