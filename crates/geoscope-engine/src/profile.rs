//! Report profiles: which tools a report must call, which headings it must
//! carry, how many model turns it gets and which sources it cites.

use geoscope_core::response::SourceRef;
use geoscope_core::{StartingPoint, ToolName};
use std::fmt;
use std::str::FromStr;

/// Model turns allowed for reports that gather data through tools.
pub const TOOL_PROFILE_MAX_STEPS: usize = 6;
/// Model turns allowed for a single-shot composition.
pub const COMPOSITION_MAX_STEPS: usize = 2;

const NOMINATIM: SourceRef = SourceRef {
    name: "OpenStreetMap Nominatim",
    url: "https://nominatim.openstreetmap.org",
};
const OVERPASS: SourceRef = SourceRef {
    name: "OpenStreetMap Overpass API",
    url: "https://overpass-api.de",
};
const FLOOD_MAPS: SourceRef = SourceRef {
    name: "MITECO SNCZI flood-zone maps",
    url: "https://sig.mapama.gob.es/geoportal/",
};
const WIKIDATA: SourceRef = SourceRef {
    name: "Wikidata",
    url: "https://www.wikidata.org",
};
const AIR_QUALITY: SourceRef = SourceRef {
    name: "Open-Meteo Air Quality API",
    url: "https://open-meteo.com/en/docs/air-quality-api",
};
const WEATHER_ARCHIVE: SourceRef = SourceRef {
    name: "Open-Meteo Historical Weather API",
    url: "https://open-meteo.com/en/docs/historical-weather-api",
};
const WIKIPEDIA: SourceRef = SourceRef {
    name: "Wikipedia",
    url: "https://www.wikipedia.org",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportProfile {
    Urban,
    City,
    History,
    Compare,
}

/// Fixed contract of one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSpec {
    /// Tools that must be called at least once when the run starts from
    /// coordinates.
    pub mandatory: &'static [ToolName],
    /// Level-2 headings the final Markdown must contain.
    pub headings: &'static [&'static str],
    pub max_steps: usize,
    pub sources: &'static [SourceRef],
    /// What the report should concentrate on, for the system prompt.
    pub focus: &'static str,
}

impl ReportProfile {
    /// Profiles that run the tool-calling loop.
    pub const TOOL_PROFILES: [ReportProfile; 3] =
        [ReportProfile::Urban, ReportProfile::City, ReportProfile::History];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportProfile::Urban => "urban",
            ReportProfile::City => "city",
            ReportProfile::History => "history",
            ReportProfile::Compare => "compare",
        }
    }

    pub fn spec(&self) -> ProfileSpec {
        match self {
            ReportProfile::Urban => ProfileSpec {
                mandatory: &[
                    ToolName::ReverseGeocode,
                    ToolName::Infrastructure,
                    ToolName::FloodRisk,
                ],
                headings: &[
                    "Summary",
                    "Location",
                    "Infrastructure",
                    "Flood Risk",
                    "Recommendations",
                    "Limitations",
                ],
                max_steps: TOOL_PROFILE_MAX_STEPS,
                sources: &[NOMINATIM, OVERPASS, FLOOD_MAPS],
                focus: "urban suitability: services within walking distance, transport access, green space and exposure to flooding",
            },
            ReportProfile::City => ProfileSpec {
                mandatory: &[
                    ToolName::ReverseGeocode,
                    ToolName::CityStats,
                    ToolName::AirQuality,
                ],
                headings: &[
                    "Summary",
                    "Location",
                    "Demographics",
                    "Air Quality",
                    "Limitations",
                ],
                max_steps: TOOL_PROFILE_MAX_STEPS,
                sources: &[NOMINATIM, WIKIDATA, AIR_QUALITY],
                focus: "the municipality as a whole: population, size, density and current air quality",
            },
            ReportProfile::History => ProfileSpec {
                mandatory: &[
                    ToolName::ReverseGeocode,
                    ToolName::WeatherHistory,
                    ToolName::HistoricalEvents,
                ],
                headings: &[
                    "Summary",
                    "Location",
                    "Climate Extremes",
                    "Historical Events",
                    "Limitations",
                ],
                max_steps: TOOL_PROFILE_MAX_STEPS,
                sources: &[NOMINATIM, WEATHER_ARCHIVE, WIKIPEDIA],
                focus: "the recent climate record and the documented history of the surroundings",
            },
            ReportProfile::Compare => ProfileSpec {
                mandatory: &[],
                headings: &[
                    "Overview",
                    "Location A",
                    "Location B",
                    "Comparison",
                    "Limitations",
                ],
                max_steps: COMPOSITION_MAX_STEPS,
                sources: &[NOMINATIM, WIKIDATA, AIR_QUALITY, FLOOD_MAPS],
                focus: "a side-by-side comparison of two locations",
            },
        }
    }
}

impl ProfileSpec {
    /// Mandatory tools for a run starting at `start`; address starts must
    /// geocode first.
    pub fn mandatory_for(&self, start: &StartingPoint) -> Vec<ToolName> {
        let mut tools = Vec::with_capacity(self.mandatory.len() + 1);
        if matches!(start, StartingPoint::Address(_)) && !self.mandatory.is_empty() {
            tools.push(ToolName::Geocode);
        }
        tools.extend_from_slice(self.mandatory);
        tools
    }

    /// Tools declared to the model: mandatory ones first, then every other
    /// tool as optional. Compositions declare none.
    pub fn declared_tools(&self) -> Vec<ToolName> {
        if self.mandatory.is_empty() {
            return Vec::new();
        }
        let mut tools = vec![ToolName::Geocode];
        tools.extend(self.mandatory.iter().copied().filter(|t| *t != ToolName::Geocode));
        let optional: Vec<ToolName> = ToolName::ALL
            .into_iter()
            .filter(|t| !tools.contains(t))
            .collect();
        tools.extend(optional);
        tools
    }
}

impl fmt::Display for ReportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urban" => Ok(ReportProfile::Urban),
            "city" => Ok(ReportProfile::City),
            "history" => Ok(ReportProfile::History),
            "compare" => Ok(ReportProfile::Compare),
            other => Err(format!(
                "unknown report profile '{other}' (expected urban, city, history or compare)"
            )),
        }
    }
}
