//! Per-location data bundle used by comparison reports.

use crate::coords::Coords;
use crate::geo::round_to;
use crate::limitations::entries_for;
use crate::sources::{AirQuality, CityStats, FloodRisk, ReverseGeocode, SourceResult};
use crate::tool::ToolOutput;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LocationBundle {
    pub label: String,
    pub coords: Coords,
    pub reverse: SourceResult<ReverseGeocode>,
    pub stats: SourceResult<CityStats>,
    pub air: SourceResult<AirQuality>,
    pub flood: SourceResult<FloodRisk>,
    /// Inhabitants per km², only when both inputs are known.
    pub population_density: Option<f64>,
}

impl LocationBundle {
    pub fn new(
        label: impl Into<String>,
        mut coords: Coords,
        reverse: SourceResult<ReverseGeocode>,
        stats: SourceResult<CityStats>,
        air: SourceResult<AirQuality>,
        flood: SourceResult<FloodRisk>,
    ) -> Self {
        if let Some(place) = reverse.data() {
            coords.fill_missing(Some(place.display_name.as_str()), Some(&place.address));
        }
        let population_density = stats
            .data()
            .and_then(|s| population_density(s.population, s.area_km2));
        Self {
            label: label.into(),
            coords,
            reverse,
            stats,
            air,
            flood,
            population_density,
        }
    }

    /// Limitation entries for this location, prefixed with its label.
    pub fn limitations(&self) -> Vec<String> {
        [
            ToolOutput::ReverseGeocode(self.reverse.clone()),
            ToolOutput::CityStats(self.stats.clone()),
            ToolOutput::AirQuality(self.air.clone()),
            ToolOutput::FloodRisk(self.flood.clone()),
        ]
        .iter()
        .flat_map(entries_for)
        .map(|entry| format!("{}: {}", self.label, entry))
        .collect()
    }
}

/// `population / area_km2` rounded to two decimals; `None` unless both are
/// present and the area is positive.
pub fn population_density(population: Option<f64>, area_km2: Option<f64>) -> Option<f64> {
    match (population, area_km2) {
        (Some(population), Some(area)) if area > 0.0 && population.is_finite() => {
            Some(round_to(population / area, 2))
        }
        _ => None,
    }
}
