use crate::coords::{valid_lat, valid_lon, Coords};
use crate::error::ReportError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_RADIUS_M: u32 = 1_000;
pub const MIN_RADIUS_M: u32 = 100;
pub const MAX_RADIUS_M: u32 = 5_000;

/// Inbound report request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub radius_m: Option<f64>,
}

/// Where a run begins.
#[derive(Debug, Clone, PartialEq)]
pub enum StartingPoint {
    Coordinates(Coords),
    Address(String),
}

impl ReportRequest {
    pub fn at(lat: f64, lon: f64) -> Self {
        Self {
            lat: Some(lat),
            lon: Some(lon),
            ..Self::default()
        }
    }

    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = Some(radius_m);
        self
    }

    /// Resolve the starting point. Coordinates win over an address when both
    /// are present; a lone latitude or longitude is rejected.
    pub fn starting_point(&self) -> Result<StartingPoint, ReportError> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => {
                if !valid_lat(lat) {
                    return Err(ReportError::InvalidInput(format!(
                        "lat must be between -90 and 90 (got {lat})"
                    )));
                }
                if !valid_lon(lon) {
                    return Err(ReportError::InvalidInput(format!(
                        "lon must be between -180 and 180 (got {lon})"
                    )));
                }
                Ok(StartingPoint::Coordinates(Coords::new(lat, lon)))
            }
            (Some(_), None) | (None, Some(_)) => Err(ReportError::InvalidInput(
                "lat and lon must be provided together".to_string(),
            )),
            (None, None) => match self.address.as_deref().map(str::trim) {
                Some(address) if !address.is_empty() => {
                    Ok(StartingPoint::Address(address.to_string()))
                }
                _ => Err(ReportError::InvalidInput(
                    "either an address or lat/lon coordinates are required".to_string(),
                )),
            },
        }
    }

    /// Search radius clamped to the supported range.
    pub fn radius_m(&self) -> u32 {
        match self.radius_m {
            Some(r) if r.is_finite() => (r.round() as i64)
                .clamp(MIN_RADIUS_M as i64, MAX_RADIUS_M as i64) as u32,
            _ => DEFAULT_RADIUS_M,
        }
    }
}

/// One side of a comparison, given as `lat,lon` or free-text address.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationInput(pub ReportRequest);

impl LocationInput {
    /// Parse `"39.47,-0.37"` as coordinates; anything else is an address.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Some((lat, lon)) = trimmed.split_once(',') {
            if let (Ok(lat), Ok(lon)) = (lat.trim().parse::<f64>(), lon.trim().parse::<f64>()) {
                return LocationInput(ReportRequest::at(lat, lon));
            }
        }
        LocationInput(ReportRequest::for_address(trimmed))
    }

    pub fn request(&self) -> &ReportRequest {
        &self.0
    }
}
