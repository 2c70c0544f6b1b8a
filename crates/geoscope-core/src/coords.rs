use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structured address components keyed by the upstream field name
/// (`road`, `city`, `postcode`, ...).
pub type Address = BTreeMap<String, String>;

/// The best-known location for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coords {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

impl Coords {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            display_name: None,
            address: None,
        }
    }

    /// Fill descriptive fields that are still unknown. Values already set are
    /// never replaced, and empty inputs are ignored.
    pub fn fill_missing(&mut self, display_name: Option<&str>, address: Option<&Address>) {
        if self.display_name.is_none() {
            if let Some(name) = display_name.map(str::trim).filter(|n| !n.is_empty()) {
                self.display_name = Some(name.to_string());
            }
        }
        if self.address.is_none() {
            if let Some(address) = address.filter(|a| !a.is_empty()) {
                self.address = Some(address.clone());
            }
        }
    }

    /// Best guess at the municipality name from the address components.
    pub fn locality(&self) -> Option<&str> {
        let address = self.address.as_ref()?;
        ["city", "town", "village", "municipality", "county"]
            .iter()
            .find_map(|key| address.get(*key))
            .map(String::as_str)
    }

    /// Short `lat, lon` hint used in prompts.
    pub fn hint(&self) -> String {
        match &self.display_name {
            Some(name) => format!("lat={:.6}, lon={:.6} ({})", self.lat, self.lon, name),
            None => format!("lat={:.6}, lon={:.6}", self.lat, self.lon),
        }
    }
}

pub fn valid_lat(lat: f64) -> bool {
    lat.is_finite() && (-90.0..=90.0).contains(&lat)
}

pub fn valid_lon(lon: f64) -> bool {
    lon.is_finite() && (-180.0..=180.0).contains(&lon)
}
