use crate::sources::{
    AirQuality, CityStats, FloodRisk, GeocodeHit, HistoricalEvents, Infrastructure,
    ReverseGeocode, SourceResult, WeatherHistory,
};
use std::future::Future;
use std::pin::Pin;

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = SourceResult<T>> + Send + 'a>>;

/// Lookup hints for city statistics, tried in priority order:
/// entity id, then name, then proximity to the point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CityQuery {
    pub entity_id: Option<String>,
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// The upstream data sources the engine orchestrates.
///
/// Implementations must never panic or return errors out-of-band: every
/// outcome is a tagged [`SourceResult`].
pub trait GeoSources: Send + Sync {
    fn geocode<'a>(&'a self, address: &'a str) -> SourceFuture<'a, GeocodeHit>;

    fn reverse_geocode(&self, lat: f64, lon: f64) -> SourceFuture<'_, ReverseGeocode>;

    fn infrastructure(&self, lat: f64, lon: f64, radius_m: u32)
        -> SourceFuture<'_, Infrastructure>;

    fn flood_risk(&self, lat: f64, lon: f64) -> SourceFuture<'_, FloodRisk>;

    fn city_stats(&self, query: CityQuery) -> SourceFuture<'_, CityStats>;

    fn air_quality(&self, lat: f64, lon: f64) -> SourceFuture<'_, AirQuality>;

    fn weather_history(&self, lat: f64, lon: f64, years: u32) -> SourceFuture<'_, WeatherHistory>;

    fn historical_events(
        &self,
        lat: f64,
        lon: f64,
        radius_m: u32,
    ) -> SourceFuture<'_, HistoricalEvents>;
}
