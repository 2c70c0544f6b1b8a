//! [`GeoSources`] backed by the public HTTP services.

use crate::config::Config;
use crate::fetch::HttpGateway;
use crate::{air_quality, flood, nominatim, overpass, weather, wikidata, wikipedia};
use anyhow::Context;
use geoscope_core::protocol::CityQuery;
use geoscope_core::sources::{
    AirQuality, CityStats, FloodRisk, GeocodeHit, HistoricalEvents, Infrastructure,
    ReverseGeocode, WeatherHistory,
};
use geoscope_core::{GeoSources, SourceFuture, SourceId, SourceResult};
use std::time::Duration;

/// Street-level detail for the reverse-geocode tool.
const REVERSE_ZOOM: u8 = 18;
/// Neighbourhood level, enough for the flood fallback heuristics.
const FALLBACK_ZOOM: u8 = 16;
const OVERPASS_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(2);

pub struct HttpSources {
    gateway: HttpGateway,
    config: Config,
    overpass_pause: Duration,
}

impl HttpSources {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let gateway =
            HttpGateway::new(&config.user_agent).context("Failed to create HTTP client")?;
        Ok(Self {
            gateway,
            config,
            overpass_pause: OVERPASS_RATE_LIMIT_PAUSE,
        })
    }

    pub fn with_overpass_pause(mut self, pause: Duration) -> Self {
        self.overpass_pause = pause;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn flood_with_fallback(&self, lat: f64, lon: f64) -> SourceResult<FloodRisk> {
        let reason = match flood::query_wms(
            &self.gateway,
            &self.config.flood_wms_url,
            self.config.flood_layer_hint.as_deref(),
            lat,
            lon,
        )
        .await
        {
            Ok(risk) => return SourceResult::ok(SourceId::FloodWms, risk),
            Err(reason) => reason,
        };

        tracing::warn!(reason = %reason, "flood map service unusable; using reverse-geocode fallback");
        match nominatim::reverse(&self.gateway, &self.config.nominatim_url, lat, lon, FALLBACK_ZOOM)
            .await
        {
            SourceResult::Ok { data, .. } => {
                SourceResult::ok(SourceId::FloodWms, flood::fallback_from_place(&data, &reason))
            }
            SourceResult::Failed(failure) => SourceResult::failed(
                SourceId::FloodWms,
                failure.kind,
                format!(
                    "flood map service unusable ({reason}) and the fallback failed: {}",
                    failure.error
                ),
            ),
        }
    }
}

impl GeoSources for HttpSources {
    fn geocode<'a>(&'a self, address: &'a str) -> SourceFuture<'a, GeocodeHit> {
        Box::pin(nominatim::geocode(
            &self.gateway,
            &self.config.nominatim_url,
            address,
        ))
    }

    fn reverse_geocode(&self, lat: f64, lon: f64) -> SourceFuture<'_, ReverseGeocode> {
        Box::pin(nominatim::reverse(
            &self.gateway,
            &self.config.nominatim_url,
            lat,
            lon,
            REVERSE_ZOOM,
        ))
    }

    fn infrastructure(
        &self,
        lat: f64,
        lon: f64,
        radius_m: u32,
    ) -> SourceFuture<'_, Infrastructure> {
        Box::pin(overpass::infrastructure(
            &self.gateway,
            &self.config.overpass_endpoints,
            lat,
            lon,
            radius_m,
            self.overpass_pause,
        ))
    }

    fn flood_risk(&self, lat: f64, lon: f64) -> SourceFuture<'_, FloodRisk> {
        Box::pin(self.flood_with_fallback(lat, lon))
    }

    fn city_stats(&self, query: CityQuery) -> SourceFuture<'_, CityStats> {
        Box::pin(async move {
            let endpoints = wikidata::Endpoints {
                site: &self.config.wikidata_url,
                sparql: &self.config.wikidata_sparql_url,
                language: &self.config.wikipedia_language,
            };
            wikidata::city_stats(&self.gateway, &endpoints, &query).await
        })
    }

    fn air_quality(&self, lat: f64, lon: f64) -> SourceFuture<'_, AirQuality> {
        Box::pin(air_quality::air_quality(
            &self.gateway,
            &self.config.air_quality_url,
            lat,
            lon,
        ))
    }

    fn weather_history(&self, lat: f64, lon: f64, years: u32) -> SourceFuture<'_, WeatherHistory> {
        Box::pin(weather::weather_history(
            &self.gateway,
            &self.config.weather_archive_url,
            lat,
            lon,
            years,
        ))
    }

    fn historical_events(
        &self,
        lat: f64,
        lon: f64,
        radius_m: u32,
    ) -> SourceFuture<'_, HistoricalEvents> {
        Box::pin(async move {
            let endpoint = self.config.wikipedia_endpoint();
            wikipedia::historical_events(
                &self.gateway,
                &endpoint,
                &self.config.wikipedia_language,
                lat,
                lon,
                radius_m,
            )
            .await
        })
    }
}
