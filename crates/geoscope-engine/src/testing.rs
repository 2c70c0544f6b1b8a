//! Scripted model and in-memory data sources for driving the engine in tests.

use crate::llm::models::Usage;
use crate::llm::{ChatModel, Message, ModelFuture, ModelReply, ToolCallMessage};
use crate::tools::ToolDefinition;
use geoscope_core::protocol::CityQuery;
use geoscope_core::sources::{
    AirQuality, CityStats, FloodRisk, GeocodeHit, HistoricalEvent, HistoricalEvents,
    Infrastructure, ReverseGeocode, StatsResolution, WeatherHistory,
};
use geoscope_core::{Address, GeoSources, SourceFuture, SourceId, SourceResult, ToolName};
use std::collections::VecDeque;
use std::sync::Mutex;

pub const VALENCIA: (f64, f64) = (39.4699, -0.3763);
pub const VALENCIA_ADDRESS: &str = "Plaza del Ayuntamiento, Valencia";

pub fn call(id: &str, tool: ToolName, arguments: &str) -> ToolCallMessage {
    ToolCallMessage::new(id, tool.as_str(), arguments)
}

/// Markdown carrying each heading with a line of body text.
pub fn report_with(headings: &[&str]) -> String {
    headings
        .iter()
        .map(|h| format!("## {h}\nFindings for {h}.\n"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replays canned replies in order and records every transcript it sees.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<anyhow::Result<ModelReply>>>,
    seen: Mutex<Vec<(Vec<Message>, usize)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(replies: Vec<anyhow::Result<ModelReply>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of completions requested so far.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Transcript passed to the `n`th completion.
    pub fn transcript(&self, n: usize) -> Vec<Message> {
        self.seen.lock().unwrap()[n].0.clone()
    }

    /// Tool declarations passed to the `n`th completion.
    pub fn declared_tools(&self, n: usize) -> usize {
        self.seen.lock().unwrap()[n].1
    }
}

impl ChatModel for ScriptedModel {
    fn complete<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ModelFuture<'a> {
        self.seen
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.len()));
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
        Box::pin(async move { next })
    }
}

pub fn usage(tokens: u32) -> Usage {
    Usage {
        prompt_tokens: tokens,
        completion_tokens: tokens,
        total_tokens: tokens * 2,
        cost: Some(0.001),
    }
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCall {
    pub tool: ToolName,
    pub lat: f64,
    pub lon: f64,
    pub detail: Option<String>,
}

/// Canned adapter answers, Valencia by default.
pub struct FakeSources {
    pub geocode: SourceResult<GeocodeHit>,
    pub reverse: SourceResult<ReverseGeocode>,
    pub infrastructure: SourceResult<Infrastructure>,
    pub flood: SourceResult<FloodRisk>,
    pub stats: SourceResult<CityStats>,
    pub air: SourceResult<AirQuality>,
    pub weather: SourceResult<WeatherHistory>,
    pub events: SourceResult<HistoricalEvents>,
    calls: Mutex<Vec<SourceCall>>,
}

impl FakeSources {
    pub fn valencia() -> Self {
        let (lat, lon) = VALENCIA;
        let mut address = Address::new();
        address.insert("city".to_string(), "València".to_string());
        address.insert("country".to_string(), "España".to_string());

        Self {
            geocode: SourceResult::ok(
                SourceId::Nominatim,
                GeocodeHit {
                    lat,
                    lon,
                    display_name: "Plaça de l'Ajuntament, València".to_string(),
                    address: Some(address.clone()),
                },
            ),
            reverse: SourceResult::ok(
                SourceId::Nominatim,
                ReverseGeocode {
                    display_name: "Plaça de l'Ajuntament, Ciutat Vella, València".to_string(),
                    address,
                    wikidata: Some("Q8818".to_string()),
                },
            ),
            infrastructure: SourceResult::ok(
                SourceId::Overpass,
                Infrastructure {
                    radius_m: 1000,
                    endpoint: "https://overpass-api.de/api/interpreter".to_string(),
                    total: 0,
                    categories: Default::default(),
                },
            ),
            flood: SourceResult::ok(
                SourceId::FloodWms,
                FloodRisk {
                    layer: Some("NZ.RiskZone".to_string()),
                    in_flood_zone: Some(false),
                    ..FloodRisk::default()
                },
            ),
            stats: SourceResult::ok(
                SourceId::Wikidata,
                CityStats {
                    entity_id: "Q8818".to_string(),
                    label: "Valencia".to_string(),
                    population: Some(807_693.0),
                    population_date: Some("2023-01-01".to_string()),
                    area_km2: Some(134.65),
                    area_estimated: false,
                    density_per_km2: Some(5998.46),
                    elevation_m: Some(15.0),
                    resolved_by: StatsResolution::EntityId,
                },
            ),
            air: SourceResult::ok(
                SourceId::OpenMeteoAir,
                AirQuality {
                    time: "2026-10-16T12:00".to_string(),
                    european_aqi: Some(32.0),
                    band: Some("fair".to_string()),
                    ..AirQuality::default()
                },
            ),
            weather: SourceResult::ok(
                SourceId::OpenMeteoArchive,
                WeatherHistory {
                    start_date: "2021-10-09".to_string(),
                    end_date: "2026-10-09".to_string(),
                    days: 1827,
                    hottest: None,
                    coldest: None,
                    wettest: None,
                    windiest: None,
                    heavy_rain_days: 4,
                    mean_annual_precip_mm: Some(454.2),
                },
            ),
            events: SourceResult::ok(
                SourceId::Wikipedia,
                HistoricalEvents {
                    radius_m: 1000,
                    language: "es".to_string(),
                    items: vec![HistoricalEvent {
                        title: "Lonja de la Seda".to_string(),
                        distance_m: 412.3,
                        url: "https://es.wikipedia.org/?curid=2".to_string(),
                    }],
                },
            ),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, tool: ToolName) -> usize {
        self.calls().iter().filter(|c| c.tool == tool).count()
    }

    fn log(&self, tool: ToolName, lat: f64, lon: f64, detail: Option<String>) {
        self.calls.lock().unwrap().push(SourceCall {
            tool,
            lat,
            lon,
            detail,
        });
    }
}

fn ready<'a, T: Send + 'a>(result: SourceResult<T>) -> SourceFuture<'a, T> {
    Box::pin(async move { result })
}

impl GeoSources for FakeSources {
    fn geocode<'a>(&'a self, address: &'a str) -> SourceFuture<'a, GeocodeHit> {
        self.log(ToolName::Geocode, f64::NAN, f64::NAN, Some(address.to_string()));
        ready(self.geocode.clone())
    }

    fn reverse_geocode(&self, lat: f64, lon: f64) -> SourceFuture<'_, ReverseGeocode> {
        self.log(ToolName::ReverseGeocode, lat, lon, None);
        ready(self.reverse.clone())
    }

    fn infrastructure(&self, lat: f64, lon: f64, radius_m: u32) -> SourceFuture<'_, Infrastructure> {
        self.log(ToolName::Infrastructure, lat, lon, Some(radius_m.to_string()));
        ready(self.infrastructure.clone())
    }

    fn flood_risk(&self, lat: f64, lon: f64) -> SourceFuture<'_, FloodRisk> {
        self.log(ToolName::FloodRisk, lat, lon, None);
        ready(self.flood.clone())
    }

    fn city_stats(&self, query: CityQuery) -> SourceFuture<'_, CityStats> {
        self.log(ToolName::CityStats, query.lat, query.lon, query.entity_id.clone());
        ready(self.stats.clone())
    }

    fn air_quality(&self, lat: f64, lon: f64) -> SourceFuture<'_, AirQuality> {
        self.log(ToolName::AirQuality, lat, lon, None);
        ready(self.air.clone())
    }

    fn weather_history(&self, lat: f64, lon: f64, years: u32) -> SourceFuture<'_, WeatherHistory> {
        self.log(ToolName::WeatherHistory, lat, lon, Some(years.to_string()));
        ready(self.weather.clone())
    }

    fn historical_events(
        &self,
        lat: f64,
        lon: f64,
        radius_m: u32,
    ) -> SourceFuture<'_, HistoricalEvents> {
        self.log(ToolName::HistoricalEvents, lat, lon, Some(radius_m.to_string()));
        ready(self.events.clone())
    }
}
