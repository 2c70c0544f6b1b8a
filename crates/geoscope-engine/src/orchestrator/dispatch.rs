//! Executes one batch of model tool calls against the data sources.

use super::session::SessionState;
use crate::llm::ToolCallMessage;
use crate::tools::{parse_arguments, ToolArgs};
use geoscope_core::protocol::CityQuery;
use geoscope_core::request::{MAX_RADIUS_M, MIN_RADIUS_M};
use geoscope_core::{
    FailureKind, GeoSources, ReportError, SourceId, SourceResult, StartingPoint, ToolName,
    ToolOutput,
};

/// Calls beyond this many in one turn are answered with an error.
pub const MAX_CALLS_PER_BATCH: usize = 12;
/// Upper bound the Wikipedia geosearch accepts.
const MAX_EVENTS_RADIUS_M: u32 = 10_000;
const MAX_WEATHER_YEARS: u32 = 30;

/// Fully resolved arguments for one adapter call.
#[derive(Debug, Clone)]
struct Invocation {
    tool: ToolName,
    lat: f64,
    lon: f64,
    radius_m: u32,
    years: u32,
    entity_id: Option<String>,
    name: Option<String>,
}

enum Planned {
    Answered(String),
    Geocode(ToolArgs),
    Located(ToolName, ToolArgs),
}

/// Run `calls` and return `(call_id, content)` pairs in request order.
///
/// Geocode calls run first so that later calls in the same batch see the
/// resolved coordinates; the rest run concurrently. Fails only when an
/// address-started run learns that its address cannot be geocoded.
pub async fn run_batch(
    sources: &dyn GeoSources,
    state: &mut SessionState,
    calls: &[ToolCallMessage],
) -> Result<Vec<(String, String)>, ReportError> {
    let mut planned: Vec<Planned> = calls
        .iter()
        .enumerate()
        .map(|(index, call)| plan(state, index, call))
        .collect();

    for slot in planned.iter_mut() {
        if let Planned::Geocode(args) = slot {
            let content = geocode(sources, state, args).await?;
            *slot = Planned::Answered(content);
        }
    }

    let mut invocations = Vec::new();
    for (index, slot) in planned.iter_mut().enumerate() {
        let Planned::Located(tool, args) = slot else {
            continue;
        };
        let tool = *tool;
        match resolve(state, tool, args) {
            Some(invocation) => invocations.push((index, invocation)),
            None => {
                let content = state.defer(
                    tool.as_str(),
                    "coordinates are not known yet; call geocode_address first",
                );
                *slot = Planned::Answered(content);
            }
        }
    }

    let outputs = futures::future::join_all(
        invocations
            .into_iter()
            .map(|(index, invocation)| async move {
                let at = (invocation.lat, invocation.lon);
                (index, at, invoke(sources, invocation).await)
            }),
    )
    .await;
    for (index, (lat, lon), output) in outputs {
        let content = output.to_message_content();
        state.record_at(output, lat, lon);
        planned[index] = Planned::Answered(content);
    }

    Ok(calls
        .iter()
        .zip(planned)
        .map(|(call, slot)| {
            let content = match slot {
                Planned::Answered(content) => content,
                // Every slot was answered above.
                Planned::Geocode(_) | Planned::Located(..) => {
                    serde_json::json!({ "ok": false, "error": "tool call was not executed" })
                        .to_string()
                }
            };
            (call.id.clone(), content)
        })
        .collect())
}

fn plan(state: &mut SessionState, index: usize, call: &ToolCallMessage) -> Planned {
    let name = call.function.name.as_str();
    if index >= MAX_CALLS_PER_BATCH {
        return Planned::Answered(state.reject(
            name,
            &format!("too many tool calls in one turn; at most {MAX_CALLS_PER_BATCH} are executed"),
        ));
    }
    let Some(tool) = ToolName::parse(name) else {
        return Planned::Answered(state.reject(name, &format!("unknown tool '{name}'")));
    };
    match parse_arguments(tool, &call.function.arguments) {
        Ok(args) if tool == ToolName::Geocode => Planned::Geocode(args),
        Ok(args) => Planned::Located(tool, args),
        Err(reason) => Planned::Answered(state.reject(tool.as_str(), &reason)),
    }
}

async fn geocode(
    sources: &dyn GeoSources,
    state: &mut SessionState,
    args: &ToolArgs,
) -> Result<String, ReportError> {
    let start_address = match &state.start {
        StartingPoint::Address(address) => Some(address.clone()),
        StartingPoint::Coordinates(_) => None,
    };

    // Once the run's address is resolved, repeat calls reuse the stored hit.
    if start_address.is_some() && state.coords.is_some() {
        if let Some(stored) = state.result(ToolName::Geocode).filter(|o| o.failure().is_none()) {
            tracing::debug!("geocode already resolved; reusing stored result");
            return Ok(stored.to_message_content());
        }
    }

    let Some(address) = args.address.clone().or_else(|| start_address.clone()) else {
        return Ok(state.reject(ToolName::Geocode.as_str(), "address is required"));
    };

    tracing::debug!(tool = %ToolName::Geocode, address = %address, "dispatching tool call");
    let output = ToolOutput::Geocode(sources.geocode(&address).await);

    if start_address.is_some() && state.coords.is_none() {
        if let Some(failure) = output.failure().filter(|f| f.kind == FailureKind::NotFound) {
            return Err(ReportError::GeocodingFailed {
                address,
                reason: failure.error.clone(),
            });
        }
    }

    let content = output.to_message_content();
    state.record(output);
    Ok(content)
}

/// Fill arguments the model left out from the session. `None` while the
/// run has no coordinates.
fn resolve(state: &SessionState, tool: ToolName, args: &ToolArgs) -> Option<Invocation> {
    let coords = state.coords.as_ref()?;
    let radius_cap = match tool {
        ToolName::HistoricalEvents => MAX_EVENTS_RADIUS_M,
        _ => MAX_RADIUS_M,
    };
    let radius_m = args
        .radius_m
        .map(|r| (r.round() as i64).clamp(MIN_RADIUS_M as i64, radius_cap as i64) as u32)
        .unwrap_or(state.radius_m);

    let (entity_id, name) = if tool == ToolName::CityStats {
        (
            args.entity_id
                .clone()
                .or_else(|| state.place_entity().map(str::to_string)),
            args.name
                .clone()
                .or_else(|| coords.locality().map(str::to_string)),
        )
    } else {
        (None, None)
    };

    Some(Invocation {
        tool,
        lat: args.lat.unwrap_or(coords.lat),
        lon: args.lon.unwrap_or(coords.lon),
        radius_m,
        years: args
            .years
            .unwrap_or(state.weather_years)
            .clamp(1, MAX_WEATHER_YEARS),
        entity_id,
        name,
    })
}

async fn invoke(sources: &dyn GeoSources, call: Invocation) -> ToolOutput {
    tracing::debug!(tool = %call.tool, lat = call.lat, lon = call.lon, "dispatching tool call");
    let (tool, lat, lon) = (call.tool, call.lat, call.lon);
    match tool {
        // Geocode calls take the address path and never reach here.
        ToolName::Geocode => ToolOutput::Geocode(SourceResult::failed(
            SourceId::Nominatim,
            FailureKind::InvalidResponse,
            "geocode_address needs an address",
        )),
        ToolName::ReverseGeocode => {
            ToolOutput::ReverseGeocode(sources.reverse_geocode(lat, lon).await)
        }
        ToolName::Infrastructure => {
            ToolOutput::Infrastructure(sources.infrastructure(lat, lon, call.radius_m).await)
        }
        ToolName::FloodRisk => ToolOutput::FloodRisk(sources.flood_risk(lat, lon).await),
        ToolName::CityStats => ToolOutput::CityStats(
            sources
                .city_stats(CityQuery {
                    entity_id: call.entity_id,
                    name: call.name,
                    lat,
                    lon,
                })
                .await,
        ),
        ToolName::AirQuality => ToolOutput::AirQuality(sources.air_quality(lat, lon).await),
        ToolName::WeatherHistory => {
            ToolOutput::WeatherHistory(sources.weather_history(lat, lon, call.years).await)
        }
        ToolName::HistoricalEvents => ToolOutput::HistoricalEvents(
            sources.historical_events(lat, lon, call.radius_m).await,
        ),
    }
}
