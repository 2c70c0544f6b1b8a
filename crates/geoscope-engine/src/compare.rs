//! Two-location comparison: prefetch both bundles in parallel, then compose.

use crate::assembly;
use crate::llm::models::Usage;
use crate::llm::ChatModel;
use crate::orchestrator::compose;
use crate::profile::ReportProfile;
use crate::prompts;
use geoscope_core::compare::LocationBundle;
use geoscope_core::protocol::CityQuery;
use geoscope_core::response::CompareResponse;
use geoscope_core::{
    Coords, FailureKind, GeoSources, LocationInput, ReportError, StartingPoint,
};

/// Resolve one side of a comparison and fetch its data.
///
/// Unlike the report loop there is no model to retry geocoding, so any
/// geocode failure ends the comparison.
pub async fn gather(
    sources: &dyn GeoSources,
    label: &str,
    input: &LocationInput,
) -> Result<LocationBundle, ReportError> {
    let (coords, locality) = match input.request().starting_point()? {
        StartingPoint::Coordinates(coords) => (coords, None),
        StartingPoint::Address(address) => {
            let result = sources.geocode(&address).await;
            match result.data() {
                Some(hit) => {
                    let mut coords = Coords::new(hit.lat, hit.lon);
                    coords.fill_missing(Some(&hit.display_name), hit.address.as_ref());
                    let locality = coords.locality().map(str::to_string);
                    (coords, locality)
                }
                None => {
                    let reason = match result.failure() {
                        Some(failure) if failure.kind == FailureKind::NotFound => {
                            failure.error.clone()
                        }
                        Some(failure) => format!("geocoder unavailable: {}", failure.error),
                        None => "no result".to_string(),
                    };
                    return Err(ReportError::GeocodingFailed {
                        address: format!("{label}: {address}"),
                        reason,
                    });
                }
            }
        }
    };

    let (lat, lon) = (coords.lat, coords.lon);
    let (reverse, stats, air, flood) = futures::join!(
        sources.reverse_geocode(lat, lon),
        sources.city_stats(CityQuery {
            entity_id: None,
            name: locality,
            lat,
            lon,
        }),
        sources.air_quality(lat, lon),
        sources.flood_risk(lat, lon),
    );
    for failure in [reverse.failure(), stats.failure(), air.failure(), flood.failure()]
        .into_iter()
        .flatten()
    {
        tracing::warn!(location = label, source = failure.source.as_str(), error = %failure.error, "comparison source failed");
    }

    Ok(LocationBundle::new(label, coords, reverse, stats, air, flood))
}

pub async fn run_compare(
    model: &dyn ChatModel,
    sources: &dyn GeoSources,
    a: &LocationInput,
    b: &LocationInput,
) -> Result<(CompareResponse, Option<Usage>), ReportError> {
    let (a, b) = futures::try_join!(gather(sources, "A", a), gather(sources, "B", b))?;

    let limitations = assembly::compare_limitations(&a, &b);
    let spec = ReportProfile::Compare.spec();
    let listed: Vec<String> = limitations.iter().map(str::to_string).collect();
    let user = prompts::compare_user(&bundle_json(&a), &bundle_json(&b), &listed);

    let (markdown, usage) = compose(
        model,
        prompts::compare_system(&spec),
        user,
        spec.headings,
        spec.max_steps,
    )
    .await?;

    Ok((assembly::compare_response(a, b, markdown, limitations), usage))
}

fn bundle_json(bundle: &LocationBundle) -> String {
    serde_json::to_string_pretty(bundle).unwrap_or_else(|err| {
        serde_json::json!({ "label": bundle.label, "error": err.to_string() }).to_string()
    })
}
