//! City statistics from Wikidata.
//!
//! Resolution chain: explicit entity id, then `wbsearchentities` by name,
//! then a SPARQL `wikibase:around` search near the point. The first entity
//! that carries a population or an area wins.

use crate::fetch::{FetchError, HttpGateway, DEFAULT_TIMEOUT};
use geoscope_core::compare::population_density;
use geoscope_core::geo::round_to;
use geoscope_core::protocol::CityQuery;
use geoscope_core::sources::{CityStats, StatsResolution};
use geoscope_core::{FailureKind, SourceId, SourceResult};
use serde_json::Value;

const SOURCE: SourceId = SourceId::Wikidata;
const MAX_NAME_CANDIDATES: usize = 3;
const PROXIMITY_RADIUS_KM: u32 = 15;

const POPULATION: &str = "P1082";
const POINT_IN_TIME: &str = "P585";
const AREA: &str = "P2046";
const ELEVATION: &str = "P2044";

pub struct Endpoints<'a> {
    /// Base of `Special:EntityData` and `w/api.php`.
    pub site: &'a str,
    pub sparql: &'a str,
    pub language: &'a str,
}

pub async fn city_stats(
    gateway: &HttpGateway,
    endpoints: &Endpoints<'_>,
    query: &CityQuery,
) -> SourceResult<CityStats> {
    let mut last_error: Option<FetchError> = None;

    if let Some(id) = query.entity_id.as_deref().filter(|id| is_entity_id(id)) {
        match fetch_stats(gateway, endpoints, id, StatsResolution::EntityId).await {
            Ok(Some(stats)) => return SourceResult::ok(SOURCE, stats),
            Ok(None) => tracing::debug!(entity = id, "entity has no population or area"),
            Err(err) => last_error = Some(err),
        }
    }

    if let Some(name) = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        match search_by_name(gateway, endpoints, name).await {
            Ok(candidates) => {
                for id in candidates.iter().take(MAX_NAME_CANDIDATES) {
                    match fetch_stats(gateway, endpoints, id, StatsResolution::NameSearch).await {
                        Ok(Some(stats)) => return SourceResult::ok(SOURCE, stats),
                        Ok(None) => {}
                        Err(err) => last_error = Some(err),
                    }
                }
            }
            Err(err) => last_error = Some(err),
        }
    }

    match search_nearby(gateway, endpoints, query.lat, query.lon).await {
        Ok(candidates) => {
            for id in &candidates {
                match fetch_stats(gateway, endpoints, id, StatsResolution::Proximity).await {
                    Ok(Some(stats)) => return SourceResult::ok(SOURCE, stats),
                    Ok(None) => {}
                    Err(err) => last_error = Some(err),
                }
            }
        }
        Err(err) => last_error = Some(err),
    }

    match last_error {
        Some(err) => err.into_result(SOURCE),
        None => SourceResult::failed(
            SOURCE,
            FailureKind::NotFound,
            "no Wikidata entity with population or area found for this location",
        ),
    }
}

async fn fetch_stats(
    gateway: &HttpGateway,
    endpoints: &Endpoints<'_>,
    id: &str,
    resolved_by: StatsResolution,
) -> Result<Option<CityStats>, FetchError> {
    let url = format!(
        "{}/wiki/Special:EntityData/{}.json",
        endpoints.site.trim_end_matches('/'),
        id
    );
    let body: Value = gateway.get_json(&url, &[], DEFAULT_TIMEOUT).await?;
    // Redirected ids come back under their target key.
    let entity = body
        .get("entities")
        .and_then(|e| e.get(id).or_else(|| e.as_object().and_then(|m| m.values().next())));
    Ok(entity.and_then(|entity| stats_from_entity(entity, endpoints.language, resolved_by)))
}

async fn search_by_name(
    gateway: &HttpGateway,
    endpoints: &Endpoints<'_>,
    name: &str,
) -> Result<Vec<String>, FetchError> {
    let url = format!("{}/w/api.php", endpoints.site.trim_end_matches('/'));
    let query = [
        ("action", "wbsearchentities".to_string()),
        ("search", name.to_string()),
        ("language", endpoints.language.to_string()),
        ("uselang", endpoints.language.to_string()),
        ("type", "item".to_string()),
        ("limit", "5".to_string()),
        ("format", "json".to_string()),
    ];
    let body: Value = gateway.get_json(&url, &query, DEFAULT_TIMEOUT).await?;
    Ok(parse_search_ids(&body))
}

async fn search_nearby(
    gateway: &HttpGateway,
    endpoints: &Endpoints<'_>,
    lat: f64,
    lon: f64,
) -> Result<Vec<String>, FetchError> {
    let query = [
        ("query", proximity_query(lat, lon)),
        ("format", "json".to_string()),
    ];
    let body: Value = gateway
        .get_json(endpoints.sparql, &query, DEFAULT_TIMEOUT)
        .await?;
    Ok(parse_sparql_ids(&body))
}

pub fn proximity_query(lat: f64, lon: f64) -> String {
    format!(
        r#"SELECT ?place ?dist WHERE {{
  SERVICE wikibase:around {{
    ?place wdt:P625 ?location .
    bd:serviceParam wikibase:center "Point({lon} {lat})"^^geo:wktLiteral .
    bd:serviceParam wikibase:radius "{PROXIMITY_RADIUS_KM}" .
    bd:serviceParam wikibase:distance ?dist .
  }}
  ?place wdt:{POPULATION} ?population .
  FILTER(?population > 1000)
}} ORDER BY ?dist LIMIT 5"#
    )
}

fn parse_search_ids(body: &Value) -> Vec<String> {
    body.get("search")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|h| h.get("id").and_then(Value::as_str))
                .filter(|id| is_entity_id(id))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_sparql_ids(body: &Value) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let bindings = body
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for binding in &bindings {
        let Some(uri) = binding.pointer("/place/value").and_then(Value::as_str) else {
            continue;
        };
        let id = uri.rsplit('/').next().unwrap_or(uri);
        if is_entity_id(id) && !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

fn is_entity_id(id: &str) -> bool {
    id.len() > 1
        && id.starts_with('Q')
        && id[1..].chars().all(|c| c.is_ascii_digit())
}

/// `None` when the entity has neither population nor area.
pub fn stats_from_entity(
    entity: &Value,
    language: &str,
    resolved_by: StatsResolution,
) -> Option<CityStats> {
    let id = entity.get("id").and_then(Value::as_str)?.to_string();
    let claims = entity.get("claims");
    let claims_for = |property: &str| -> Vec<Value> {
        claims
            .and_then(|c| c.get(property))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let population_claim = select_claim(&claims_for(POPULATION));
    let population = population_claim.as_ref().and_then(|c| quantity(c).map(|(v, _)| v));
    let population_date = population_claim
        .as_ref()
        .and_then(claim_date)
        .map(|d| d.display());

    let area = select_claim(&claims_for(AREA))
        .as_ref()
        .and_then(quantity)
        .map(|(amount, unit)| area_to_km2(amount, &unit));

    let elevation_m = select_claim(&claims_for(ELEVATION))
        .as_ref()
        .and_then(quantity)
        .map(|(amount, unit)| match unit_id(&unit) {
            Some("Q3710") => round_to(amount * 0.3048, 1),
            _ => amount,
        });

    if population.is_none() && area.is_none() {
        return None;
    }

    let label = [language, "en"]
        .iter()
        .find_map(|lang| {
            entity
                .get("labels")
                .and_then(|l| l.get(*lang))
                .and_then(|l| l.get("value"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());

    let area_km2 = area.map(|(km2, _)| round_to(km2, 2));
    Some(CityStats {
        entity_id: id,
        label,
        population,
        population_date,
        area_km2,
        area_estimated: area.is_some_and(|(_, estimated)| estimated),
        density_per_km2: population_density(population, area_km2),
        elevation_m,
        resolved_by,
    })
}

/// Calendar date of a time qualifier; month and day may be zero for
/// year or month precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClaimDate {
    year: i64,
    month: u32,
    day: u32,
}

impl ClaimDate {
    pub fn parse(raw: &str) -> Option<Self> {
        let (negative, rest) = match raw.as_bytes().first()? {
            b'+' => (false, &raw[1..]),
            b'-' => (true, &raw[1..]),
            _ => (false, raw),
        };
        let date = rest.split('T').next()?;
        let mut parts = date.splitn(3, '-');
        let year: i64 = parts.next()?.parse().ok()?;
        let month: u32 = parts.next().unwrap_or("0").parse().ok()?;
        let day: u32 = parts.next().unwrap_or("0").parse().ok()?;
        Some(Self {
            year: if negative { -year } else { year },
            month,
            day,
        })
    }

    pub fn display(&self) -> String {
        match (self.month, self.day) {
            (0, _) => self.year.to_string(),
            (m, 0) => format!("{}-{:02}", self.year, m),
            (m, d) => format!("{}-{:02}-{:02}", self.year, m, d),
        }
    }
}

fn claim_date(claim: &Value) -> Option<ClaimDate> {
    claim
        .get("qualifiers")
        .and_then(|q| q.get(POINT_IN_TIME))
        .and_then(Value::as_array)
        .and_then(|qs| {
            qs.iter().find_map(|q| {
                q.pointer("/datavalue/value/time")
                    .and_then(Value::as_str)
                    .and_then(ClaimDate::parse)
            })
        })
}

/// Latest dated claim; among equal dates the later claim wins. Undated
/// claims are used only when no claim is dated, preferring preferred rank.
pub fn select_claim(claims: &[Value]) -> Option<Value> {
    let usable: Vec<&Value> = claims
        .iter()
        .filter(|c| c.get("rank").and_then(Value::as_str) != Some("deprecated"))
        .filter(|c| quantity(c).is_some())
        .collect();

    let mut latest: Option<(ClaimDate, &Value)> = None;
    for claim in usable.iter().copied() {
        if let Some(date) = claim_date(claim) {
            if latest.as_ref().is_none_or(|(current, _)| date >= *current) {
                latest = Some((date, claim));
            }
        }
    }
    if let Some((_, claim)) = latest {
        return Some(claim.clone());
    }

    usable
        .iter()
        .find(|c| c.get("rank").and_then(Value::as_str) == Some("preferred"))
        .or_else(|| usable.last())
        .map(|c| (*c).clone())
}

/// `(amount, unit)` of a quantity claim.
fn quantity(claim: &Value) -> Option<(f64, String)> {
    let value = claim.pointer("/mainsnak/datavalue/value")?;
    let amount = match value.get("amount")? {
        Value::String(s) => s.trim_start_matches('+').parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    let unit = value
        .get("unit")
        .and_then(Value::as_str)
        .unwrap_or("1")
        .to_string();
    amount.is_finite().then_some((amount, unit))
}

fn unit_id(unit: &str) -> Option<&str> {
    unit.rsplit('/').next().filter(|id| is_entity_id(id))
}

/// Area in km² and whether the unit had to be guessed.
pub fn area_to_km2(amount: f64, unit: &str) -> (f64, bool) {
    match unit_id(unit) {
        Some("Q712226") => (amount, false),
        Some("Q25343") => (amount / 1_000_000.0, false),
        Some("Q35852") => (amount / 100.0, false),
        Some("Q232291") => (amount * 2.589_988_110_336, false),
        Some("Q81292") => (amount * 0.004_046_856_422_4, false),
        // Unitless or unknown: municipal areas above 100k are almost
        // certainly square metres.
        _ if amount > 100_000.0 => (amount / 1_000_000.0, true),
        _ => (amount, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quantity_claim(amount: &str, unit: &str, date: Option<&str>, rank: &str) -> Value {
        let mut claim = json!({
            "rank": rank,
            "mainsnak": {"datavalue": {"value": {"amount": amount, "unit": unit}}}
        });
        if let Some(date) = date {
            claim["qualifiers"] = json!({
                POINT_IN_TIME: [{"datavalue": {"value": {"time": date}}}]
            });
        }
        claim
    }

    const KM2: &str = "http://www.wikidata.org/entity/Q712226";

    #[test]
    fn test_latest_dated_claim_wins() {
        let claims = vec![
            quantity_claim("+791413", "1", Some("+2020-01-01T00:00:00Z"), "normal"),
            quantity_claim("+807693", "1", Some("+2023-01-01T00:00:00Z"), "normal"),
            quantity_claim("+800215", "1", Some("+2022-01-01T00:00:00Z"), "preferred"),
        ];
        let chosen = select_claim(&claims).unwrap();
        assert_eq!(quantity(&chosen).unwrap().0, 807_693.0);
    }

    #[test]
    fn test_equal_dates_take_the_later_claim() {
        let claims = vec![
            quantity_claim("+100", "1", Some("+2021-00-00T00:00:00Z"), "normal"),
            quantity_claim("+200", "1", Some("+2021-00-00T00:00:00Z"), "normal"),
        ];
        assert_eq!(quantity(&select_claim(&claims).unwrap()).unwrap().0, 200.0);
    }

    #[test]
    fn test_undated_prefers_preferred_rank_and_skips_deprecated() {
        let claims = vec![
            quantity_claim("+1", "1", None, "preferred"),
            quantity_claim("+2", "1", None, "normal"),
            quantity_claim("+3", "1", Some("+2024-01-01T00:00:00Z"), "deprecated"),
        ];
        assert_eq!(quantity(&select_claim(&claims).unwrap()).unwrap().0, 1.0);
    }

    #[test]
    fn test_area_units() {
        assert_eq!(area_to_km2(134.65, KM2), (134.65, false));
        assert_eq!(
            area_to_km2(2_000_000.0, "http://www.wikidata.org/entity/Q25343"),
            (2.0, false)
        );
        assert_eq!(
            area_to_km2(250.0, "http://www.wikidata.org/entity/Q35852"),
            (2.5, false)
        );
        let (sq_mi, estimated) = area_to_km2(1.0, "http://www.wikidata.org/entity/Q232291");
        assert!((sq_mi - 2.59).abs() < 0.01 && !estimated);
        assert_eq!(area_to_km2(42.0, "1"), (42.0, true));
        assert_eq!(area_to_km2(5_000_000.0, "1"), (5.0, true));
    }

    #[test]
    fn test_claim_date_precision() {
        assert_eq!(
            ClaimDate::parse("+2021-00-00T00:00:00Z").unwrap().display(),
            "2021"
        );
        assert_eq!(
            ClaimDate::parse("+2023-01-01T00:00:00Z").unwrap().display(),
            "2023-01-01"
        );
        assert!(ClaimDate::parse("+2021-00-00T00:00:00Z") < ClaimDate::parse("+2021-03-00T00:00:00Z"));
    }

    #[test]
    fn test_entity_to_stats() {
        let entity = json!({
            "id": "Q8818",
            "labels": {"es": {"language": "es", "value": "Valencia"}, "en": {"value": "Valencia"}},
            "claims": {
                POPULATION: [quantity_claim("+807693", "1", Some("+2023-01-01T00:00:00Z"), "normal")],
                AREA: [quantity_claim("+134.65", KM2, None, "normal")],
                ELEVATION: [quantity_claim("+15", "http://www.wikidata.org/entity/Q11573", None, "normal")]
            }
        });
        let stats = stats_from_entity(&entity, "es", StatsResolution::EntityId).unwrap();
        assert_eq!(stats.label, "Valencia");
        assert_eq!(stats.population, Some(807_693.0));
        assert_eq!(stats.population_date.as_deref(), Some("2023-01-01"));
        assert_eq!(stats.area_km2, Some(134.65));
        assert!(!stats.area_estimated);
        assert_eq!(stats.density_per_km2, Some(5998.46));
        assert_eq!(stats.elevation_m, Some(15.0));
    }

    #[test]
    fn test_entity_without_figures_is_skipped() {
        let entity = json!({"id": "Q1", "labels": {}, "claims": {}});
        assert!(stats_from_entity(&entity, "es", StatsResolution::Proximity).is_none());
    }

    #[test]
    fn test_label_falls_back_to_english_then_id() {
        let entity = json!({
            "id": "Q2807",
            "labels": {"en": {"value": "Madrid"}},
            "claims": {POPULATION: [quantity_claim("+3332035", "1", None, "normal")]}
        });
        let stats = stats_from_entity(&entity, "ca", StatsResolution::NameSearch).unwrap();
        assert_eq!(stats.label, "Madrid");
        assert_eq!(stats.density_per_km2, None);
    }

    #[test]
    fn test_search_and_sparql_ids() {
        let search = json!({"search": [{"id": "Q8818"}, {"id": "P31"}, {"id": "Q10"}]});
        assert_eq!(parse_search_ids(&search), vec!["Q8818", "Q10"]);

        let sparql = json!({"results": {"bindings": [
            {"place": {"value": "http://www.wikidata.org/entity/Q8818"}},
            {"place": {"value": "http://www.wikidata.org/entity/Q8818"}},
            {"place": {"value": "http://www.wikidata.org/entity/Q54880"}}
        ]}});
        assert_eq!(parse_sparql_ids(&sparql), vec!["Q8818", "Q54880"]);
    }

    #[test]
    fn test_proximity_query_uses_wkt_lon_lat() {
        let query = proximity_query(39.47, -0.376);
        assert!(query.contains("Point(-0.376 39.47)"));
        assert!(query.contains("wikibase:around"));
    }
}
