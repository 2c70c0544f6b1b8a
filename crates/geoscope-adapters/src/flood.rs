//! Flood-zone lookup against a WMS service.
//!
//! Flow: GetCapabilities, pick a queryable layer, then try GetFeatureInfo
//! over several version / CRS axis order / info format combinations until one
//! answers with something that is not a service exception. When the service
//! cannot answer at all, [`fallback_from_place`] derives a low-confidence
//! estimate from a reverse geocode.

use crate::fetch::{HttpGateway, HEAVY_TIMEOUT};
use geoscope_core::geo::bbox_around;
use geoscope_core::sources::{FloodRisk, ReverseGeocode};
use regex::Regex;

const PREFERRED_FORMATS: &[&str] = &[
    "application/json",
    "application/geo+json",
    "application/vnd.ogc.gml",
    "text/xml",
    "text/plain",
    "text/html",
];

/// Half side of the GetFeatureInfo bounding box.
const PROBE_HALF_SIDE_M: f64 = 50.0;
const PROBE_SIZE_PX: u32 = 101;

const WATER_KEYWORDS: &[&str] = &[
    "river", "rio", "riu", "rambla", "barranco", "barranc", "arroyo", "torrent", "canal",
    "acequia", "sequia", "beach", "playa", "platja", "coast", "costa", "port", "puerto",
    "harbour", "lake", "lago", "estany", "marsh", "marjal", "albufera", "delta", "estuary",
    "ria", "wetland", "embalse",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub version: Option<String>,
    pub queryable_layers: Vec<String>,
    pub info_formats: Vec<String>,
}

/// Axis handling for one GetFeatureInfo attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    /// 1.3.0 with EPSG:4326, lat/lon axis order, I/J pixel params.
    V130LatLon,
    /// 1.3.0 with CRS:84, lon/lat axis order.
    V130Crs84,
    /// 1.1.1 with EPSG:4326, lon/lat axis order, X/Y pixel params.
    V111,
}

impl Variant {
    fn version(&self) -> &'static str {
        match self {
            Variant::V130LatLon | Variant::V130Crs84 => "1.3.0",
            Variant::V111 => "1.1.1",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInfo {
    pub in_zone: bool,
    pub label: Option<String>,
}

/// Query the WMS. `Err` carries the reason the service could not answer,
/// for use as the fallback reason.
pub async fn query_wms(
    gateway: &HttpGateway,
    wms_url: &str,
    layer_hint: Option<&str>,
    lat: f64,
    lon: f64,
) -> Result<FloodRisk, String> {
    let capabilities_query = [
        ("SERVICE", "WMS".to_string()),
        ("REQUEST", "GetCapabilities".to_string()),
    ];
    let xml = gateway
        .get_text(wms_url, &capabilities_query, HEAVY_TIMEOUT)
        .await
        .map_err(|e| format!("capabilities unavailable: {e}"))?;
    let capabilities = parse_capabilities(&xml);
    let layer = choose_layer(&capabilities.queryable_layers, layer_hint)
        .ok_or_else(|| "no queryable layer advertised".to_string())?;

    let formats = candidate_formats(&capabilities.info_formats);
    let mut variants = vec![Variant::V130LatLon, Variant::V130Crs84, Variant::V111];
    if capabilities.version.as_deref() == Some("1.1.1") {
        variants.rotate_left(2);
    }

    let mut last_reason = "no GetFeatureInfo attempt produced a usable answer".to_string();
    for variant in variants {
        for format in &formats {
            let query = feature_info_query(variant, &layer, format, lat, lon);
            let body = match gateway.get_text(wms_url, &query, HEAVY_TIMEOUT).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::debug!(version = variant.version(), format = %format, error = %err, "GetFeatureInfo failed");
                    last_reason = err.to_string();
                    continue;
                }
            };
            match interpret_feature_info(&body, format) {
                Some(info) => {
                    return Ok(FloodRisk {
                        layer: Some(layer.clone()),
                        in_flood_zone: Some(info.in_zone),
                        zone_label: info.label,
                        near_water: None,
                        fallback_used: false,
                        fallback_reason: None,
                        wms_version: Some(variant.version().to_string()),
                        info_format: Some(format.clone()),
                    });
                }
                None => {
                    last_reason = format!(
                        "unusable GetFeatureInfo answer ({} {})",
                        variant.version(),
                        format
                    );
                }
            }
        }
    }
    Err(last_reason)
}

/// Low-confidence estimate from the place around the point.
pub fn fallback_from_place(place: &ReverseGeocode, reason: &str) -> FloodRisk {
    let mut haystack = fold(&place.display_name);
    for value in place.address.values() {
        haystack.push(' ');
        haystack.push_str(&fold(value));
    }
    let words: Vec<&str> = haystack
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let near_water = WATER_KEYWORDS.iter().any(|k| words.contains(k));

    FloodRisk {
        layer: None,
        in_flood_zone: None,
        zone_label: None,
        near_water: Some(near_water),
        fallback_used: true,
        fallback_reason: Some(reason.to_string()),
        wms_version: None,
        info_format: None,
    }
}

fn fold(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'Á' | 'À' => 'a',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' => 'e',
            'í' | 'ì' | 'ï' | 'Í' | 'Ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'Ó' | 'Ò' => 'o',
            'ú' | 'ù' | 'ü' | 'Ú' | 'Ü' => 'u',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn parse_capabilities(xml: &str) -> Capabilities {
    let version = Regex::new(r#"<(?:WMS_Capabilities|WMT_MS_Capabilities)[^>]*\bversion="([^"]+)""#)
        .ok()
        .and_then(|re| re.captures(xml))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let mut queryable_layers = Vec::new();
    if let (Ok(layer_re), Ok(name_re)) = (
        Regex::new(r#"<Layer\b[^>]*\bqueryable="(?:1|true)"[^>]*>"#),
        Regex::new(r"<Name>\s*([^<]+?)\s*</Name>"),
    ) {
        for open_tag in layer_re.find_iter(xml) {
            let rest = &xml[open_tag.end()..];
            // The layer's own <Name> precedes any nested <Layer>.
            let own = rest.find("<Layer").map_or(rest, |end| &rest[..end]);
            if let Some(name) = name_re.captures(own).and_then(|c| c.get(1)) {
                queryable_layers.push(name.as_str().to_string());
            }
        }
    }

    let info_formats = Regex::new(r"(?s)<GetFeatureInfo>(.*?)</GetFeatureInfo>")
        .ok()
        .and_then(|re| re.captures(xml))
        .and_then(|c| c.get(1))
        .map(|section| {
            section
                .as_str()
                .split("<Format>")
                .skip(1)
                .filter_map(|chunk| chunk.split("</Format>").next())
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Capabilities {
        version,
        queryable_layers,
        info_formats,
    }
}

fn choose_layer(layers: &[String], hint: Option<&str>) -> Option<String> {
    hint.and_then(|hint| {
        let hint = hint.to_lowercase();
        layers.iter().find(|l| l.to_lowercase().contains(&hint))
    })
    .or_else(|| layers.first())
    .cloned()
}

/// Preferred formats the service advertises, or every preferred format
/// when it advertises none.
fn candidate_formats(advertised: &[String]) -> Vec<String> {
    let matching: Vec<String> = PREFERRED_FORMATS
        .iter()
        .filter(|f| advertised.iter().any(|a| a.starts_with(*f)))
        .map(|f| f.to_string())
        .collect();
    if matching.is_empty() {
        PREFERRED_FORMATS.iter().map(|f| f.to_string()).collect()
    } else {
        matching
    }
}

fn feature_info_query(
    variant: Variant,
    layer: &str,
    format: &str,
    lat: f64,
    lon: f64,
) -> Vec<(&'static str, String)> {
    let (min_lat, min_lon, max_lat, max_lon) = bbox_around(lat, lon, PROBE_HALF_SIDE_M);
    let center = (PROBE_SIZE_PX / 2).to_string();
    let mut query = vec![
        ("SERVICE", "WMS".to_string()),
        ("REQUEST", "GetFeatureInfo".to_string()),
        ("VERSION", variant.version().to_string()),
        ("LAYERS", layer.to_string()),
        ("QUERY_LAYERS", layer.to_string()),
        ("STYLES", String::new()),
        ("WIDTH", PROBE_SIZE_PX.to_string()),
        ("HEIGHT", PROBE_SIZE_PX.to_string()),
        ("INFO_FORMAT", format.to_string()),
        ("FEATURE_COUNT", "5".to_string()),
    ];
    match variant {
        Variant::V130LatLon => {
            query.push(("CRS", "EPSG:4326".to_string()));
            query.push(("BBOX", format!("{min_lat},{min_lon},{max_lat},{max_lon}")));
            query.push(("I", center.clone()));
            query.push(("J", center));
        }
        Variant::V130Crs84 => {
            query.push(("CRS", "CRS:84".to_string()));
            query.push(("BBOX", format!("{min_lon},{min_lat},{max_lon},{max_lat}")));
            query.push(("I", center.clone()));
            query.push(("J", center));
        }
        Variant::V111 => {
            query.push(("SRS", "EPSG:4326".to_string()));
            query.push(("BBOX", format!("{min_lon},{min_lat},{max_lon},{max_lat}")));
            query.push(("X", center.clone()));
            query.push(("Y", center));
        }
    }
    query
}

/// `None` for service exceptions and bodies that say nothing either way.
pub fn interpret_feature_info(body: &str, format: &str) -> Option<FeatureInfo> {
    let trimmed = body.trim();
    if trimmed.is_empty()
        || trimmed.contains("ServiceException")
        || trimmed.contains("ExceptionReport")
    {
        return None;
    }

    if format.contains("json") {
        let value: serde_json::Value = serde_json::from_str(trimmed).ok()?;
        let features = value.get("features")?.as_array()?;
        let label = features
            .first()
            .and_then(|f| f.get("properties"))
            .and_then(|p| p.as_object())
            .and_then(|props| {
                props
                    .values()
                    .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()))
            })
            .map(str::to_string);
        return Some(FeatureInfo {
            in_zone: !features.is_empty(),
            label,
        });
    }

    if format.contains("xml") || format.contains("gml") {
        let has_feature = trimmed.contains("featureMember")
            || trimmed.contains("_feature>")
            || trimmed.contains("<FIELDS");
        let is_collection = trimmed.contains("FeatureCollection")
            || trimmed.contains("FeatureInfoResponse")
            || trimmed.contains("msGMLOutput");
        return (has_feature || is_collection).then_some(FeatureInfo {
            in_zone: has_feature,
            label: None,
        });
    }

    if format.starts_with("text/plain") {
        let lower = trimmed.to_lowercase();
        if lower.contains("no features") || lower.contains("no results") {
            return Some(FeatureInfo {
                in_zone: false,
                label: None,
            });
        }
        let in_zone = lower.contains("feature") && trimmed.contains('=');
        return in_zone.then(|| FeatureInfo {
            in_zone,
            label: trimmed
                .lines()
                .find(|l| l.contains('='))
                .map(|l| l.trim().to_string()),
        });
    }

    if format.starts_with("text/html") {
        let lower = trimmed.to_lowercase();
        if lower.contains("<td") {
            return Some(FeatureInfo {
                in_zone: true,
                label: None,
            });
        }
        return lower.contains("<body").then_some(FeatureInfo {
            in_zone: false,
            label: None,
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms">
  <Capability>
    <Request>
      <GetMap><Format>image/png</Format></GetMap>
      <GetFeatureInfo>
        <Format>text/html</Format>
        <Format>application/vnd.ogc.gml</Format>
        <Format>text/plain</Format>
      </GetFeatureInfo>
    </Request>
    <Layer>
      <Title>Zonas inundables</Title>
      <Layer queryable="0"><Name>Limites</Name></Layer>
      <Layer queryable="1" opaque="0">
        <Name>NZ.RiskZone.Q10</Name>
        <Title>Periodo de retorno 10</Title>
      </Layer>
      <Layer queryable="1">
        <Name>NZ.RiskZone.Q100</Name>
        <Title>Periodo de retorno 100</Title>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

    #[test]
    fn test_capabilities_lists_queryable_layers() {
        let caps = parse_capabilities(CAPABILITIES);
        assert_eq!(caps.version.as_deref(), Some("1.3.0"));
        assert_eq!(caps.queryable_layers, vec!["NZ.RiskZone.Q10", "NZ.RiskZone.Q100"]);
        assert_eq!(
            caps.info_formats,
            vec!["text/html", "application/vnd.ogc.gml", "text/plain"]
        );
    }

    #[test]
    fn test_layer_hint_beats_order() {
        let caps = parse_capabilities(CAPABILITIES);
        assert_eq!(
            choose_layer(&caps.queryable_layers, Some("q100")).as_deref(),
            Some("NZ.RiskZone.Q100")
        );
        assert_eq!(
            choose_layer(&caps.queryable_layers, Some("T500")).as_deref(),
            Some("NZ.RiskZone.Q10")
        );
        assert_eq!(choose_layer(&[], None), None);
    }

    #[test]
    fn test_formats_follow_preference_order() {
        let caps = parse_capabilities(CAPABILITIES);
        assert_eq!(
            candidate_formats(&caps.info_formats),
            vec!["application/vnd.ogc.gml", "text/plain", "text/html"]
        );
        assert_eq!(candidate_formats(&[]).len(), PREFERRED_FORMATS.len());
    }

    #[test]
    fn test_axis_order_per_variant() {
        let lat_lon = feature_info_query(Variant::V130LatLon, "L", "text/plain", 39.0, -0.5);
        let bbox = &lat_lon.iter().find(|(k, _)| *k == "BBOX").unwrap().1;
        assert!(bbox.starts_with("38.99"));

        let legacy = feature_info_query(Variant::V111, "L", "text/plain", 39.0, -0.5);
        assert!(legacy.iter().any(|(k, v)| *k == "SRS" && v == "EPSG:4326"));
        assert!(legacy.iter().any(|(k, _)| *k == "X"));
        let bbox = &legacy.iter().find(|(k, _)| *k == "BBOX").unwrap().1;
        assert!(bbox.starts_with("-0.50"));
    }

    #[test]
    fn test_exception_is_unusable() {
        let body = r#"<ServiceExceptionReport><ServiceException code="InvalidFormat"/></ServiceExceptionReport>"#;
        assert_eq!(interpret_feature_info(body, "text/xml"), None);
        assert_eq!(interpret_feature_info("  ", "text/plain"), None);
    }

    #[test]
    fn test_gml_with_and_without_members() {
        let hit = r#"<msGMLOutput><NZ_layer><NZ_feature><gml:boundedBy/></NZ_feature></NZ_layer></msGMLOutput>"#;
        assert_eq!(
            interpret_feature_info(hit, "application/vnd.ogc.gml").map(|i| i.in_zone),
            Some(true)
        );
        let miss = r#"<msGMLOutput xmlns:gml="http://www.opengis.net/gml"></msGMLOutput>"#;
        assert_eq!(
            interpret_feature_info(miss, "application/vnd.ogc.gml").map(|i| i.in_zone),
            Some(false)
        );
    }

    #[test]
    fn test_geojson_label_from_properties() {
        let body = r#"{"type":"FeatureCollection","features":[{"properties":{"id":4,"zona":"Q100 - alta probabilidad"}}]}"#;
        let info = interpret_feature_info(body, "application/json").unwrap();
        assert!(info.in_zone);
        assert_eq!(info.label.as_deref(), Some("Q100 - alta probabilidad"));

        let empty = r#"{"type":"FeatureCollection","features":[]}"#;
        assert!(!interpret_feature_info(empty, "application/json").unwrap().in_zone);
    }

    #[test]
    fn test_plain_text_answers() {
        let none = "GetFeatureInfo results:\n\nSearch returned no results.";
        assert!(!interpret_feature_info(none, "text/plain").unwrap().in_zone);

        let some = "GetFeatureInfo results:\n\nLayer 'Q100'\n  Feature 12:\n    ZONA = 'Q100'\n";
        let info = interpret_feature_info(some, "text/plain").unwrap();
        assert!(info.in_zone);
        assert_eq!(info.label.as_deref(), Some("ZONA = 'Q100'"));
    }

    #[test]
    fn test_fallback_detects_water_words() {
        let place = ReverseGeocode {
            display_name: "Carrer del Riu, Pinedo, València".to_string(),
            address: BTreeMap::new(),
            wikidata: None,
        };
        let risk = fallback_from_place(&place, "capabilities unavailable");
        assert!(risk.fallback_used);
        assert_eq!(risk.near_water, Some(true));
        assert_eq!(risk.in_flood_zone, None);
        assert_eq!(risk.fallback_reason.as_deref(), Some("capabilities unavailable"));

        let dry = ReverseGeocode {
            display_name: "Calle Mayor, Teruel".to_string(),
            address: [("suburb".to_string(), "Centro".to_string())].into_iter().collect(),
            wikidata: None,
        };
        assert_eq!(fallback_from_place(&dry, "x").near_water, Some(false));
    }
}
