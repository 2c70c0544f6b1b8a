use super::*;
use crate::llm::{ModelReply, ToolCallMessage};
use crate::testing::{
    call, report_with, usage, FakeSources, ScriptedModel, VALENCIA, VALENCIA_ADDRESS,
};
use crate::Engine;
use geoscope_core::limitations::NO_ISSUES;
use geoscope_core::{FailureKind, SourceId, SourceResult, ToolName};
use std::sync::Arc;

fn engine(model: &Arc<ScriptedModel>, sources: &Arc<FakeSources>) -> Engine {
    Engine::new(model.clone(), sources.clone())
}

fn urban_text() -> String {
    report_with(ReportProfile::Urban.spec().headings)
}

fn urban_tools() -> ModelReply {
    ModelReply::tool_calls(vec![
        call("c1", ToolName::ReverseGeocode, "{}"),
        call("c2", ToolName::Infrastructure, "{}"),
        call("c3", ToolName::FloodRisk, "{}"),
    ])
}

fn last_user_message(model: &ScriptedModel, n: usize) -> String {
    model
        .transcript(n)
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

fn valencia_request() -> ReportRequest {
    ReportRequest::at(VALENCIA.0, VALENCIA.1).with_radius(1200.0)
}

#[tokio::test]
async fn test_coordinate_run_calls_every_mandatory_tool() {
    let model = Arc::new(ScriptedModel::new(vec![
        urban_tools(),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(response.coords.lat, 39.4699);
    assert_eq!(
        response.coords.display_name.as_deref(),
        Some("Plaça de l'Ajuntament, Ciutat Vella, València")
    );
    for key in ["reverse", "urban", "flood"] {
        assert!(response.results.contains_key(key), "missing {key}");
    }
    assert_eq!(sources.count(ToolName::ReverseGeocode), 1);
    assert_eq!(sources.count(ToolName::FloodRisk), 1);
    let infra = sources
        .calls()
        .into_iter()
        .find(|c| c.tool == ToolName::Infrastructure)
        .unwrap();
    assert_eq!(infra.detail.as_deref(), Some("1200"));
    assert_eq!(response.limitations, vec![NO_ISSUES.to_string()]);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_tool_results_are_paired_with_call_ids_in_order() {
    let model = Arc::new(ScriptedModel::new(vec![
        urban_tools(),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());
    engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    let transcript = model.transcript(1);
    let roles: Vec<_> = transcript.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "tool", "tool", "tool"]);
    assert_eq!(transcript[2].tool_calls.as_ref().map(Vec::len), Some(3));
    let ids: Vec<_> = transcript[3..]
        .iter()
        .map(|m| m.tool_call_id.as_deref().unwrap())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert!(transcript[5].content.as_deref().unwrap().contains("\"source\":\"flood_wms\""));
}

#[tokio::test]
async fn test_missing_mandatory_tool_triggers_corrective() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![call("c1", ToolName::ReverseGeocode, "{}")]),
        ModelReply::text(urban_text()),
        ModelReply::tool_calls(vec![
            call("c2", ToolName::Infrastructure, "{}"),
            call("c3", ToolName::FloodRisk, "{}"),
        ]),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(model.calls(), 4);
    let corrective = last_user_message(&model, 2);
    assert!(corrective.contains("get_infrastructure, get_flood_risk"));
    assert!(corrective.contains("lat=39.4699"));
}

#[tokio::test]
async fn test_missing_heading_triggers_corrective() {
    let incomplete = report_with(&["Summary", "Location", "Infrastructure", "Flood Risk"]);
    let model = Arc::new(ScriptedModel::new(vec![
        urban_tools(),
        ModelReply::text(incomplete),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert_eq!(model.calls(), 3);
    let corrective = last_user_message(&model, 2);
    assert!(corrective.contains("Recommendations, Limitations"));
    assert!(corrective.contains("## Flood Risk"));
    assert!(response.report_markdown.contains("## Recommendations"));
}

#[tokio::test]
async fn test_step_bound_is_a_server_error() {
    let mut replies = vec![urban_tools()];
    replies.extend((0..10).map(|_| ModelReply::text("## Summary\nstill drafting")));
    let model = Arc::new(ScriptedModel::new(replies));
    let sources = Arc::new(FakeSources::valencia());

    let err = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::StepBoundExceeded { steps: 6 }));
    assert_eq!(err.class().status(), 500);
    assert_eq!(model.calls(), 6);
}

#[tokio::test]
async fn test_address_run_geocodes_once() {
    let address_args = format!(r#"{{"address": "{VALENCIA_ADDRESS}"}}"#);
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![
            call("c1", ToolName::ReverseGeocode, "{}"),
            call("c2", ToolName::Geocode, &address_args),
        ]),
        ModelReply::tool_calls(vec![
            call("c3", ToolName::Geocode, &address_args),
            call("c4", ToolName::Infrastructure, "{}"),
            call("c5", ToolName::FloodRisk, "{}"),
        ]),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report(
            "cli",
            ReportProfile::Urban,
            &ReportRequest::for_address(VALENCIA_ADDRESS),
        )
        .await
        .unwrap();

    assert_eq!(sources.count(ToolName::Geocode), 1);
    assert_eq!(response.coords.lat, VALENCIA.0);
    assert!(response.results.contains_key("geocode"));
    for c in sources.calls().iter().filter(|c| c.tool != ToolName::Geocode) {
        assert_eq!((c.lat, c.lon), VALENCIA, "{:?} used other coordinates", c.tool);
    }
    // The repeat geocode was answered from the stored hit.
    let repeat = &model.transcript(2)[6];
    assert_eq!(repeat.tool_call_id.as_deref(), Some("c3"));
    assert!(repeat.content.as_deref().unwrap().contains("\"ok\":true"));
    assert_eq!(response.limitations, vec![NO_ISSUES.to_string()]);
}

#[tokio::test]
async fn test_unknown_address_is_unprocessable() {
    let model = Arc::new(ScriptedModel::new(vec![ModelReply::tool_calls(vec![
        call("c1", ToolName::FloodRisk, "{}"),
        call("c2", ToolName::Geocode, r#"{"address": "Calle Inexistente 999, Atlantis"}"#),
    ])]));
    let mut fake = FakeSources::valencia();
    fake.geocode = SourceResult::failed(SourceId::Nominatim, FailureKind::NotFound, "no results");
    let sources = Arc::new(fake);

    let err = engine(&model, &sources)
        .report(
            "cli",
            ReportProfile::Urban,
            &ReportRequest::for_address("Calle Inexistente 999, Atlantis"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::GeocodingFailed { .. }));
    assert_eq!(err.class().status(), 422);
    let calls = sources.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].tool, ToolName::Geocode);
}

#[tokio::test]
async fn test_coordinate_tools_wait_for_geocoding() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![call("c1", ToolName::FloodRisk, "{}")]),
        ModelReply::tool_calls(vec![
            call("c2", ToolName::Geocode, "{}"),
            call("c3", ToolName::ReverseGeocode, "{}"),
            call("c4", ToolName::Infrastructure, "{}"),
            call("c5", ToolName::FloodRisk, "{}"),
        ]),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report(
            "cli",
            ReportProfile::Urban,
            &ReportRequest::for_address(VALENCIA_ADDRESS),
        )
        .await
        .unwrap();

    let rejected = &model.transcript(1)[3];
    assert!(rejected
        .content
        .as_deref()
        .unwrap()
        .contains("call geocode_address first"));
    assert_eq!(sources.count(ToolName::FloodRisk), 1);
    // Geocode without an address argument falls back to the request address.
    assert_eq!(sources.calls()[0].detail.as_deref(), Some(VALENCIA_ADDRESS));
    // The early call succeeded once retried, so nothing is missing.
    assert_eq!(response.limitations, vec![NO_ISSUES.to_string()]);
}

#[tokio::test]
async fn test_transient_geocode_failure_asks_for_retry() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![call("c1", ToolName::Geocode, "{}")]),
        ModelReply::text(urban_text()),
    ]));
    let mut fake = FakeSources::valencia();
    fake.geocode = SourceResult::failed(
        SourceId::Nominatim,
        FailureKind::Timeout,
        "nominatim.openstreetmap.org timed out after 12s",
    );
    let sources = Arc::new(fake);

    let err = engine(&model, &sources)
        .report(
            "cli",
            ReportProfile::Urban,
            &ReportRequest::for_address(VALENCIA_ADDRESS),
        )
        .await
        .unwrap_err();

    // The third completion sees the corrective, then the script runs dry.
    assert!(matches!(err, ReportError::ModelProvider(_)));
    assert_eq!(model.calls(), 3);
    assert!(last_user_message(&model, 2).contains("geocode_address again"));
}

#[tokio::test]
async fn test_flood_failure_still_completes() {
    let model = Arc::new(ScriptedModel::new(vec![
        urban_tools(),
        ModelReply::text(urban_text()),
    ]));
    let mut fake = FakeSources::valencia();
    fake.flood = SourceResult::failed(SourceId::FloodWms, FailureKind::Upstream, "HTTP 503");
    let sources = Arc::new(fake);

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert!(response.ok);
    assert_eq!(response.limitations.len(), 1);
    assert!(response.limitations[0].starts_with("Flood risk"));
    assert!(response.limitations[0].contains("HTTP 503"));
}

#[tokio::test]
async fn test_flood_fallback_is_a_limitation() {
    let model = Arc::new(ScriptedModel::new(vec![
        urban_tools(),
        ModelReply::text(urban_text()),
    ]));
    let mut fake = FakeSources::valencia();
    fake.flood = SourceResult::ok(
        SourceId::FloodWms,
        geoscope_core::sources::FloodRisk {
            near_water: Some(true),
            fallback_used: true,
            fallback_reason: Some("capabilities unavailable".to_string()),
            ..Default::default()
        },
    );
    let sources = Arc::new(fake);

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert_eq!(response.limitations.len(), 1);
    assert!(response.limitations[0].contains("low confidence"));
}

#[tokio::test]
async fn test_repeat_call_overwrites_result() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![
            call("c1", ToolName::ReverseGeocode, "{}"),
            call("c2", ToolName::ReverseGeocode, r#"{"lat": 39.47, "lon": -0.377}"#),
            call("c3", ToolName::Infrastructure, "{}"),
            call("c4", ToolName::FloodRisk, "{}"),
        ]),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert_eq!(sources.count(ToolName::ReverseGeocode), 2);
    assert_eq!(response.results.len(), 3);
    let value = serde_json::to_value(&response).unwrap();
    assert!(value["reverse"].is_object());
}

#[tokio::test]
async fn test_bad_arguments_are_tagged_and_isolated() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![
            call("c1", ToolName::ReverseGeocode, r#"{"lat": 39.4"#),
            call("c2", ToolName::Infrastructure, "{}"),
            call("c3", ToolName::FloodRisk, "{}"),
            ToolCallMessage::new("c4", "get_weather_forecast", "{}"),
        ]),
        ModelReply::tool_calls(vec![call("c5", ToolName::ReverseGeocode, "{}")]),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    let first = model.transcript(1);
    assert!(first[3].content.as_deref().unwrap().contains("Invalid arguments"));
    assert!(first[4].content.as_deref().unwrap().contains("\"ok\":true"));
    assert!(first[6].content.as_deref().unwrap().contains("unknown tool"));
    assert_eq!(sources.count(ToolName::ReverseGeocode), 1);
    assert_eq!(response.limitations.len(), 2);
    assert!(response.limitations[0].starts_with("reverse_geocode call rejected"));
    assert!(response.limitations[1].starts_with("get_weather_forecast call rejected"));
}

#[tokio::test]
async fn test_batch_cap() {
    let calls = (0..13)
        .map(|i| call(&format!("c{i}"), ToolName::FloodRisk, "{}"))
        .collect();
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(calls),
        urban_tools(),
        ModelReply::text(urban_text()),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap();

    assert_eq!(sources.count(ToolName::FloodRisk), 13);
    let over = model.transcript(1)[15].content.clone().unwrap();
    assert!(over.contains("too many tool calls"));
    assert_eq!(response.limitations.len(), 1);
}

#[tokio::test]
async fn test_empty_completion_is_protocol_error() {
    let model = Arc::new(ScriptedModel::new(vec![ModelReply::default()]));
    let sources = Arc::new(FakeSources::valencia());

    let err = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &valencia_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::ModelProtocol(_)));
    assert!(sources.calls().is_empty());
}

#[tokio::test]
async fn test_refusal_is_protocol_error() {
    let model = Arc::new(ScriptedModel::new(vec![ModelReply {
        refusal: Some("I can't help with that".to_string()),
        ..ModelReply::default()
    }]));
    let sources = Arc::new(FakeSources::valencia());

    let err = engine(&model, &sources)
        .report("cli", ReportProfile::City, &valencia_request())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("refused"));
    assert_eq!(err.class().status(), 502);
}

#[tokio::test]
async fn test_provider_failure_is_upstream_error() {
    let model = Arc::new(ScriptedModel::with_results(vec![Err(anyhow::anyhow!(
        "Invalid API key"
    ))]));
    let sources = Arc::new(FakeSources::valencia());

    let err = engine(&model, &sources)
        .report("cli", ReportProfile::History, &valencia_request())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::ModelProvider(ref m) if m.contains("Invalid API key")));
}

#[tokio::test]
async fn test_city_stats_uses_entity_from_reverse() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![call("c1", ToolName::ReverseGeocode, "{}")]),
        ModelReply::tool_calls(vec![
            call("c2", ToolName::CityStats, "{}"),
            call("c3", ToolName::AirQuality, "{}"),
        ]),
        ModelReply::text(report_with(ReportProfile::City.spec().headings)),
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::City, &valencia_request())
        .await
        .unwrap();

    let stats = sources
        .calls()
        .into_iter()
        .find(|c| c.tool == ToolName::CityStats)
        .unwrap();
    assert_eq!(stats.detail.as_deref(), Some("Q8818"));
    assert_eq!(response.report_type, "city");
    assert!(response.results.contains_key("stats"));
    assert!(response.results.contains_key("air"));
}

#[tokio::test]
async fn test_reverse_of_another_point_does_not_relabel_location() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![call(
            "c1",
            ToolName::ReverseGeocode,
            r#"{"lat": 40.4168, "lon": -3.7038}"#,
        )]),
        ModelReply::tool_calls(vec![
            call("c2", ToolName::CityStats, "{}"),
            call("c3", ToolName::AirQuality, "{}"),
        ]),
        ModelReply::text(report_with(ReportProfile::City.spec().headings)),
    ]));
    let mut fake = FakeSources::valencia();
    if let SourceResult::Ok { data, .. } = &mut fake.reverse {
        data.display_name = "Puerta del Sol, Madrid".to_string();
        data.wikidata = Some("Q2807".to_string());
    }
    let sources = Arc::new(fake);

    let response = engine(&model, &sources)
        .report("cli", ReportProfile::City, &valencia_request())
        .await
        .unwrap();

    assert_eq!(response.coords.lat, VALENCIA.0);
    assert_eq!(response.coords.display_name, None);
    let stats = sources
        .calls()
        .into_iter()
        .find(|c| c.tool == ToolName::CityStats)
        .unwrap();
    assert_eq!(stats.detail, None);
}

#[tokio::test]
async fn test_weather_years_come_from_options() {
    let model = Arc::new(ScriptedModel::new(vec![
        ModelReply::tool_calls(vec![
            call("c1", ToolName::ReverseGeocode, "{}"),
            call("c2", ToolName::WeatherHistory, "{}"),
            call("c3", ToolName::HistoricalEvents, r#"{"radius_m": 8000}"#),
        ]),
        ModelReply {
            usage: Some(usage(100)),
            ..ModelReply::text(report_with(ReportProfile::History.spec().headings))
        },
    ]));
    let sources = Arc::new(FakeSources::valencia());

    let response = engine(&model, &sources)
        .with_options(RunOptions { weather_years: 3 })
        .report("cli", ReportProfile::History, &valencia_request())
        .await
        .unwrap();

    let details: Vec<_> = sources.calls().into_iter().filter_map(|c| c.detail).collect();
    assert_eq!(details, vec!["3".to_string(), "8000".to_string()]);
    assert!(response.results.contains_key("weather"));
    assert!(response.results.contains_key("events"));
}

#[tokio::test]
async fn test_invalid_input_touches_nothing() {
    let model = Arc::new(ScriptedModel::new(vec![]));
    let sources = Arc::new(FakeSources::valencia());

    let err = engine(&model, &sources)
        .report("cli", ReportProfile::Urban, &ReportRequest::default())
        .await
        .unwrap_err();

    assert_eq!(err.class().status(), 400);
    assert_eq!(model.calls(), 0);
    assert!(sources.calls().is_empty());
}

#[tokio::test]
async fn test_compose_rejects_tool_calls() {
    let model = ScriptedModel::new(vec![ModelReply::tool_calls(vec![call(
        "c1",
        ToolName::FloodRisk,
        "{}",
    )])]);
    let err = compose(&model, "system".to_string(), "user".to_string(), &["Overview"], 2)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::ModelProtocol(_)));
}
