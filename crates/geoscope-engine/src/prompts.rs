use crate::profile::ProfileSpec;
use geoscope_core::{Coords, StartingPoint, ToolName};

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED BUILDING BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// Grounding rules shared by every report prompt
const GROUNDING_RULES: &str = r#"RULES:
- Use only data returned by tools or given in this conversation. Never invent figures.
- When a tool returns "ok": false or a fallback, say so in the Limitations section.
- Quote numbers with their units and, where given, their dates.
- Write in plain English for a non-specialist reader."#;

const FORMAT_RULES: &str = r###"FORMAT:
- Respond with Markdown only.
- Use exactly these level-2 headings ("## Heading"), each on its own line:"###;

fn heading_list(headings: &[&str]) -> String {
    headings
        .iter()
        .map(|h| format!("## {h}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tool_list(tools: &[ToolName]) -> String {
    tools
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPORT PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn report_system(spec: &ProfileSpec, mandatory: &[ToolName]) -> String {
    format!(
        r#"You are GeoScope, an analyst writing a location report focused on {focus}.

WORKFLOW:
1. If the user gave an address, call geocode_address first and wait for the coordinates.
2. Call every mandatory tool at least once: {mandatory}.
3. Other tools are optional; call them only if they add something relevant.
4. When you have the data, answer with the final report and no further tool calls.

{rules}

{format}
{headings}"#,
        focus = spec.focus,
        mandatory = tool_list(mandatory),
        rules = GROUNDING_RULES,
        format = FORMAT_RULES,
        headings = heading_list(spec.headings),
    )
}

pub fn report_user(start: &StartingPoint, radius_m: u32) -> String {
    match start {
        StartingPoint::Coordinates(coords) => format!(
            "Write the report for the point lat={}, lon={}. Use a search radius of {radius_m} m where a tool accepts one.",
            coords.lat, coords.lon
        ),
        StartingPoint::Address(address) => format!(
            "Write the report for the address \"{address}\". Geocode it first. Use a search radius of {radius_m} m where a tool accepts one."
        ),
    }
}

pub fn missing_tools_corrective(
    missing: &[ToolName],
    coords: Option<&Coords>,
    radius_m: u32,
) -> String {
    let hint = match coords {
        Some(coords) => format!(
            " Use lat={}, lon={} (radius_m={radius_m} where accepted).",
            coords.lat, coords.lon
        ),
        None => String::new(),
    };
    format!(
        "The report is not complete yet. You have not called these mandatory tools: {}.{hint} Call them now, then write the report again.",
        tool_list(missing)
    )
}

pub fn missing_headings_corrective(missing: &[&str], required: &[&str]) -> String {
    format!(
        "Your report is missing these required headings: {}. Rewrite the complete report using exactly these level-2 headings, each on its own line:\n{}",
        missing.join(", "),
        heading_list(required)
    )
}

pub fn missing_coordinates_corrective(address: &str) -> String {
    format!(
        "No coordinates have been resolved for \"{address}\" yet. Call geocode_address again before writing the report."
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPARISON PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn compare_system(spec: &ProfileSpec) -> String {
    format!(
        r#"You are GeoScope, an analyst writing {focus}.

The data for both locations is provided by the user as JSON. No tools are available.

{rules}

{format}
{headings}"#,
        focus = spec.focus,
        rules = GROUNDING_RULES,
        format = FORMAT_RULES,
        headings = heading_list(spec.headings),
    )
}

pub fn compare_user(a_json: &str, b_json: &str, limitations: &[String]) -> String {
    let mut prompt = format!("LOCATION A:\n{a_json}\n\nLOCATION B:\n{b_json}\n");
    if !limitations.is_empty() {
        prompt.push_str("\nKNOWN DATA GAPS:\n");
        for entry in limitations {
            prompt.push_str("- ");
            prompt.push_str(entry);
            prompt.push('\n');
        }
    }
    prompt.push_str("\nCompare the two locations.");
    prompt
}
