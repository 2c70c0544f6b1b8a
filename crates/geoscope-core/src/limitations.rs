use crate::sources::SourceFailure;
use crate::tool::{ToolName, ToolOutput};
use serde::Serialize;

/// Entry reported when a run saw no failures or fallbacks.
pub const NO_ISSUES: &str =
    "No data-source issues were detected; all queried sources answered normally.";

/// Append-only list of data gaps observed during a run.
///
/// Entries are kept in insertion order and are not deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Limitations(Vec<String>);

impl Limitations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.0.push(entry.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Final list for the response; substitutes [`NO_ISSUES`] when empty.
    pub fn into_report(self) -> Vec<String> {
        if self.0.is_empty() {
            vec![NO_ISSUES.to_string()]
        } else {
            self.0
        }
    }
}

/// Limitation entries implied by one tool result: one per failure and one
/// per degraded condition.
pub fn entries_for(output: &ToolOutput) -> Vec<String> {
    let tool = output.tool();
    if let Some(failure) = output.failure() {
        return vec![failure_entry(tool, failure)];
    }

    let mut entries = Vec::new();
    match output {
        ToolOutput::FloodRisk(result) => {
            if let Some(flood) = result.data().filter(|f| f.fallback_used) {
                entries.push(format!(
                    "{} estimated with the reverse-geocoding fallback because the flood-zone map service gave no usable answer{}; treat it as low confidence.",
                    tool.label(),
                    flood
                        .fallback_reason
                        .as_deref()
                        .map(|reason| format!(" ({reason})"))
                        .unwrap_or_default()
                ));
            }
        }
        ToolOutput::CityStats(result) => {
            if let Some(stats) = result.data() {
                if stats.area_estimated {
                    entries.push(format!(
                        "{}: the area unit for {} was ambiguous, so the area and density are estimates.",
                        tool.label(),
                        stats.label
                    ));
                }
                if stats.population.is_none() {
                    entries.push(format!(
                        "{}: no population figure is published for {}.",
                        tool.label(),
                        stats.label
                    ));
                }
            }
        }
        _ => {}
    }
    entries
}

fn failure_entry(tool: ToolName, failure: &SourceFailure) -> String {
    format!(
        "{} data unavailable from {}: {}",
        tool.label(),
        failure.source.as_str(),
        failure.error
    )
}
