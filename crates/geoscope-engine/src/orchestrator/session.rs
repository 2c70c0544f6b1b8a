//! Per-run state: reconciled coordinates, last-seen tool results, the
//! limitations log and the model transcript.

use crate::llm::{Message, ToolCallMessage};
use geoscope_core::limitations::entries_for;
use geoscope_core::{Coords, Limitations, ReportError, StartingPoint, ToolName, ToolOutput};
use std::collections::{BTreeMap, BTreeSet};

/// Reverse results within this many degrees of the session point describe it.
const SAME_POINT_DEG: f64 = 1e-4;

/// Shared result state of one orchestration run.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub start: StartingPoint,
    pub coords: Option<Coords>,
    pub radius_m: u32,
    pub weather_years: u32,
    mandatory: Vec<ToolName>,
    used: BTreeSet<ToolName>,
    results: BTreeMap<ToolName, ToolOutput>,
    limitations: Limitations,
    place_entity: Option<String>,
}

impl SessionState {
    pub fn new(
        start: StartingPoint,
        radius_m: u32,
        mandatory: Vec<ToolName>,
        weather_years: u32,
    ) -> Self {
        let coords = match &start {
            StartingPoint::Coordinates(coords) => Some(coords.clone()),
            StartingPoint::Address(_) => None,
        };
        Self {
            start,
            coords,
            radius_m,
            weather_years,
            mandatory,
            used: BTreeSet::new(),
            results: BTreeMap::new(),
            limitations: Limitations::new(),
            place_entity: None,
        }
    }

    /// Apply one adapter result: mark the tool used, overwrite its slot,
    /// reconcile coordinates and log any failure or fallback.
    pub fn record(&mut self, output: ToolOutput) {
        self.apply(output, None);
    }

    /// Like [`SessionState::record`] for a call made at `(lat, lon)`. A
    /// reverse geocode only enriches the session coordinates when it was
    /// made at the session point.
    pub fn record_at(&mut self, output: ToolOutput, lat: f64, lon: f64) {
        self.apply(output, Some((lat, lon)));
    }

    fn apply(&mut self, output: ToolOutput, at: Option<(f64, f64)>) {
        let tool = output.tool();
        self.used.insert(tool);

        match &output {
            ToolOutput::Geocode(result) => {
                if let Some(hit) = result.data() {
                    if self.coords.is_none() {
                        let mut coords = Coords::new(hit.lat, hit.lon);
                        coords.fill_missing(Some(&hit.display_name), hit.address.as_ref());
                        self.coords = Some(coords);
                    }
                }
            }
            ToolOutput::ReverseGeocode(result) => {
                if let (Some(place), Some(coords)) = (result.data(), self.coords.as_mut()) {
                    let here = at.is_none_or(|(lat, lon)| {
                        (lat - coords.lat).abs() < SAME_POINT_DEG
                            && (lon - coords.lon).abs() < SAME_POINT_DEG
                    });
                    if here {
                        coords.fill_missing(Some(&place.display_name), Some(&place.address));
                        if self.place_entity.is_none() {
                            self.place_entity = place.wikidata.clone();
                        }
                    } else {
                        tracing::debug!(lat = ?at, "reverse geocode of another point; coordinates kept");
                    }
                }
            }
            _ => {}
        }

        for entry in entries_for(&output) {
            tracing::warn!(tool = %tool, limitation = %entry, "degraded tool result");
            self.limitations.push(entry);
        }
        self.results.insert(tool, output);
    }

    /// Log a call that was refused before reaching an adapter. Returns the
    /// tagged error body for the tool-result message. Result slots and used
    /// flags are left untouched.
    pub fn reject(&mut self, label: &str, reason: &str) -> String {
        tracing::debug!(call = label, reason, "tool call rejected");
        self.limitations
            .push(format!("{label} call rejected: {reason}"));
        tagged_error(reason)
    }

    /// Answer a call that can only run later in the session. Nothing is
    /// logged as a limitation; the model is expected to retry it.
    pub fn defer(&self, label: &str, reason: &str) -> String {
        tracing::debug!(call = label, reason, "tool call deferred");
        tagged_error(reason)
    }

    /// Wikidata entity of the session point, from a reverse geocode made there.
    pub fn place_entity(&self) -> Option<&str> {
        self.place_entity.as_deref()
    }

    pub fn result(&self, tool: ToolName) -> Option<&ToolOutput> {
        self.results.get(&tool)
    }

    pub fn was_used(&self, tool: ToolName) -> bool {
        self.used.contains(&tool)
    }

    /// Mandatory tools not yet invoked, in mandatory order.
    pub fn missing_mandatory(&self) -> Vec<ToolName> {
        self.mandatory
            .iter()
            .copied()
            .filter(|tool| !self.used.contains(tool))
            .collect()
    }

    pub fn limitations(&self) -> &Limitations {
        &self.limitations
    }

    pub fn into_parts(self) -> (BTreeMap<ToolName, ToolOutput>, Limitations) {
        (self.results, self.limitations)
    }
}

fn tagged_error(reason: &str) -> String {
    serde_json::json!({ "ok": false, "error": reason }).to_string()
}

/// Append-only model transcript with a bound on model turns.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
    max_steps: usize,
    steps: usize,
    pending_calls: Vec<String>,
}

impl Transcript {
    pub fn new(max_steps: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_steps,
            steps: 0,
            pending_calls: Vec::new(),
        }
    }

    /// Claim the next model turn. Fails once the bound is spent.
    pub fn begin_turn(&mut self) -> Result<usize, ReportError> {
        if self.steps >= self.max_steps {
            return Err(ReportError::StepBoundExceeded {
                steps: self.max_steps,
            });
        }
        self.steps += 1;
        Ok(self.steps)
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append the assistant's tool-call message verbatim. Every call must be
    /// answered through [`Transcript::answer_tool_calls`] before the next turn.
    pub fn push_tool_calls(&mut self, content: Option<String>, calls: &[ToolCallMessage]) {
        self.pending_calls = calls.iter().map(|call| call.id.clone()).collect();
        self.messages
            .push(Message::assistant_tool_calls(content, calls.to_vec()));
    }

    /// Append one tool-result message per pending call, in call order.
    /// Calls without an answer get an error body so pairing stays strict.
    pub fn answer_tool_calls(&mut self, answers: Vec<(String, String)>) {
        let mut answers: BTreeMap<String, String> = answers.into_iter().collect();
        for id in std::mem::take(&mut self.pending_calls) {
            let content = answers.remove(&id).unwrap_or_else(|| {
                serde_json::json!({ "ok": false, "error": "tool call was not executed" })
                    .to_string()
            });
            self.messages.push(Message::tool_result(id, content));
        }
    }
}
