//! The report loop: drives the model through its tool calls, reconciles the
//! results and re-prompts until the report is complete and well-formed.

pub mod dispatch;
pub mod session;

#[cfg(test)]
mod tests;

use crate::format::missing_headings;
use crate::llm::models::{merge_usage, Usage};
use crate::llm::{ChatModel, Message};
use crate::profile::ReportProfile;
use crate::prompts;
use crate::tools::{tool_definitions, ToolDefinition};
use geoscope_core::{Coords, GeoSources, ReportError, ReportRequest, StartingPoint};
use session::{SessionState, Transcript};

/// Tunables that come from configuration rather than the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub weather_years: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { weather_years: 5 }
    }
}

/// A finished run, ready for assembly.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub coords: Coords,
    pub state: SessionState,
    pub markdown: String,
    pub usage: Option<Usage>,
    pub steps: usize,
}

/// Run the tool-calling loop for a single-location report.
pub async fn run_report(
    model: &dyn ChatModel,
    sources: &dyn GeoSources,
    profile: ReportProfile,
    request: &ReportRequest,
    options: RunOptions,
) -> Result<RunOutcome, ReportError> {
    let start = request.starting_point()?;
    let spec = profile.spec();
    let mandatory = spec.mandatory_for(&start);
    let tools = tool_definitions(&spec.declared_tools());
    let radius_m = request.radius_m();

    let mut state = SessionState::new(
        start.clone(),
        radius_m,
        mandatory.clone(),
        options.weather_years,
    );
    let mut transcript = Transcript::new(spec.max_steps);
    transcript.push(Message::system(prompts::report_system(&spec, &mandatory)));
    transcript.push(Message::user(prompts::report_user(&start, radius_m)));

    let mut usage = None;
    loop {
        let step = transcript.begin_turn()?;
        let reply = model
            .complete(transcript.messages(), &tools)
            .await
            .map_err(|err| ReportError::ModelProvider(format!("{err:#}")))?;
        usage = merge_usage(usage, reply.usage.clone());

        if let Some(refusal) = reply.refusal.as_deref() {
            return Err(ReportError::ModelProtocol(format!("model refused: {refusal}")));
        }

        if !reply.tool_calls.is_empty() {
            tracing::debug!(step, calls = reply.tool_calls.len(), "model requested tools");
            transcript.push_tool_calls(reply.content.clone(), &reply.tool_calls);
            let answers = dispatch::run_batch(sources, &mut state, &reply.tool_calls).await?;
            transcript.answer_tool_calls(answers);
            continue;
        }

        let text = final_text(reply.content)?;
        transcript.push(Message::assistant(text.clone()));

        let Some(coords) = state.coords.clone() else {
            let address = match &state.start {
                StartingPoint::Address(address) => address.as_str(),
                StartingPoint::Coordinates(_) => "",
            };
            tracing::debug!(step, "report written before coordinates were resolved");
            transcript.push(Message::user(prompts::missing_coordinates_corrective(address)));
            continue;
        };

        let missing_tools = state.missing_mandatory();
        if !missing_tools.is_empty() {
            tracing::debug!(step, missing = ?missing_tools, "mandatory tools not called");
            transcript.push(Message::user(prompts::missing_tools_corrective(
                &missing_tools,
                Some(&coords),
                radius_m,
            )));
            continue;
        }

        let missing = missing_headings(&text, spec.headings);
        if !missing.is_empty() {
            tracing::debug!(step, missing = ?missing, "required headings absent");
            transcript.push(Message::user(prompts::missing_headings_corrective(
                &missing,
                spec.headings,
            )));
            continue;
        }

        return Ok(RunOutcome {
            coords,
            state,
            markdown: text,
            usage,
            steps: transcript.steps(),
        });
    }
}

/// Single-shot composition without tools, re-prompted only for headings.
pub async fn compose(
    model: &dyn ChatModel,
    system: String,
    user: String,
    headings: &[&str],
    max_steps: usize,
) -> Result<(String, Option<Usage>), ReportError> {
    let no_tools: [ToolDefinition; 0] = [];
    let mut transcript = Transcript::new(max_steps);
    transcript.push(Message::system(system));
    transcript.push(Message::user(user));

    let mut usage = None;
    loop {
        let step = transcript.begin_turn()?;
        let reply = model
            .complete(transcript.messages(), &no_tools)
            .await
            .map_err(|err| ReportError::ModelProvider(format!("{err:#}")))?;
        usage = merge_usage(usage, reply.usage.clone());

        if let Some(refusal) = reply.refusal.as_deref() {
            return Err(ReportError::ModelProtocol(format!("model refused: {refusal}")));
        }
        if !reply.tool_calls.is_empty() {
            return Err(ReportError::ModelProtocol(
                "model requested tools where none were offered".to_string(),
            ));
        }

        let text = final_text(reply.content)?;
        transcript.push(Message::assistant(text.clone()));

        let missing = missing_headings(&text, headings);
        if missing.is_empty() {
            return Ok((text, usage));
        }
        tracing::debug!(step, missing = ?missing, "required headings absent");
        transcript.push(Message::user(prompts::missing_headings_corrective(
            &missing, headings,
        )));
    }
}

fn final_text(content: Option<String>) -> Result<String, ReportError> {
    content
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| {
            ReportError::ModelProtocol("model returned neither text nor tool calls".to_string())
        })
}
