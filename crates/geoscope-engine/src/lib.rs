//! Report orchestration for GeoScope: the tool-calling loop, report profiles
//! and the model client.

use geoscope_core::rate_limit::RateLimiter;
use geoscope_core::response::{CompareResponse, ReportResponse};
use geoscope_core::{GeoSources, LocationInput, ReportError, ReportRequest};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub mod assembly;
pub mod compare;
pub mod format;
pub mod llm;
pub mod orchestrator;
pub mod profile;
pub mod prompts;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;

pub use llm::ChatModel;
pub use orchestrator::RunOptions;
pub use profile::ReportProfile;

/// Entry point for callers: one model, one set of data sources and an
/// optional per-client rate limit shared across runs.
#[derive(Clone)]
pub struct Engine {
    model: Arc<dyn ChatModel>,
    sources: Arc<dyn GeoSources>,
    limiter: Option<Arc<RateLimiter>>,
    options: RunOptions,
}

impl Engine {
    pub fn new(model: Arc<dyn ChatModel>, sources: Arc<dyn GeoSources>) -> Self {
        Self {
            model,
            sources,
            limiter: None,
            options: RunOptions::default(),
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Generate a single-location report.
    pub async fn report(
        &self,
        client_key: &str,
        profile: ReportProfile,
        request: &ReportRequest,
    ) -> Result<ReportResponse, ReportError> {
        self.admit(client_key)?;
        if profile == ReportProfile::Compare {
            return Err(ReportError::InvalidInput(
                "comparison reports take two locations; use compare".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("report", %run_id, profile = profile.as_str());
        async {
            let outcome = orchestrator::run_report(
                self.model.as_ref(),
                self.sources.as_ref(),
                profile,
                request,
                self.options,
            )
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "report failed"))?;

            let usage = outcome.usage.clone().unwrap_or_default();
            tracing::info!(
                steps = outcome.steps,
                limitations = outcome.state.limitations().len(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                cost = usage.cost(),
                "report complete"
            );
            Ok::<_, ReportError>(assembly::report_response(profile, outcome))
        }
        .instrument(span)
        .await
    }

    /// Compare two locations.
    pub async fn compare(
        &self,
        client_key: &str,
        a: &LocationInput,
        b: &LocationInput,
    ) -> Result<CompareResponse, ReportError> {
        self.admit(client_key)?;

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("compare", %run_id);
        async {
            let (response, usage) = compare::run_compare(
                self.model.as_ref(),
                self.sources.as_ref(),
                a,
                b,
            )
            .await
            .inspect_err(|err| tracing::warn!(error = %err, "comparison failed"))?;

            let usage = usage.unwrap_or_default();
            tracing::info!(
                limitations = response.limitations.len(),
                total_tokens = usage.total_tokens,
                cost = usage.cost(),
                "comparison complete"
            );
            Ok::<_, ReportError>(response)
        }
        .instrument(span)
        .await
    }

    fn admit(&self, client_key: &str) -> Result<(), ReportError> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter.check(client_key).map_err(|wait| {
            tracing::warn!(client = client_key, "rate limit exceeded");
            ReportError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }
}
