//! Packs finished runs into the response contract.

use crate::orchestrator::RunOutcome;
use crate::profile::ReportProfile;
use geoscope_core::compare::LocationBundle;
use geoscope_core::response::{CompareResponse, ReportResponse};
use geoscope_core::Limitations;

pub fn report_response(profile: ReportProfile, outcome: RunOutcome) -> ReportResponse {
    let spec = profile.spec();
    let (results, limitations) = outcome.state.into_parts();
    ReportResponse {
        ok: true,
        report_type: profile.as_str(),
        coords: outcome.coords,
        results: results
            .into_iter()
            .map(|(tool, output)| (tool.result_key(), output))
            .collect(),
        report_markdown: outcome.markdown,
        sources: spec.sources.to_vec(),
        limitations: limitations.into_report(),
    }
}

/// Limitations of both locations, labelled, in A-then-B order.
pub fn compare_limitations(a: &LocationBundle, b: &LocationBundle) -> Limitations {
    let mut limitations = Limitations::new();
    for entry in a.limitations().into_iter().chain(b.limitations()) {
        limitations.push(entry);
    }
    limitations
}

pub fn compare_response(
    a: LocationBundle,
    b: LocationBundle,
    markdown: String,
    limitations: Limitations,
) -> CompareResponse {
    CompareResponse {
        ok: true,
        a,
        b,
        report_markdown: markdown,
        sources: ReportProfile::Compare.spec().sources.to_vec(),
        limitations: limitations.into_report(),
    }
}
