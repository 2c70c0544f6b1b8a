use crate::compare::LocationBundle;
use crate::coords::Coords;
use crate::error::{ErrorClass, ReportError};
use crate::tool::ToolOutput;
use serde::Serialize;
use std::collections::BTreeMap;

/// Bibliography entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub name: &'static str,
    pub url: &'static str,
}

/// Successful single-location report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportResponse {
    pub ok: bool,
    pub report_type: &'static str,
    pub coords: Coords,
    /// Per-tool results keyed by [`crate::ToolName::result_key`].
    #[serde(flatten)]
    pub results: BTreeMap<&'static str, ToolOutput>,
    pub report_markdown: String,
    pub sources: Vec<SourceRef>,
    pub limitations: Vec<String>,
}

/// Successful two-location comparison.
#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    pub ok: bool,
    pub a: LocationBundle,
    pub b: LocationBundle,
    pub report_markdown: String,
    pub sources: Vec<SourceRef>,
    pub limitations: Vec<String>,
}

/// `{ ok: false, error }` body, with the class kept for callers that map it
/// onto a status code.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    #[serde(skip)]
    pub class: ErrorClass,
}

impl From<&ReportError> for ErrorResponse {
    fn from(err: &ReportError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
            class: err.class(),
        }
    }
}
