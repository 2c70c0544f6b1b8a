//! Core domain model and contracts for GeoScope.

pub mod compare;
pub mod coords;
pub mod error;
pub mod geo;
pub mod limitations;
pub mod protocol;
pub mod rate_limit;
pub mod request;
pub mod response;
pub mod sources;
pub mod text;
pub mod tool;

pub use coords::{Address, Coords};
pub use error::{ErrorClass, ReportError};
pub use limitations::Limitations;
pub use protocol::{GeoSources, SourceFuture};
pub use request::{LocationInput, ReportRequest, StartingPoint};
pub use sources::{FailureKind, SourceFailure, SourceId, SourceResult};
pub use tool::{ToolName, ToolOutput};
