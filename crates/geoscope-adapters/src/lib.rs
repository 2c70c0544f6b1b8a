//! Upstream data sources for geoscope: configuration, the HTTP gateway and
//! one adapter module per public service.

pub mod air_quality;
pub mod config;
pub mod fetch;
pub mod flood;
pub mod nominatim;
pub mod overpass;
pub mod sources;
pub mod weather;
pub mod wikidata;
pub mod wikipedia;

pub use config::Config;
pub use fetch::{FetchError, HttpGateway};
pub use sources::HttpSources;
