//! GeoScope - location reports from open geodata
//!
//! Resolves an address or coordinate pair, lets a model gather data from
//! OpenStreetMap, flood maps, Wikidata, Open-Meteo and Wikipedia, and prints
//! a Markdown report with its sources and limitations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geoscope_adapters::{Config, HttpSources};
use geoscope_core::rate_limit::RateLimiter;
use geoscope_core::response::ErrorResponse;
use geoscope_core::{ErrorClass, LocationInput, ReportError, ReportRequest, ToolName};
use geoscope_engine::llm::client::OpenAiCompatClient;
use geoscope_engine::tools::tool_definitions;
use geoscope_engine::{Engine, ReportProfile, RunOptions};
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Rate-limit bucket for requests made from this process.
const CLIENT_KEY: &str = "local";

#[derive(Parser, Debug)]
#[command(
    name = "geoscope",
    about = "Location reports from open geodata",
    long_about = "G E O S C O P E\n\n\
                  Generates Markdown reports about a place from open geodata,\n\
                  citing its sources and listing what could not be fetched.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a report for one location
    Report {
        /// Report type: urban, city or history
        profile: ReportProfile,

        /// Street address or place name
        #[arg(long)]
        address: Option<String>,

        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: Option<f64>,

        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: Option<f64>,

        /// Search radius in metres (100-5000, default 1000)
        #[arg(long)]
        radius_m: Option<f64>,

        /// Print only the Markdown report
        #[arg(long)]
        markdown: bool,
    },

    /// Compare two locations, each "lat,lon" or an address
    Compare {
        #[arg(long, allow_hyphen_values = true)]
        a: String,

        #[arg(long, allow_hyphen_values = true)]
        b: String,

        /// Print only the Markdown report
        #[arg(long)]
        markdown: bool,
    },

    /// Print the tool declarations sent to the model
    Tools {
        #[arg(long)]
        profile: Option<ReportProfile>,
    },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("GEOSCOPE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = Config::load();

    match cli.command {
        Command::Report {
            profile,
            address,
            lat,
            lon,
            radius_m,
            markdown,
        } => {
            let request = ReportRequest {
                address,
                lat,
                lon,
                radius_m,
            };
            let engine = build_engine(&config)?;
            let outcome = engine.report(CLIENT_KEY, profile, &request).await;
            emit(outcome, markdown, |r| r.report_markdown.as_str())
        }
        Command::Compare { a, b, markdown } => {
            let engine = build_engine(&config)?;
            let outcome = engine
                .compare(CLIENT_KEY, &LocationInput::parse(&a), &LocationInput::parse(&b))
                .await;
            emit(outcome, markdown, |r| r.report_markdown.as_str())
        }
        Command::Tools { profile } => {
            let tools = match profile {
                Some(profile) => profile.spec().declared_tools(),
                None => ToolName::ALL.to_vec(),
            };
            print_json(&tool_definitions(&tools))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config { save } => {
            if save {
                config
                    .save()
                    .map_err(anyhow::Error::msg)
                    .context("Failed to save config")?;
                eprintln!("Saved {}", Config::config_location());
            } else {
                eprintln!("Config file: {}", Config::config_location());
            }
            print_json(&config)?;
            if !config.has_api_key() {
                eprintln!("No API key found. Set OPENROUTER_API_KEY (or OPENAI_API_KEY).");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_engine(config: &Config) -> Result<Engine> {
    let api_key = config
        .get_api_key()
        .context("No API key found. Set OPENROUTER_API_KEY (or OPENAI_API_KEY).")?;
    let model = OpenAiCompatClient::new(
        &config.llm_base_url,
        config.model.clone(),
        api_key,
        config.llm_timeout_secs,
    )?;
    let sources = HttpSources::new(config.clone())?;

    let mut engine = Engine::new(Arc::new(model), Arc::new(sources)).with_options(RunOptions {
        weather_years: config.weather_years,
    });
    if config.rate_limit_per_minute > 0 {
        engine = engine.with_rate_limiter(Arc::new(RateLimiter::new(
            config.rate_limit_per_minute,
            Duration::from_secs(60),
        )));
    }
    Ok(engine)
}

/// Print a response or its error body and pick the exit code.
fn emit<T: Serialize>(
    outcome: Result<T, ReportError>,
    markdown_only: bool,
    markdown: impl Fn(&T) -> &str,
) -> Result<ExitCode> {
    match outcome {
        Ok(response) => {
            if markdown_only {
                println!("{}", markdown(&response));
            } else {
                print_json(&response)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            let body = ErrorResponse::from(&err);
            print_json(&body)?;
            Ok(exit_code(body.class))
        }
    }
}

fn exit_code(class: ErrorClass) -> ExitCode {
    match class {
        ErrorClass::Client | ErrorClass::RateLimited => ExitCode::from(2),
        ErrorClass::Unprocessable => ExitCode::from(3),
        ErrorClass::Server | ErrorClass::Upstream => ExitCode::FAILURE,
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_negative_coordinates_parse() {
        let cli = Cli::try_parse_from([
            "geoscope", "report", "urban", "--lat", "39.4699", "--lon", "-0.3763",
            "--radius-m", "1200",
        ])
        .unwrap();
        match cli.command {
            Command::Report {
                profile, lon, radius_m, ..
            } => {
                assert_eq!(profile, ReportProfile::Urban);
                assert_eq!(lon, Some(-0.3763));
                assert_eq!(radius_m, Some(1200.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert!(Cli::try_parse_from(["geoscope", "report", "rural", "--lat", "1", "--lon", "2"]).is_err());
    }

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(exit_code(ErrorClass::Client), ExitCode::from(2));
        assert_eq!(exit_code(ErrorClass::Unprocessable), ExitCode::from(3));
        assert_eq!(exit_code(ErrorClass::Server), ExitCode::FAILURE);
    }
}
