//! Configuration management for geoscope
//!
//! Stores settings in ~/.config/geoscope/config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_USER_AGENT: &str =
    concat!("geoscope/", env!("CARGO_PKG_VERSION"), " (+https://github.com/geoscope/geoscope)");

const MIN_WEATHER_YEARS: u32 = 1;
const MAX_WEATHER_YEARS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm_base_url: String,
    pub model: String,
    pub llm_timeout_secs: u64,
    pub user_agent: String,
    pub nominatim_url: String,
    /// Overpass interpreters, tried in order.
    pub overpass_endpoints: Vec<String>,
    pub flood_wms_url: String,
    /// Substring used to pick the preferred queryable layer.
    pub flood_layer_hint: Option<String>,
    pub air_quality_url: String,
    pub weather_archive_url: String,
    pub wikidata_url: String,
    pub wikidata_sparql_url: String,
    /// `{lang}` is replaced with `wikipedia_language`.
    pub wikipedia_api_url: String,
    pub wikipedia_language: String,
    pub weather_years: u32,
    /// Reports per client per minute; 0 disables limiting.
    pub rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            llm_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            overpass_endpoints: vec![
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://overpass.kumi.systems/api/interpreter".to_string(),
                "https://overpass.private.coffee/api/interpreter".to_string(),
            ],
            flood_wms_url: "https://wms.mapama.gob.es/sig/agua/ZI_LaminasQ100/wms.aspx"
                .to_string(),
            flood_layer_hint: Some("Q100".to_string()),
            air_quality_url: "https://air-quality-api.open-meteo.com/v1/air-quality".to_string(),
            weather_archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            wikidata_url: "https://www.wikidata.org".to_string(),
            wikidata_sparql_url: "https://query.wikidata.org/sparql".to_string(),
            wikipedia_api_url: "https://{lang}.wikipedia.org/w/api.php".to_string(),
            wikipedia_language: "es".to_string(),
            weather_years: 5,
            rate_limit_per_minute: 20,
        }
    }
}

impl Config {
    fn sanitize(&mut self) {
        let defaults = Config::default();
        for (field, fallback) in [
            (&mut self.llm_base_url, &defaults.llm_base_url),
            (&mut self.model, &defaults.model),
            (&mut self.user_agent, &defaults.user_agent),
            (&mut self.nominatim_url, &defaults.nominatim_url),
            (&mut self.flood_wms_url, &defaults.flood_wms_url),
            (&mut self.air_quality_url, &defaults.air_quality_url),
            (&mut self.weather_archive_url, &defaults.weather_archive_url),
            (&mut self.wikidata_url, &defaults.wikidata_url),
            (&mut self.wikidata_sparql_url, &defaults.wikidata_sparql_url),
            (&mut self.wikipedia_api_url, &defaults.wikipedia_api_url),
            (&mut self.wikipedia_language, &defaults.wikipedia_language),
        ] {
            let trimmed = field.trim();
            if trimmed.is_empty() {
                *field = fallback.clone();
            } else if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        self.llm_base_url = self.llm_base_url.trim_end_matches('/').to_string();
        self.overpass_endpoints.retain(|e| !e.trim().is_empty());
        if self.overpass_endpoints.is_empty() {
            self.overpass_endpoints = defaults.overpass_endpoints;
        }
        if self.llm_timeout_secs == 0 {
            self.llm_timeout_secs = defaults.llm_timeout_secs;
        }
        self.weather_years = self.weather_years.clamp(MIN_WEATHER_YEARS, MAX_WEATHER_YEARS);
        if self
            .flood_layer_hint
            .as_deref()
            .is_some_and(|h| h.trim().is_empty())
        {
            self.flood_layer_hint = None;
        }
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("geoscope"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default, then apply environment
    /// overrides.
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load a config file. Missing files give defaults; a corrupt file is
    /// moved aside to `config.json.corrupt` and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Config>(&content) {
                Ok(mut config) => {
                    config.sanitize();
                    return config;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "config file was corrupted; a backup was saved and defaults were loaded"
                    );
                }
            }
        }
        Self::default()
    }

    /// Environment overrides, read through `lookup` so tests can inject them.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(model) = non_empty("GEOSCOPE_MODEL") {
            self.model = model;
        }
        if let Some(url) = non_empty("GEOSCOPE_LLM_URL") {
            self.llm_base_url = url;
        }
        if let Some(url) = non_empty("GEOSCOPE_FLOOD_WMS_URL") {
            self.flood_wms_url = url;
        }
        if let Some(agent) = non_empty("GEOSCOPE_USER_AGENT") {
            self.user_agent = agent;
        }
        self.sanitize();
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir =
            Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;

        fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)) {
                tracing::debug!("failed to set config directory permissions: {}", e);
            }
        }

        self.save_to(&dir.join("config.json"))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let mut sanitized = self.clone();
        sanitized.sanitize();
        let content = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        #[cfg(unix)]
        {
            write_config_atomic(path, &content)
                .map_err(|e| format!("Failed to write config: {}", e))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;
        }

        Ok(())
    }

    /// LLM API key from the environment.
    pub fn get_api_key(&self) -> Option<String> {
        api_key_from(|key| std::env::var(key).ok())
    }

    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Wikipedia API endpoint for the configured language.
    pub fn wikipedia_endpoint(&self) -> String {
        self.wikipedia_api_url
            .replace("{lang}", &self.wikipedia_language)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/geoscope/config.json".to_string())
    }
}

fn api_key_from<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    ["OPENROUTER_API_KEY", "OPENAI_API_KEY"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(unix)]
fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
        tracing::debug!("failed to set temp config file permissions: {}", e);
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
