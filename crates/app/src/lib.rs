use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Base URL of the conversion backend.
    pub api_url: String,
    /// Milliseconds between job status polls.
    pub poll_interval_ms: u64,
    /// How many sentences playback keeps synthesized ahead of the one
    /// currently audible.
    pub prefetch_depth: usize,
    /// Audio player argv; each clip is piped to its stdin.
    pub player_cmd: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: DEFAULT_API_URL.to_string(),
            poll_interval_ms: 2000,
            prefetch_depth: 3,
            player_cmd: vec!["aplay".to_string(), "-q".to_string(), "-".to_string()],
        }
    }
}

impl Settings {
    /// Load settings from a specific config file path (for tests and the
    /// `--config` flag).
    pub fn from_path(config_path: impl AsRef<Path>) -> Result<Self, String> {
        let mut builder = Config::builder();

        // Set defaults so a partial file still deserializes.
        builder = builder
            .set_default("api_url", DEFAULT_API_URL).unwrap()
            .set_default("poll_interval_ms", 2000).unwrap()
            .set_default("prefetch_depth", 3).unwrap()
            .set_default("player_cmd", vec!["aplay", "-q", "-"]).unwrap();

        // Add the specific file source.
        builder = builder.add_source(File::from(config_path.as_ref()).required(true));

        // Add environment variables, which will override the file's settings.
        builder = builder.add_source(Environment::with_prefix("BOOKVOX").separator("__"));

        let config = builder
            .build()
            .map_err(|e| format!("Failed to build config: {}", e))?;
        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| format!("Failed to deserialize settings: {}", e))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn new() -> Result<Self, String> {
        let mut builder = Config::builder();

        builder = builder
            .set_default("api_url", DEFAULT_API_URL).unwrap()
            .set_default("poll_interval_ms", 2000).unwrap()
            .set_default("prefetch_depth", 3).unwrap()
            .set_default("player_cmd", vec!["aplay", "-q", "-"]).unwrap();

        // Find and add config file source.
        let config_path = Path::new("bookvox.toml");
        if config_path.exists() {
            tracing::info!("Loading configuration from: {}", config_path.display());
            builder = builder.add_source(File::from(config_path).required(true));
        } else {
            tracing::debug!("No 'bookvox.toml' found. Using defaults and environment variables.");
        }

        // Add environment variables, which will override the file's settings.
        builder = builder.add_source(Environment::with_prefix("BOOKVOX").separator("__"));

        let config = builder
            .build()
            .map_err(|e| format!("Failed to build config: {}", e))?;
        let mut settings: Settings = config
            .try_deserialize()
            .map_err(|e| format!("Failed to deserialize settings: {}", e))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&mut self) -> Result<(), String> {
        if self.api_url.trim().is_empty() {
            return Err("api_url must not be empty".to_string());
        }

        if self.poll_interval_ms == 0 {
            tracing::warn!("poll_interval_ms must be positive. Defaulting to 2000.");
            self.poll_interval_ms = 2000;
        }

        if self.prefetch_depth == 0 {
            tracing::warn!("prefetch_depth must be at least 1. Defaulting to 1.");
            self.prefetch_depth = 1;
        }

        if self.player_cmd.is_empty() {
            return Err("player_cmd must name a player executable".to_string());
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

pub mod player;
pub mod runtime;
