use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use toml::Table;

use crate::task::{GenerationConfig, PollPolicy};
use crate::transport::ResultRoute;

pub const DEFAULT_CONFIG_PATH: &str = "crynux-chat.toml";
pub const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:5028";
pub const DEFAULT_MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `tracing` filter directive, e.g. "info" or "crynux_chat=debug".
    pub level: String,
    /// Directory for the rotating log file. `None` logs to stderr only.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bridge_url: String,
    /// Models offered to the user. The first one is the default.
    pub models: Vec<String>,
    pub task_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub result_route: ResultRoute,
    pub seed: u64,
    pub generation: GenerationConfig,
    pub log: LogConfig,
    /// Problems found while loading, reported once logging is up.
    pub warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            models: vec![DEFAULT_MODEL.to_string()],
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            result_route: ResultRoute::Chat,
            seed: 0,
            generation: GenerationConfig {
                max_new_tokens: Some(2048),
                temperature: Some(1.0),
                top_p: Some(1.0),
                top_k: Some(50.0),
            },
            log: LogConfig::default(),
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Load `CRYNUX_CHAT_CONFIG` (or `crynux-chat.toml`) if present, then
    /// apply `CRYNUX_*` environment overrides. Never fails: bad input falls
    /// back to defaults and is recorded in `warnings`.
    pub fn load() -> Self {
        let path = env::var("CRYNUX_CHAT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::from_file(Path::new(&path));
        config.apply_overrides(|key| env::var(key).ok());
        config.sanitize();
        config
    }

    fn from_file(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                let mut config = Self::default();
                config
                    .warnings
                    .push(format!("cannot read {}: {e}, using defaults", path.display()));
                return config;
            }
        };

        match Self::from_toml_str(&text) {
            Ok(config) => config,
            Err(e) => {
                let mut config = Self::default();
                config
                    .warnings
                    .push(format!("invalid config {}: {e}, using defaults", path.display()));
                config
            }
        }
    }

    /// Parse a config file. Each field is decoded on its own, so a bad value
    /// only resets that field and leaves a warning. Fails only when `text`
    /// is not TOML at all.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        let mut table: Table = text.parse()?;
        let mut config = Self::default();
        let mut warnings = Vec::new();
        let w = &mut warnings;

        if let Some(url) = take(&mut table, "", "bridge_url", w) {
            config.bridge_url = url;
        }
        if let Some(models) = take(&mut table, "", "models", w) {
            config.models = models;
        }
        if let Some(secs) = take(&mut table, "", "task_timeout_secs", w) {
            config.task_timeout_secs = secs;
        }
        if let Some(ms) = take(&mut table, "", "poll_interval_ms", w) {
            config.poll_interval_ms = ms;
        }
        if let Some(secs) = take(&mut table, "", "request_timeout_secs", w) {
            config.request_timeout_secs = secs;
        }
        if let Some(route) = take(&mut table, "", "result_route", w) {
            config.result_route = route;
        }
        if let Some(seed) = take(&mut table, "", "seed", w) {
            config.seed = seed;
        }

        // A [generation] table replaces the defaults: fields it leaves out
        // are not sent at all.
        if let Some(mut generation) = take::<Table>(&mut table, "", "generation", w) {
            config.generation = GenerationConfig {
                max_new_tokens: take(&mut generation, "generation.", "max_new_tokens", w),
                temperature: take(&mut generation, "generation.", "temperature", w),
                top_p: take(&mut generation, "generation.", "top_p", w),
                top_k: take(&mut generation, "generation.", "top_k", w),
            };
            report_unknown(&generation, "generation.", w);
        }

        if let Some(mut log) = take::<Table>(&mut table, "", "log", w) {
            if let Some(level) = take(&mut log, "log.", "level", w) {
                config.log.level = level;
            }
            if let Some(dir) = take::<String>(&mut log, "log.", "dir", w) {
                config.log.dir = Some(PathBuf::from(dir));
            }
            report_unknown(&log, "log.", w);
        }

        report_unknown(&table, "", w);
        config.warnings = warnings;
        Ok(config)
    }

    /// Apply `CRYNUX_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CRYNUX_BRIDGE_URL").filter(|v| !v.trim().is_empty()) {
            self.bridge_url = url.trim().to_string();
        }

        if let Some(model) = lookup("CRYNUX_MODEL").filter(|v| !v.trim().is_empty()) {
            let model = model.trim().to_string();
            self.models.retain(|m| *m != model);
            self.models.insert(0, model);
        }

        if let Some(raw) = lookup("CRYNUX_TASK_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) => self.task_timeout_secs = secs,
                Err(_) => self
                    .warnings
                    .push(format!("CRYNUX_TASK_TIMEOUT_SECS={raw:?} is not a number, ignored")),
            }
        }

        if let Some(raw) = lookup("CRYNUX_RESULT_ROUTE") {
            match ResultRoute::parse(&raw) {
                Some(route) => self.result_route = route,
                None => self.warnings.push(format!(
                    "CRYNUX_RESULT_ROUTE={raw:?} is not \"chat\" or \"file\", ignored"
                )),
            }
        }

        if let Some(level) = lookup("CRYNUX_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log.level = level.trim().to_string();
        }

        if let Some(dir) = lookup("CRYNUX_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(dir.trim()));
        }
    }

    /// Replace unusable values with defaults.
    fn sanitize(&mut self) {
        self.models.retain(|m| !m.trim().is_empty());
        if self.models.is_empty() {
            self.warnings
                .push(format!("no models configured, using {DEFAULT_MODEL}"));
            self.models.push(DEFAULT_MODEL.to_string());
        }
        if self.task_timeout_secs == 0 {
            self.warnings.push(format!(
                "task_timeout_secs must be positive, using {DEFAULT_TASK_TIMEOUT_SECS}"
            ));
            self.task_timeout_secs = DEFAULT_TASK_TIMEOUT_SECS;
        }
        if self.poll_interval_ms == 0 {
            self.warnings.push(format!(
                "poll_interval_ms must be positive, using {DEFAULT_POLL_INTERVAL_MS}"
            ));
            self.poll_interval_ms = DEFAULT_POLL_INTERVAL_MS;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = DEFAULT_REQUEST_TIMEOUT_SECS;
        }
        // An empty dir switches the log file off.
        if self.log.dir.as_deref().is_some_and(|d| d.as_os_str().is_empty()) {
            self.log.dir = None;
        }
    }

    pub fn default_model(&self) -> &str {
        self.models
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_MODEL)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Remove `key` from `table` and decode it. A value of the wrong type is
/// reported in `warnings` and treated as absent.
fn take<T: DeserializeOwned>(
    table: &mut Table,
    section: &str,
    key: &str,
    warnings: &mut Vec<String>,
) -> Option<T> {
    let value = table.remove(key)?;
    match value.try_into::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warnings.push(format!("invalid {section}{key}: {e}, using default"));
            None
        }
    }
}

fn report_unknown(table: &Table, section: &str, warnings: &mut Vec<String>) {
    for key in table.keys() {
        warnings.push(format!("unknown config key {section}{key}, ignored"));
    }
}
