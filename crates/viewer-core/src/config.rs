//! Viewer configuration
//!
//! Tunables for page slicing, look-ahead, provider requests and the freeform
//! layout table. Configuration can be loaded from a JSON file, environment
//! variables, or created programmatically.

use doc_model::DEFAULT_VIRTUAL_PAGE_HEIGHT;
use pageview_render::FreeformThresholds;
use pageview_scheduler::FetchConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const ENV_LOOK_AHEAD_PAGES: &str = "PAGEVIEW_LOOK_AHEAD_PAGES";
const ENV_VIRTUAL_PAGE_HEIGHT: &str = "PAGEVIEW_VIRTUAL_PAGE_HEIGHT";
const ENV_FETCH_TIMEOUT_MS: &str = "PAGEVIEW_FETCH_TIMEOUT_MS";
const ENV_MAX_STRAY_RESPONSES: &str = "PAGEVIEW_MAX_STRAY_RESPONSES";

/// Smallest accepted slice height, in document units
pub const MIN_VIRTUAL_PAGE_HEIGHT: f64 = 16.0;

/// Configuration for one viewer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Real pages fetched beyond the last visible one
    pub look_ahead_pages: usize,
    /// Maximum native height of a virtual page in tiled documents
    pub virtual_page_height: f64,
    /// Upper bound on one provider request, in milliseconds
    pub fetch_timeout_ms: u64,
    /// Consecutive unexpected provider responses tolerated per request
    pub max_stray_responses: u32,
    /// Freeform layout thresholds
    pub freeform: FreeformThresholds,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();

        Self {
            look_ahead_pages: 3,
            virtual_page_height: DEFAULT_VIRTUAL_PAGE_HEIGHT,
            fetch_timeout_ms: fetch.timeout.as_millis() as u64,
            max_stray_responses: fetch.max_stray_responses,
            freeform: FreeformThresholds::default(),
        }
    }
}

impl ViewerConfig {
    /// Sets the look-ahead margin in real pages.
    pub fn with_look_ahead_pages(mut self, pages: usize) -> Self {
        self.look_ahead_pages = pages;
        self
    }

    /// Sets the virtual page slice height.
    pub fn with_virtual_page_height(mut self, height: f64) -> Self {
        self.virtual_page_height = height;
        self
    }

    /// Sets the provider request timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets how many stray provider responses are tolerated per request.
    pub fn with_max_stray_responses(mut self, count: u32) -> Self {
        self.max_stray_responses = count;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Fetch pipeline settings derived from this configuration.
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig { timeout: self.fetch_timeout(), max_stray_responses: self.max_stray_responses }
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `PAGEVIEW_LOOK_AHEAD_PAGES`: look-ahead margin in real pages (default: 3)
    /// - `PAGEVIEW_VIRTUAL_PAGE_HEIGHT`: slice height in native units (default: 1024)
    /// - `PAGEVIEW_FETCH_TIMEOUT_MS`: provider request timeout (default: 10000)
    /// - `PAGEVIEW_MAX_STRAY_RESPONSES`: stray responses tolerated (default: 3)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Applies any configuration environment variables to `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(value) = env_value(ENV_LOOK_AHEAD_PAGES)? {
            self.look_ahead_pages = value;
        }
        if let Some(value) = env_value(ENV_VIRTUAL_PAGE_HEIGHT)? {
            self.virtual_page_height = value;
        }
        if let Some(value) = env_value(ENV_FETCH_TIMEOUT_MS)? {
            self.fetch_timeout_ms = value;
        }
        if let Some(value) = env_value(ENV_MAX_STRAY_RESPONSES)? {
            self.max_stray_responses = value;
        }

        self.validate()
    }

    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    ///
    /// ```json
    /// { "look_ahead_pages": 5, "fetch_timeout_ms": 2000 }
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;

        Self::from_json(&contents)
    }

    /// Parses configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.with_env_overrides()
    }

    /// Saves configuration to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !self.virtual_page_height.is_finite() || self.virtual_page_height < MIN_VIRTUAL_PAGE_HEIGHT {
            return Err(ConfigError::InvalidValue {
                key: "virtual_page_height",
                value: self.virtual_page_height.to_string(),
            });
        }

        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue { key: "fetch_timeout_ms", value: "0".to_owned() });
        }

        Ok(self)
    }
}

fn env_value<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key: name, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for configuration key {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("unable to access config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: [&str; 4] = [
        ENV_LOOK_AHEAD_PAGES,
        ENV_VIRTUAL_PAGE_HEIGHT,
        ENV_FETCH_TIMEOUT_MS,
        ENV_MAX_STRAY_RESPONSES,
    ];

    #[test]
    fn test_default_config() {
        let config = ViewerConfig::default();
        assert_eq!(config.look_ahead_pages, 3);
        assert_eq!(config.virtual_page_height, 1024.0);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_stray_responses, 3);
        assert_eq!(config.freeform, FreeformThresholds::default());
    }

    #[test]
    fn test_builder_methods() {
        let config = ViewerConfig::default()
            .with_look_ahead_pages(5)
            .with_virtual_page_height(512.0)
            .with_fetch_timeout(Duration::from_millis(1500))
            .with_max_stray_responses(0);

        assert_eq!(config.look_ahead_pages, 5);
        assert_eq!(config.virtual_page_height, 512.0);
        assert_eq!(config.fetch_config(), FetchConfig {
            timeout: Duration::from_millis(1500),
            max_stray_responses: 0,
        });
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_LOOK_AHEAD_PAGES, "6");
        env::set_var(ENV_VIRTUAL_PAGE_HEIGHT, "2048");
        env::set_var(ENV_FETCH_TIMEOUT_MS, "250");
        env::set_var(ENV_MAX_STRAY_RESPONSES, "1");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.look_ahead_pages, 6);
        assert_eq!(config.virtual_page_height, 2048.0);
        assert_eq!(config.fetch_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_stray_responses, 1);
    }

    #[test]
    #[serial]
    fn test_from_env_partial() {
        let _guard = EnvGuard::new(&ALL_VARS);

        for name in ALL_VARS {
            env::remove_var(name);
        }
        env::set_var(ENV_LOOK_AHEAD_PAGES, "1");

        let config = ViewerConfig::from_env().unwrap();
        assert_eq!(config.look_ahead_pages, 1);
        assert_eq!(config.virtual_page_height, 1024.0); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ALL_VARS);

        env::set_var(ENV_FETCH_TIMEOUT_MS, "soon");
        assert!(matches!(
            ViewerConfig::from_env(),
            Err(ConfigError::InvalidValue { key: ENV_FETCH_TIMEOUT_MS, .. })
        ));

        env::set_var(ENV_FETCH_TIMEOUT_MS, "0");
        assert!(ViewerConfig::from_env().is_err());
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars =
                var_names.iter().map(|name| (name.to_string(), env::var(name).ok())).collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_json_partial() {
        let config = ViewerConfig::from_json(r#"{ "look_ahead_pages": 2 }"#).unwrap();
        assert_eq!(config.look_ahead_pages, 2);
        assert_eq!(config.fetch_timeout_ms, 10_000); // default
    }

    #[test]
    fn test_from_json_nested_thresholds() {
        let config =
            ViewerConfig::from_json(r#"{ "freeform": { "max_fit_aspect": 3.0 } }"#).unwrap();
        assert_eq!(config.freeform.max_fit_aspect, 3.0);
        assert_eq!(config.freeform.small_width, 640.0);
    }

    #[test]
    fn test_from_json_rejects_bad_slice_height() {
        let result = ViewerConfig::from_json(r#"{ "virtual_page_height": -1 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: "virtual_page_height", .. })));
    }

    #[test]
    fn test_from_json_rejects_tiny_slice_height() {
        let result = ViewerConfig::from_json(r#"{ "virtual_page_height": 0.001 }"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { key: "virtual_page_height", .. })));

        let config = ViewerConfig::from_json(r#"{ "virtual_page_height": 16 }"#).unwrap();
        assert_eq!(config.virtual_page_height, MIN_VIRTUAL_PAGE_HEIGHT);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(ViewerConfig::from_json("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_file_save_and_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("viewer.json");

        let config = ViewerConfig::default().with_look_ahead_pages(4);
        config.save_to_file(&path).unwrap();

        let loaded = ViewerConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let error = ViewerConfig::from_file("/nonexistent/viewer.json").unwrap_err();
        assert!(error.to_string().contains("/nonexistent/viewer.json"));
    }
}
