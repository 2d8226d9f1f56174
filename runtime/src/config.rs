//! Configuration loading and resolution.
//!
//! Precedence, lowest first: built-in defaults, a JSON config file,
//! environment variables, then command-line flags (applied by the caller).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default interval between full-document re-scans.
pub const DEFAULT_SCAN_INTERVAL_MS: u64 = 2000;

/// Default navigation timeout.
pub const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;

/// Name of the config file picked up from the working directory.
pub const LOCAL_CONFIG_FILE: &str = "blobtap.json";

/// Errors while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("unknown hook '{0}' (expected one of: {hooks})", hooks = HookConfig::NAMES.join(", "))]
    UnknownHook(String),
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Flat directory every saved resource is written into.
    pub output_dir: PathBuf,
    /// Interval between periodic full-document scans.
    pub scan_interval_ms: u64,
    /// Whether periodic scanning starts enabled.
    pub periodic_scan: bool,
    /// How long to wait for the initial navigation.
    pub navigation_timeout_ms: u64,
    /// Run the browser without a window.
    pub headless: bool,
    /// Explicit Chromium executable.
    pub chromium_path: Option<PathBuf>,
    /// Which page-side interception points to install.
    pub hooks: HookConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("captured"),
            scan_interval_ms: DEFAULT_SCAN_INTERVAL_MS,
            periodic_scan: true,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            headless: true,
            chromium_path: None,
            hooks: HookConfig::default(),
        }
    }
}

/// One switch per instrumentation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub fetch: bool,
    pub xhr: bool,
    pub create_buffer: bool,
    pub decode_audio_data: bool,
    pub buffer_source_start: bool,
    pub script_processor: bool,
    pub offline_render: bool,
    pub mutation_observer: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            fetch: true,
            xhr: true,
            create_buffer: true,
            decode_audio_data: true,
            buffer_source_start: true,
            script_processor: true,
            offline_render: true,
            mutation_observer: true,
        }
    }
}

impl HookConfig {
    /// Hook names accepted on the command line.
    pub const NAMES: [&'static str; 8] = [
        "fetch",
        "xhr",
        "create-buffer",
        "decode-audio-data",
        "buffer-source-start",
        "script-processor",
        "offline-render",
        "mutation-observer",
    ];

    /// Switch one hook by its command-line name.
    pub fn set(&mut self, name: &str, enabled: bool) -> Result<(), ConfigError> {
        let slot = match name {
            "fetch" => &mut self.fetch,
            "xhr" => &mut self.xhr,
            "create-buffer" => &mut self.create_buffer,
            "decode-audio-data" => &mut self.decode_audio_data,
            "buffer-source-start" => &mut self.buffer_source_start,
            "script-processor" => &mut self.script_processor,
            "offline-render" => &mut self.offline_render,
            "mutation-observer" => &mut self.mutation_observer,
            other => return Err(ConfigError::UnknownHook(other.to_string())),
        };
        *slot = enabled;
        Ok(())
    }
}

/// Resolve which config file to read, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("BLOBTAP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    None
}

impl EngineConfig {
    /// Load defaults, then the resolved config file, then env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `BLOBTAP_OUT_DIR` and `BLOBTAP_SCAN_INTERVAL_MS`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BLOBTAP_OUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BLOBTAP_SCAN_INTERVAL_MS") {
            self.scan_interval_ms = parse_interval("BLOBTAP_SCAN_INTERVAL_MS", &raw)?;
        }
        Ok(())
    }
}

/// Parse a positive millisecond interval.
pub fn parse_interval(key: &str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.scan_interval_ms, 2000);
        assert!(config.periodic_scan);
        assert!(config.headless);
        assert!(config.hooks.fetch && config.hooks.mutation_observer);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobtap.json");
        std::fs::write(
            &path,
            r#"{ "scan_interval_ms": 500, "hooks": { "xhr": false } }"#,
        )
        .unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.scan_interval_ms, 500);
        assert!(!config.hooks.xhr);
        assert!(config.hooks.fetch);
        assert_eq!(config.output_dir, PathBuf::from("captured"));
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = EngineConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BLOBTAP_OUT_DIR", "/tmp/out"),
            ("BLOBTAP_SCAN_INTERVAL_MS", "750"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.scan_interval_ms, 750);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(parse_interval("x", "0").is_err());
        assert!(parse_interval("x", "fast").is_err());
        assert_eq!(parse_interval("x", " 100 ").unwrap(), 100);
    }

    #[test]
    fn test_hook_names() {
        let mut hooks = HookConfig::default();
        for name in HookConfig::NAMES {
            hooks.set(name, false).unwrap();
        }
        assert_eq!(
            hooks,
            HookConfig {
                fetch: false,
                xhr: false,
                create_buffer: false,
                decode_audio_data: false,
                buffer_source_start: false,
                script_processor: false,
                offline_render: false,
                mutation_observer: false,
            }
        );
        assert!(matches!(hooks.set("eval", false), Err(ConfigError::UnknownHook(_))));
    }
}
