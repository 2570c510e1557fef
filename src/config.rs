//! Configuration management for the ddcbrightnessd daemon.
//!
//! Handles loading, parsing, and validation of the YAML configuration file
//! that controls how the external ddcutil tool is invoked and how writes
//! are paced.

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::RwLock;

use crate::event::ConfigChangeType;

/// Main configuration structure for the daemon.
///
/// Keys are kebab-case in the file and deliberately match the setting
/// names of the ddcutil ecosystem.
///
/// # Example
///
/// ```yaml
/// version: 1
/// ddcutil-binary-path: /usr/bin/ddcutil
/// ddcutil-sleep-multiplier: 0.5
/// ddcutil-queue-ms: 130
/// allow-zero-brightness: false
/// disable-display-state-check: false
/// vcp-codes: ["10", "6B"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Configuration version for compatibility checking.
    pub version: u8,

    /// Location of the ddcutil executable.
    #[serde(default = "defaults::ddcutil_binary_path")]
    pub ddcutil_binary_path: String,

    /// Extra arguments appended verbatim to every write command.
    #[serde(default)]
    pub ddcutil_additional_args: String,

    /// Forwarded to ddcutil to scale its internal DDC/CI delays.
    #[serde(default = "defaults::ddcutil_sleep_multiplier")]
    pub ddcutil_sleep_multiplier: f64,

    /// Post-write quiet window in milliseconds. Display firmware needs a
    /// minimum spacing between successive writes on one bus (~130 ms
    /// observed); writes issued faster are dropped or corrupted.
    #[serde(default = "defaults::ddcutil_queue_ms")]
    pub ddcutil_queue_ms: f64,

    /// Permit raw brightness 0; otherwise computed values <= 0 floor to 1.
    #[serde(default)]
    pub allow_zero_brightness: bool,

    /// Skip the power-state gate during discovery.
    #[serde(default)]
    pub disable_display_state_check: bool,

    /// Prioritized VCP feature codes to try for brightness queries.
    #[serde(default = "defaults::vcp_codes")]
    pub vcp_codes: Vec<String>,

    /// Serve discovery from a cached `detect --brief` blob when present,
    /// avoiding an expensive bus re-scan on every startup.
    #[serde(default = "defaults::cache_detect_output")]
    pub cache_detect_output: bool,

    /// Debounce window for collapsing repeated display-list rebuilds.
    #[serde(default = "defaults::menu_reload_debounce_ms")]
    pub menu_reload_debounce_ms: u64,

    /// Debounce window for full session reloads (teardown + rediscover).
    #[serde(default = "defaults::session_reload_debounce_ms")]
    pub session_reload_debounce_ms: u64,

    /// Raise the log level filter to Debug.
    #[serde(default)]
    pub verbose_debugging: bool,
}

mod defaults {
    pub fn ddcutil_binary_path() -> String {
        "ddcutil".to_string()
    }

    pub fn ddcutil_sleep_multiplier() -> f64 {
        1.0
    }

    pub fn ddcutil_queue_ms() -> f64 {
        130.0
    }

    pub fn vcp_codes() -> Vec<String> {
        vec!["10".to_string(), "6B".to_string()]
    }

    pub fn cache_detect_output() -> bool {
        true
    }

    pub fn menu_reload_debounce_ms() -> u64 {
        1000
    }

    pub fn session_reload_debounce_ms() -> u64 {
        1000
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            ddcutil_binary_path: defaults::ddcutil_binary_path(),
            ddcutil_additional_args: String::new(),
            ddcutil_sleep_multiplier: defaults::ddcutil_sleep_multiplier(),
            ddcutil_queue_ms: defaults::ddcutil_queue_ms(),
            allow_zero_brightness: false,
            disable_display_state_check: false,
            vcp_codes: defaults::vcp_codes(),
            cache_detect_output: defaults::cache_detect_output(),
            menu_reload_debounce_ms: defaults::menu_reload_debounce_ms(),
            session_reload_debounce_ms: defaults::session_reload_debounce_ms(),
            verbose_debugging: false,
        }
    }
}

impl Config {
    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.ddcutil_binary_path.trim().is_empty() {
            anyhow::bail!("ddcutil-binary-path must not be empty");
        }
        if !(self.ddcutil_sleep_multiplier > 0.0) {
            anyhow::bail!(
                "ddcutil-sleep-multiplier must be positive, got {}",
                self.ddcutil_sleep_multiplier
            );
        }
        if !(self.ddcutil_queue_ms >= 0.0) {
            anyhow::bail!("ddcutil-queue-ms must be non-negative");
        }
        if self.vcp_codes.is_empty() {
            anyhow::bail!("vcp-codes must list at least one candidate code");
        }
        Ok(())
    }

    /// Command line for a discovery scan.
    pub fn detect_argv(&self) -> Vec<String> {
        vec![
            self.ddcutil_binary_path.clone(),
            "detect".to_string(),
            "--brief".to_string(),
        ]
    }

    /// Command line for reading one VCP feature on one bus.
    pub fn getvcp_argv(&self, code: &str, bus: &str) -> Vec<String> {
        vec![
            self.ddcutil_binary_path.clone(),
            "getvcp".to_string(),
            "--brief".to_string(),
            code.to_string(),
            "--bus".to_string(),
            bus.to_string(),
            "--sleep-multiplier".to_string(),
            self.ddcutil_sleep_multiplier.to_string(),
        ]
    }

    /// Command line for writing one VCP feature on one bus. Additional
    /// arguments from the configuration are appended verbatim.
    pub fn setvcp_argv(&self, code: &str, raw: u16, bus: &str) -> Vec<String> {
        let mut argv = vec![
            self.ddcutil_binary_path.clone(),
            "setvcp".to_string(),
            code.to_string(),
            raw.to_string(),
            "--bus".to_string(),
            bus.to_string(),
            "--sleep-multiplier".to_string(),
            self.ddcutil_sleep_multiplier.to_string(),
        ];
        argv.extend(
            self.ddcutil_additional_args
                .split_whitespace()
                .map(str::to_string),
        );
        argv
    }

    /// Post-write quiet window as a duration.
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.ddcutil_queue_ms.max(0.0).round() as u64)
    }

    pub fn menu_reload_debounce(&self) -> Duration {
        Duration::from_millis(self.menu_reload_debounce_ms)
    }

    pub fn session_reload_debounce(&self) -> Duration {
        Duration::from_millis(self.session_reload_debounce_ms)
    }

    /// Names of the keys that differ between two configurations.
    pub fn changed_keys(&self, other: &Self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        if self.ddcutil_binary_path != other.ddcutil_binary_path {
            keys.push("ddcutil-binary-path");
        }
        if self.ddcutil_additional_args != other.ddcutil_additional_args {
            keys.push("ddcutil-additional-args");
        }
        if self.ddcutil_sleep_multiplier != other.ddcutil_sleep_multiplier {
            keys.push("ddcutil-sleep-multiplier");
        }
        if self.ddcutil_queue_ms != other.ddcutil_queue_ms {
            keys.push("ddcutil-queue-ms");
        }
        if self.allow_zero_brightness != other.allow_zero_brightness {
            keys.push("allow-zero-brightness");
        }
        if self.disable_display_state_check != other.disable_display_state_check {
            keys.push("disable-display-state-check");
        }
        if self.vcp_codes != other.vcp_codes {
            keys.push("vcp-codes");
        }
        if self.cache_detect_output != other.cache_detect_output {
            keys.push("cache-detect-output");
        }
        if self.menu_reload_debounce_ms != other.menu_reload_debounce_ms {
            keys.push("menu-reload-debounce-ms");
        }
        if self.session_reload_debounce_ms != other.session_reload_debounce_ms {
            keys.push("session-reload-debounce-ms");
        }
        if self.verbose_debugging != other.verbose_debugging {
            keys.push("verbose-debugging");
        }
        keys
    }
}

/// Keys whose change invalidates the current display list and requires a
/// full rediscovery; everything else is applied in place.
const REDISCOVER_KEYS: &[&str] = &[
    "ddcutil-binary-path",
    "disable-display-state-check",
    "vcp-codes",
    "cache-detect-output",
];

/// Classifies a set of changed keys into a reload strategy.
pub fn classify_changes(changed: Vec<&'static str>) -> ConfigChangeType {
    let rediscover: Vec<String> = changed
        .iter()
        .filter(|key| REDISCOVER_KEYS.contains(key))
        .map(|key| (*key).to_string())
        .collect();

    if rediscover.is_empty() {
        ConfigChangeType::HotReload
    } else {
        ConfigChangeType::Rediscover {
            changed_keys: rediscover,
        }
    }
}

fn locate_config() -> Result<PathBuf> {
    if let Ok(env_path) = env::var("DDCBRIGHTNESSD_CONFIG") {
        return Ok(PathBuf::from(env_path));
    }

    if let Some(mut cfg_dir) = env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
    {
        cfg_dir.push("ddcbrightnessd/config.yml");
        if cfg_dir.exists() {
            return Ok(cfg_dir);
        }
    }

    let etc = Path::new("/etc/ddcbrightnessd/config.yml");
    if etc.exists() {
        return Ok(etc.to_path_buf());
    }

    anyhow::bail!("Configuration file not found in any standard location")
}

/// Location of the cached `detect --brief` output.
pub fn detect_cache_path() -> PathBuf {
    let base = env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".cache")))
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("ddcbrightnessd/detect.txt")
}

/// Configuration manager that handles both config data and file operations.
///
/// Shared between services through `Arc`; readers take short read locks on
/// the inner config, the watcher replaces it wholesale on reload.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigManager {
    /// Creates a new ConfigManager with the given config and path.
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Loads configuration from a file or the standard locations.
    ///
    /// Searches in order: the provided path, `DDCBRIGHTNESSD_CONFIG`,
    /// `$XDG_CONFIG_HOME/ddcbrightnessd/config.yml`,
    /// `/etc/ddcbrightnessd/config.yml`.
    pub async fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => locate_config().context("No configuration file found")?,
        };

        info!("Loading config from: {}", config_path.display());
        let config = Self::load_config_from_path(&config_path).await?;

        Ok(Self::new(config, config_path))
    }

    /// Like [`load`](Self::load), but a missing file yields defaults so the
    /// daemon can run unconfigured. The resolved path is still recorded for
    /// the file watcher.
    pub async fn load_or_default(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(Some(p)).await,
            Some(p) => {
                info!("Config {} not found, using defaults", p.display());
                Ok(Self::new(Config::default(), p))
            }
            None => match locate_config() {
                Ok(p) => Self::load(Some(p)).await,
                Err(_) => {
                    let fallback = env::var_os("XDG_CONFIG_HOME")
                        .map(PathBuf::from)
                        .or_else(|| env::var_os("HOME").map(|h| Path::new(&h).join(".config")))
                        .unwrap_or_else(|| PathBuf::from("/etc"))
                        .join("ddcbrightnessd/config.yml");
                    info!("No config file found, using defaults");
                    Ok(Self::new(Config::default(), fallback))
                }
            },
        }
    }

    /// Gets a read-only reference to the current configuration.
    pub async fn get(&self) -> tokio::sync::RwLockReadGuard<'_, Config> {
        self.config.read().await
    }

    /// Returns the path to the configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reloads configuration from the same file.
    pub async fn reload(&self) -> Result<()> {
        info!("Reloading config from: {}", self.path.display());
        let new_config = Self::load_config_from_path(&self.path).await?;

        *self.config.write().await = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Clones the current configuration.
    ///
    /// Useful when a discovery pass needs a stable snapshot.
    pub async fn clone_config(&self) -> Config {
        self.config.read().await.clone()
    }

    /// Parses the on-disk file and classifies how it differs from the
    /// in-memory configuration, without applying anything.
    pub async fn analyze_config_changes(&self) -> Result<ConfigChangeType> {
        let on_disk = Self::load_config_from_path(&self.path).await?;
        let current = self.config.read().await;
        let changed = current.changed_keys(&on_disk);
        if !changed.is_empty() {
            info!("Changed configuration keys: {changed:?}");
        }
        Ok(classify_changes(changed))
    }

    async fn load_config_from_path(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML in: {}", path.display()))?;

        if config.version != 1 {
            anyhow::bail!(
                "Unsupported config version {} in file: {}",
                config.version,
                path.display()
            );
        }

        config
            .validate()
            .with_context(|| format!("Configuration validation failed for: {}", path.display()))?;

        Ok(config)
    }
}
