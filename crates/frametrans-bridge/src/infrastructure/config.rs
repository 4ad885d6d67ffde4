//! TOML-based configuration for the frame sender.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\FrameTrans\config.toml`
//! - Linux:    `~/.config/frametrans/config.toml`
//! - macOS:    `~/Library/Application Support/FrameTrans/config.toml`
//!
//! ```toml
//! log_level = "info"
//!
//! [transport]
//! name = "dummy"
//! plugin_dirs = ["/usr/lib/frametrans"]
//! receiver = "localhost"
//! port = 4242
//!
//! [encoding]
//! quality = 80
//! subsamp = 2
//! ```
//!
//! Every field has a default (`#[serde(default = ...)]`), so a missing file,
//! a missing section, or a missing key all fall back to the values below.
//!
//! Two environment variables override the file:
//!
//! | Variable               | Effect                              |
//! |------------------------|-------------------------------------|
//! | `FRAMETRANS_TRANSPORT` | replaces `transport.name`           |
//! | `FRAMETRANS_PROFILE`   | `1` turns on `profile.enabled`      |

use std::path::{Path, PathBuf};

use frametrans_core::{PixelFormat, TransportParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::frame_pump::FrameSpec;

/// Environment variable naming the transport.
pub const ENV_TRANSPORT: &str = "FRAMETRANS_TRANSPORT";
/// Environment variable enabling the profiler when set to `1`.
pub const ENV_PROFILE: &str = "FRAMETRANS_PROFILE";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub encoding: EncodingConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub frame: FrameConfig,
}

/// Which transport to open and where to send its frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Transport name; built-in or a `frametrans_<name>` module.
    #[serde(default = "default_transport")]
    pub name: String,
    /// Directories searched for transport modules before the system path.
    #[serde(default)]
    pub plugin_dirs: Vec<PathBuf>,
    /// Receiver host name or address.
    #[serde(default = "default_receiver")]
    pub receiver: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Encoder settings forwarded to the back-end's `init`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodingConfig {
    /// Back-end defined compression scheme (0 = back-end default).
    #[serde(default)]
    pub compress: i32,
    /// Lossy quality, 1–100.
    #[serde(default = "default_quality")]
    pub quality: i32,
    /// Chroma subsampling: 0 (grayscale), 1, 2 or 4.
    #[serde(default = "default_one")]
    pub subsamp: i32,
    #[serde(default = "default_one")]
    pub threads: i32,
    /// Drop frames the back-end cannot keep up with.
    #[serde(default = "default_true")]
    pub spoil: bool,
}

/// Throughput profiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds of frame time between reports.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
}

/// Geometry of the frames the sender requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameConfig {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
    #[serde(default = "default_format")]
    pub format: PixelFormat,
    #[serde(default)]
    pub stereo: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_transport() -> String {
    frametrans_dummy::TRANSPORT_NAME.to_string()
}
fn default_receiver() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    4242
}
fn default_quality() -> i32 {
    95
}
fn default_one() -> i32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> f64 {
    2.0
}
fn default_width() -> i32 {
    640
}
fn default_height() -> i32 {
    480
}
fn default_format() -> PixelFormat {
    PixelFormat::Rgb
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            transport: TransportConfig::default(),
            encoding: EncodingConfig::default(),
            profile: ProfileConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            name: default_transport(),
            plugin_dirs: Vec::new(),
            receiver: default_receiver(),
            port: default_port(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            compress: 0,
            quality: default_quality(),
            subsamp: default_one(),
            threads: default_one(),
            spoil: default_true(),
        }
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            format: default_format(),
            stereo: false,
        }
    }
}

impl EncodingConfig {
    /// Builds the block handed to the back-end's `init`.  `port` becomes the
    /// default receiver port.
    pub fn to_params(&self, port: u16) -> TransportParams {
        TransportParams {
            compress: self.compress,
            quality: self.quality,
            subsamp: self.subsamp,
            threads: self.threads,
            spoil: i32::from(self.spoil),
            port: i32::from(port),
            verbose: 0,
        }
    }
}

impl FrameConfig {
    pub fn to_spec(&self) -> FrameSpec {
        FrameSpec {
            width: self.width,
            height: self.height,
            format: self.format,
            stereo: self.stereo,
        }
    }
}

impl AppConfig {
    /// Applies environment overrides.  `lookup` is normally
    /// `|key| std::env::var(key).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup(ENV_TRANSPORT).filter(|name| !name.is_empty()) {
            self.transport.name = name;
        }
        if lookup(ENV_PROFILE).is_some_and(|value| value.starts_with('1')) {
            self.profile.enabled = true;
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory, including the `FrameTrans`
/// subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("FrameTrans"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("frametrans"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("FrameTrans")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "frametrans-config-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_selects_dummy_transport() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.transport.name, "dummy");
        assert_eq!(cfg.transport.receiver, "localhost");
        assert_eq!(cfg.transport.port, 4242);
        assert!(cfg.transport.plugin_dirs.is_empty());
    }

    #[test]
    fn test_default_encoding_matches_default_transport_params() {
        let params = EncodingConfig::default().to_params(4242);
        assert_eq!(params, TransportParams::default());
    }

    #[test]
    fn test_profile_is_disabled_by_default() {
        let cfg = ProfileConfig::default();
        assert!(!cfg.enabled);
        assert_eq!(cfg.interval_secs, 2.0);
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_given_keys() {
        // Arrange
        let toml_str = r#"
log_level = "debug"

[transport]
name = "vnc"
plugin_dirs = ["/usr/lib/frametrans"]

[encoding]
quality = 80
spoil = false

[frame]
width = 1920
format = "bgra"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.transport.name, "vnc");
        assert_eq!(cfg.transport.plugin_dirs, vec![PathBuf::from("/usr/lib/frametrans")]);
        assert_eq!(cfg.transport.port, 4242);
        assert_eq!(cfg.encoding.quality, 80);
        assert!(!cfg.encoding.spoil);
        assert_eq!(cfg.encoding.subsamp, 1);
        assert_eq!(cfg.frame.width, 1920);
        assert_eq!(cfg.frame.height, 480);
        assert_eq!(cfg.frame.format, PixelFormat::Bgra);
    }

    #[test]
    fn test_unknown_pixel_format_is_a_parse_error() {
        let result: Result<AppConfig, toml::de::Error> =
            toml::from_str("[frame]\nformat = \"yuv\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_to_params_maps_encoding_fields() {
        // Arrange
        let encoding = EncodingConfig {
            compress: 2,
            quality: 60,
            subsamp: 4,
            threads: 8,
            spoil: false,
        };

        // Act
        let params = encoding.to_params(5900);

        // Assert
        assert_eq!(params.compress, 2);
        assert_eq!(params.quality, 60);
        assert_eq!(params.subsamp, 4);
        assert_eq!(params.threads, 8);
        assert_eq!(params.spoil, 0);
        assert_eq!(params.port, 5900);
    }

    #[test]
    fn test_frame_config_to_spec() {
        let frame = FrameConfig {
            width: 64,
            height: 32,
            format: PixelFormat::Argb,
            stereo: true,
        };
        let spec = frame.to_spec();
        assert_eq!((spec.width, spec.height), (64, 32));
        assert_eq!(spec.format, PixelFormat::Argb);
        assert!(spec.stereo);
    }

    // ── Environment overrides ─────────────────────────────────────────────────

    #[test]
    fn test_env_overrides_replace_transport_and_enable_profiling() {
        // Arrange
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_TRANSPORT, "vnc"), (ENV_PROFILE, "1")]);
        let mut cfg = AppConfig::default();

        // Act
        cfg.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        // Assert
        assert_eq!(cfg.transport.name, "vnc");
        assert!(cfg.profile.enabled);
    }

    #[test]
    fn test_env_overrides_ignore_empty_and_non_one_values() {
        let env: HashMap<&str, &str> = HashMap::from([(ENV_TRANSPORT, ""), (ENV_PROFILE, "0")]);
        let mut cfg = AppConfig::default();

        cfg.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(cfg, AppConfig::default());
    }

    // ── File access ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_from_missing_file_returns_defaults() {
        let path = scratch_dir("missing").join("config.toml");
        let cfg = load_config_from(&path).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_config() {
        // Arrange
        let path = scratch_dir("save").join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.transport.name = "vnc".to_string();
        cfg.encoding.threads = 4;

        // Act
        save_config_to(&cfg, &path).expect("save");
        let loaded = load_config_from(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(path.parent().and_then(Path::parent).expect("dir"));
    }

    #[test]
    fn test_load_config_from_malformed_file_returns_parse_error() {
        // Arrange
        let dir = scratch_dir("malformed");
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").expect("write");

        // Act
        let result = load_config_from(&path);

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
