//! TOML configuration for `matrixd`.
//!
//! Read from `$XDG_CONFIG_HOME/matrixd/config.toml` (falling back to
//! `~/.config/matrixd/config.toml`) unless a path is given on the command
//! line.  Every field has a default, so an empty or missing file yields a
//! server for one 32×32 panel listening on port 8080:
//!
//! ```toml
//! [matrix]
//! rows = 32
//! columns = 32
//! chain_length = 1
//! parallel = 1
//! brightness = 100
//! pwm_bits = 11
//! pwm_lsb_nanoseconds = 130
//!
//! [network]
//! listen = "0.0.0.0:8080"
//! read_timeout_secs = 0      # 0 disables the idle-client timeout
//!
//! [idle]
//! pattern = "frame"          # frame | blank | solid
//! color = [64, 0, 0]
//!
//! [logging]
//! level = "info"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use matrix_core::{Geometry, Rgba};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::idle::{IdlePattern, DEFAULT_IDLE_COLOR};
use crate::infrastructure::display::MatrixOptions;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor `HOME` is set.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `network.listen` is neither a socket address nor a resolvable
    /// `host:port`.
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Panel arrangement and electrical options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatrixConfig {
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
    #[serde(default = "default_chain_length")]
    pub chain_length: u32,
    #[serde(default = "default_parallel")]
    pub parallel: u32,
    /// Percentage, 1–100.
    #[serde(default = "default_brightness")]
    pub brightness: u8,
    #[serde(default = "default_pwm_bits")]
    pub pwm_bits: u8,
    #[serde(default = "default_pwm_lsb_nanoseconds")]
    pub pwm_lsb_nanoseconds: u32,
    /// Swap pacing for the headless backend; 0 swaps immediately.
    #[serde(default)]
    pub headless_refresh_hz: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// `host:port` to accept clients on.  A bare `:port` binds all interfaces.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Ends a session whose client sends nothing for this long.  0 disables.
    #[serde(default)]
    pub read_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdleConfig {
    #[serde(default)]
    pub pattern: IdlePattern,
    /// `[r, g, b]`
    #[serde(default = "default_idle_color")]
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_rows() -> u32 {
    MatrixOptions::DEFAULT.geometry.rows
}
fn default_columns() -> u32 {
    MatrixOptions::DEFAULT.geometry.columns
}
fn default_chain_length() -> u32 {
    MatrixOptions::DEFAULT.geometry.chain_length
}
fn default_parallel() -> u32 {
    MatrixOptions::DEFAULT.geometry.parallel
}
fn default_brightness() -> u8 {
    MatrixOptions::DEFAULT.brightness
}
fn default_pwm_bits() -> u8 {
    MatrixOptions::DEFAULT.pwm_bits
}
fn default_pwm_lsb_nanoseconds() -> u32 {
    MatrixOptions::DEFAULT.pwm_lsb_nanoseconds
}
fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_idle_color() -> [u8; 3] {
    let (r, g, b) = DEFAULT_IDLE_COLOR.to_rgb();
    [r, g, b]
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            columns: default_columns(),
            chain_length: default_chain_length(),
            parallel: default_parallel(),
            brightness: default_brightness(),
            pwm_bits: default_pwm_bits(),
            pwm_lsb_nanoseconds: default_pwm_lsb_nanoseconds(),
            headless_refresh_hz: 0,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            read_timeout_secs: 0,
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            pattern: IdlePattern::default(),
            color: default_idle_color(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl MatrixConfig {
    pub fn options(&self) -> MatrixOptions {
        MatrixOptions {
            geometry: Geometry::new(self.rows, self.columns, self.chain_length, self.parallel),
            brightness: self.brightness,
            pwm_bits: self.pwm_bits,
            pwm_lsb_nanoseconds: self.pwm_lsb_nanoseconds,
        }
    }
}

impl NetworkConfig {
    /// Resolves [`listen`](Self::listen).  Host names go through the system
    /// resolver and the first address wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if it is not `host:port` or
    /// `:port`, or the host does not resolve.
    pub async fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = self.listen.trim();
        let full = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        };
        let mut resolved = tokio::net::lookup_host(full.as_str())
            .await
            .map_err(|source| ConfigError::InvalidAddress {
                addr: self.listen.clone(),
                source,
            })?;
        resolved.next().ok_or_else(|| ConfigError::InvalidAddress {
            addr: self.listen.clone(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses"),
        })
    }

    /// `None` when the timeout is disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }
}

impl IdleConfig {
    pub fn color(&self) -> Rgba {
        Rgba::from(self.color)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves `$XDG_CONFIG_HOME/matrixd/config.toml`.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("matrixd").join("config.toml"))
}

/// Loads the config at `path`, or returns defaults if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no config file at {}; using defaults", path.display());
            Ok(ServerConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_core::Size;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_default_config_is_single_panel_on_port_8080() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.matrix.options(), MatrixOptions::DEFAULT);
        assert_eq!(cfg.network.listen_addr().await.unwrap().port(), 8080);
        assert_eq!(cfg.network.read_timeout(), None);
        assert_eq!(cfg.idle.pattern, IdlePattern::Frame);
        assert_eq!(cfg.idle.color(), Rgba::rgb(0x40, 0, 0));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_partial_matrix_section_overrides_only_given_fields() {
        // Arrange
        let toml_str = r#"
[matrix]
chain_length = 3
brightness = 50

[idle]
pattern = "blank"
"#;

        // Act
        let cfg: ServerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.matrix.chain_length, 3);
        assert_eq!(cfg.matrix.brightness, 50);
        assert_eq!(cfg.matrix.rows, 32);
        assert_eq!(cfg.idle.pattern, IdlePattern::Blank);
        assert_eq!(cfg.matrix.options().validate(), Ok(Size::new(96, 32)));
    }

    #[test]
    fn test_unknown_idle_pattern_is_a_parse_error() {
        let result: Result<ServerConfig, _> = toml::from_str("[idle]\npattern = \"spiral\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.network.read_timeout_secs = 30;
        cfg.idle.pattern = IdlePattern::Solid;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ServerConfig = toml::from_str(&text).expect("deserialize");

        assert_eq!(restored, cfg);
        assert_eq!(restored.network.read_timeout(), Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_bare_port_listen_binds_all_interfaces() {
        let net = NetworkConfig {
            listen: ":9000".to_string(),
            read_timeout_secs: 0,
        };
        assert_eq!(net.listen_addr().await.unwrap().to_string(), "0.0.0.0:9000");
    }

    #[tokio::test]
    async fn test_host_name_listen_address_is_resolved() {
        // Arrange
        let net = NetworkConfig {
            listen: "localhost:8080".to_string(),
            read_timeout_secs: 0,
        };

        // Act
        let addr = net.listen_addr().await.expect("localhost resolves");

        // Assert
        assert_eq!(addr.port(), 8080);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_invalid_listen_address_is_rejected() {
        let net = NetworkConfig {
            listen: "not-an-address".to_string(),
            read_timeout_secs: 0,
        };
        assert!(matches!(
            net.listen_addr().await,
            Err(ConfigError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join(format!("matrixd-missing-{}.toml", Uuid::new_v4()));
        let cfg = load_config(&path).expect("missing file is not an error");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        // Arrange
        let path = std::env::temp_dir().join(format!("matrixd-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[network]\nlisten = \"127.0.0.1:7000\"\n").expect("write temp config");

        // Act
        let cfg = load_config(&path);
        let _ = std::fs::remove_file(&path);

        // Assert
        let cfg = cfg.expect("load");
        assert_eq!(cfg.network.listen, "127.0.0.1:7000");
    }

    #[test]
    fn test_load_malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!("matrixd-bad-{}.toml", Uuid::new_v4()));
        std::fs::write(&path, "[[[ not valid toml").expect("write temp config");

        let result = load_config(&path);
        let _ = std::fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
