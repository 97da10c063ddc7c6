//! Configuration module for the line-echo server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::SessionConfig;

/// Command-line arguments for the echo server
#[derive(Parser, Debug)]
#[command(name = "line-echo")]
#[command(author = "line-echo authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP text-echo server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:6666)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Stop the server after this many seconds (runs until Ctrl-C if unset)
    #[arg(long)]
    pub run_for: Option<u64>,

    /// Seconds a client may stay silent before it is timed out
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Size of the per-connection read buffer in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionTomlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Run duration in seconds
    pub run_for: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            run_for: None,
        }
    }
}

/// Per-connection configuration
#[derive(Debug, Deserialize)]
pub struct SessionTomlConfig {
    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    /// Read buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for SessionTomlConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:6666".to_string()
}

fn default_idle_timeout() -> u64 {
    15
}

fn default_buffer_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub workers: Option<usize>,
    pub run_for: Option<Duration>,
    pub idle_timeout: Duration,
    pub buffer_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let idle_timeout = cli
            .idle_timeout
            .unwrap_or(toml_config.session.idle_timeout);
        if idle_timeout == 0 {
            return Err(ConfigError::Invalid("idle_timeout must be at least 1 second"));
        }

        let buffer_size = cli.buffer_size.unwrap_or(toml_config.session.buffer_size);
        if buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be non-zero"));
        }

        if cli.workers.or(toml_config.server.workers) == Some(0) {
            return Err(ConfigError::Invalid("workers must be non-zero"));
        }

        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            workers: cli.workers.or(toml_config.server.workers),
            run_for: cli
                .run_for
                .or(toml_config.server.run_for)
                .map(Duration::from_secs),
            idle_timeout: Duration::from_secs(idle_timeout),
            buffer_size,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Per-connection settings handed to every session.
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout,
            buffer_size: self.buffer_size,
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["line-echo"];
        argv.extend_from_slice(args);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:6666");
        assert_eq!(config.server.run_for, None);
        assert_eq!(config.session.idle_timeout, 15);
        assert_eq!(config.session.buffer_size, 4096);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:7000"
            workers = 4
            run_for = 60

            [session]
            idle_timeout = 30
            buffer_size = 1024

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7000");
        assert_eq!(config.server.workers, Some(4));
        assert_eq!(config.server.run_for, Some(60));
        assert_eq!(config.session.idle_timeout, 30);
        assert_eq!(config.session.buffer_size, 1024);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[session]\nidle_timeout = 5\n").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:6666");
        assert_eq!(config.session.idle_timeout, 5);
        assert_eq!(config.session.buffer_size, 4096);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:7000"
            run_for = 60

            [session]
            idle_timeout = 30

            [logging]
            level = "warn"
            "#,
        )
        .unwrap();

        let config = Config::merge(
            cli(&["--listen", "127.0.0.1:8000", "--idle-timeout", "5", "--log-level", "trace"]),
            toml_config,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:8000");
        assert_eq!(config.run_for, Some(Duration::from_secs(60)));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_session_config() {
        let config = Config::merge(cli(&[]), TomlConfig::default()).unwrap();
        let session = config.session();
        assert_eq!(session.idle_timeout, Duration::from_secs(15));
        assert_eq!(session.buffer_size, 4096);
    }

    #[test]
    fn test_rejects_zero_values() {
        let err = Config::merge(cli(&["--idle-timeout", "0"]), TomlConfig::default());
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = Config::merge(cli(&["--buffer-size", "0"]), TomlConfig::default());
        assert!(matches!(err, Err(ConfigError::Invalid(_))));

        let err = Config::merge(cli(&["--workers", "0"]), TomlConfig::default());
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
