//! Configuration file management for relay.
//!
//! Provides a TOML-based config file at `~/.config/relay/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9100;
pub const DEFAULT_CODEX_BINARY: &str = "codex";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub server: ServerSection,
    #[serde(default)]
    pub codex: CodexSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CodexSection {
    pub binary: String,
}

impl Default for CodexSection {
    fn default() -> Self {
        Self {
            binary: DEFAULT_CODEX_BINARY.to_string(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the relay config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/relay` or `~/.config/relay`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("relay");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("relay")
}

/// Return the path to the relay config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub codex_binary: String,
}

impl RelayConfig {
    /// Resolve configuration using the chain: CLI flag > env var >
    /// config file > default.
    ///
    /// - Host: `cli_host` > `RELAY_HOST` > `server.host` > `127.0.0.1`
    /// - Port: `cli_port` > `AGENT_PORT` > `server.port` > `9100`
    ///   (`AGENT_PORT` is the orchestrator's spawn contract)
    /// - Codex binary: `cli_binary` > `RELAY_CODEX_BINARY` >
    ///   `codex.binary` > `codex`
    pub fn resolve(
        cli_host: Option<&str>,
        cli_port: Option<u16>,
        cli_binary: Option<&str>,
    ) -> Result<Self> {
        let file_config = load_config().ok();

        let host = if let Some(host) = cli_host {
            host.to_string()
        } else if let Ok(host) = std::env::var("RELAY_HOST") {
            host
        } else if let Some(ref cfg) = file_config {
            cfg.server.host.clone()
        } else {
            DEFAULT_HOST.to_string()
        };

        let port = if let Some(port) = cli_port {
            port
        } else if let Ok(raw) = std::env::var("AGENT_PORT") {
            raw.parse()
                .with_context(|| format!("AGENT_PORT env var is not a valid port: {raw}"))?
        } else if let Some(ref cfg) = file_config {
            cfg.server.port
        } else {
            DEFAULT_PORT
        };

        let codex_binary = if let Some(binary) = cli_binary {
            binary.to_string()
        } else if let Ok(binary) = std::env::var("RELAY_CODEX_BINARY") {
            binary
        } else if let Some(ref cfg) = file_config {
            cfg.codex.binary.clone()
        } else {
            DEFAULT_CODEX_BINARY.to_string()
        };

        Ok(Self {
            host,
            port,
            codex_binary,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
