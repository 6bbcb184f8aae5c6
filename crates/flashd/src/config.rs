//! TOML configuration for flashd
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration: listen on 0.0.0.0:8000, find `openocd` on the search path,
//! stage uploads in the system temp directory.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flashd_api::state::DEFAULT_MAX_UPLOAD_BYTES;
use flashd_core::{EngineConfig, StagingArea, DEFAULT_CHANNEL_CAPACITY};
use serde::Deserialize;

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// OpenOCD settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProgrammerConfig {
    /// Explicit executable; searched on `PATH` when unset
    pub path: Option<PathBuf>,
    pub channel_capacity: usize,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            path: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub dir: Option<PathBuf>,
}

/// Top-level flashd configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlashdConfig {
    pub server: ServerConfig,
    pub programmer: ProgrammerConfig,
    pub staging: StagingConfig,
}

impl FlashdConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind, self.server.port)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            programmer: self.programmer.path.clone(),
            channel_capacity: self.programmer.channel_capacity,
        }
    }

    pub fn staging_area(&self) -> StagingArea {
        match &self.staging.dir {
            Some(dir) => StagingArea::new(dir),
            None => StagingArea::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = FlashdConfig::parse("").unwrap();
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:8000");
        assert_eq!(config.server.max_upload_bytes, 16 * 1024 * 1024);
        assert!(config.programmer.path.is_none());
        assert_eq!(config.engine_config().channel_capacity, 64);
        assert_eq!(config.staging_area().dir(), std::env::temp_dir());
    }

    #[test]
    fn test_partial_sections() {
        let config = FlashdConfig::parse(
            r#"
            [server]
            port = 9000

            [programmer]
            path = "/opt/openocd/bin/openocd"

            [staging]
            dir = "/var/tmp/flashd"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:9000");
        assert_eq!(
            config.engine_config().programmer,
            Some(PathBuf::from("/opt/openocd/bin/openocd"))
        );
        assert_eq!(config.programmer.channel_capacity, 64);
        assert_eq!(config.staging_area().dir(), Path::new("/var/tmp/flashd"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flashd.toml");
        std::fs::write(&path, "[server]\nport = \"nope\"\n").unwrap();

        let err = FlashdConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("flashd.toml"));

        assert!(FlashdConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
