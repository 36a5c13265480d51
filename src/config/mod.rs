//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`GSSLAYER_*`)
//! - CLI arguments (for `gss-server`)
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 44444
//! service = "TestService"
//!
//! [keytab]
//! path = "/etc/gsslayer.keytab"
//!
//! [transport]
//! max_token_len = 1048576
//! read_timeout_secs = 30
//!
//! [context]
//! lifetime_secs = 28800
//! mutual_required = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GssError, Result};
use crate::flags::FlagSet;
use crate::transport::TransportConfig;

/// Default acceptor port
pub const DEFAULT_PORT: u16 = 44444;

/// Default service name
pub const DEFAULT_SERVICE: &str = "TestService";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Keytab location
    #[serde(default)]
    pub keytab: KeytabConfig,

    /// Token transport limits
    #[serde(default)]
    pub transport: TransportConfig,

    /// Security context policy
    #[serde(default)]
    pub context: ContextConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GssError::Config(format!("Failed to read config file {}: {e}", path.display())))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GssError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Override fields from `GSSLAYER_*` environment variables
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from `GSSLAYER_*` variables looked up through `var`
    #[must_use]
    pub fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = var("GSSLAYER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("GSSLAYER_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid GSSLAYER_PORT"),
            }
        }
        if let Some(service) = var("GSSLAYER_SERVICE") {
            self.server.service = service;
        }
        if let Some(path) = var("GSSLAYER_KTNAME") {
            self.keytab.path = PathBuf::from(path);
        }
        self
    }

    /// Check values that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if self.server.service.is_empty() {
            return Err(GssError::Config("server.service must not be empty".to_string()));
        }
        if self.transport.max_token_len == 0 {
            return Err(GssError::Config("transport.max_token_len must be positive".to_string()));
        }
        if self.context.lifetime_secs == 0 {
            return Err(GssError::Config("context.lifetime_secs must be positive".to_string()));
        }
        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Service name to acquire credentials for
    pub service: String,

    /// Serve a single connection and exit
    pub once: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            service: DEFAULT_SERVICE.to_string(),
            once: false,
        }
    }
}

impl ServerConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Keytab location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeytabConfig {
    /// Path of the keytab file
    pub path: PathBuf,
}

impl Default for KeytabConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gsslayer.keytab"),
        }
    }
}

/// Security context policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound on context lifetime in seconds
    pub lifetime_secs: u64,

    /// Deny contexts without mutual authentication
    pub mutual_required: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: 8 * 60 * 60,
            mutual_required: false,
        }
    }
}

impl ContextConfig {
    /// Context lifetime bound
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.lifetime_secs)
    }

    /// Flags every context must grant
    pub fn required_flags(&self) -> FlagSet {
        if self.mutual_required {
            FlagSet::from_bits(FlagSet::MUTUAL)
        } else {
            FlagSet::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 44444);
        assert_eq!(config.server.service, "TestService");
        assert_eq!(config.transport.max_token_len, 1024 * 1024);
        assert_eq!(config.context.lifetime(), Duration::from_secs(28800));
        assert!(config.context.required_flags().is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(ServerConfig::default().listen_addr(), "0.0.0.0:44444");
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [server]
            port = 5555
            service = "HTTP"

            [keytab]
            path = "/etc/krb5.keytab"

            [transport]
            max_token_len = 65536
            read_timeout_secs = 10

            [context]
            mutual_required = true
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 5555);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.service, "HTTP");
        assert_eq!(config.keytab.path, PathBuf::from("/etc/krb5.keytab"));
        assert_eq!(config.transport.max_token_len, 65536);
        assert_eq!(config.transport.read_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.context.lifetime_secs, 28800);
        assert!(config.context.required_flags().contains(FlagSet::MUTUAL));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 6000").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 6000);
    }

    #[test]
    fn test_from_file_errors() {
        assert!(matches!(
            Config::from_file("/nonexistent/gsslayer.toml"),
            Err(GssError::Config(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nservice = \"\"").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GSSLAYER_PORT", "7000"),
            ("GSSLAYER_SERVICE", "host"),
            ("GSSLAYER_KTNAME", "/tmp/test.keytab"),
        ]
        .into_iter()
        .collect();
        let config = Config::default().with_vars(|k| vars.get(k).map(|v| (*v).to_string()));
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.service, "host");
        assert_eq!(config.keytab.path, PathBuf::from("/tmp/test.keytab"));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_env_port_ignored() {
        let config = Config::default().with_vars(|k| (k == "GSSLAYER_PORT").then(|| "abc".to_string()));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }
}
