//! Discovery settings
//!
//! Defaults reproduce the protocol behaviour expected by UPnP devices:
//! a 3 s listening window, three identical M-SEARCH datagrams, `MX: 3`.
//! Applications embedding the library can carry a `ssdp:` section in their
//! own YAML configuration and hand it to [`SsdpConfig::from_yaml_str`].

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default listening window after the M-SEARCH burst (milliseconds)
pub const DEFAULT_SEARCH_WINDOW_MS: u64 = 3000;

/// Number of identical M-SEARCH datagrams sent per search
pub const DEFAULT_SEND_COUNT: u32 = 3;

/// MX header value advertised to responders
pub const DEFAULT_MX: u32 = 3;

/// Size of the per-search receive buffer
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 8192;

/// Timeout for one device description GET (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// User-Agent used for device description requests
pub const DEFAULT_USER_AGENT: &str = "PMOMusic/0.1 (pmossdp)";

const ENV_SEARCH_WINDOW_MS: &str = "PMOSSDP_SEARCH_WINDOW_MS";
const ENV_HTTP_TIMEOUT_SECS: &str = "PMOSSDP_HTTP_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SsdpConfig {
    pub search_window_ms: u64,
    pub send_count: u32,
    pub mx: u32,
    pub recv_buffer_size: usize,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            search_window_ms: DEFAULT_SEARCH_WINDOW_MS,
            send_count: DEFAULT_SEND_COUNT,
            mx: DEFAULT_MX,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SsdpConfig {
    /// Charge une configuration depuis un fragment YAML.
    ///
    /// Les clés absentes prennent leur valeur par défaut.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SsdpConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Valeurs par défaut, surchargées par les variables d'environnement
    /// `PMOSSDP_SEARCH_WINDOW_MS` et `PMOSSDP_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = SsdpConfig::default();

        if let Ok(value) = env::var(ENV_SEARCH_WINDOW_MS) {
            config.search_window_ms = value
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{ENV_SEARCH_WINDOW_MS}={value}")))?;
            debug!("Search window overridden from environment: {} ms", config.search_window_ms);
        }

        if let Ok(value) = env::var(ENV_HTTP_TIMEOUT_SECS) {
            config.http_timeout_secs = value
                .trim()
                .parse()
                .map_err(|_| Error::config(format!("{ENV_HTTP_TIMEOUT_SECS}={value}")))?;
            debug!("HTTP timeout overridden from environment: {} s", config.http_timeout_secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search_window_ms == 0 {
            return Err(Error::config("search_window_ms must be > 0"));
        }
        if self.send_count == 0 {
            return Err(Error::config("send_count must be > 0"));
        }
        if self.recv_buffer_size == 0 {
            return Err(Error::config("recv_buffer_size must be > 0"));
        }
        Ok(())
    }

    pub fn search_window(&self) -> Duration {
        Duration::from_millis(self.search_window_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SsdpConfig::default();
        assert_eq!(config.search_window(), Duration::from_millis(3000));
        assert_eq!(config.send_count, 3);
        assert_eq!(config.mx, 3);
        assert_eq!(config.recv_buffer_size, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = SsdpConfig::from_yaml_str("search_window_ms: 1500\nhttp_timeout_secs: 2\n").unwrap();
        assert_eq!(config.search_window_ms, 1500);
        assert_eq!(config.http_timeout(), Duration::from_secs(2));
        assert_eq!(config.send_count, DEFAULT_SEND_COUNT);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_invalid_yaml_values_are_rejected() {
        assert!(matches!(
            SsdpConfig::from_yaml_str("send_count: 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SsdpConfig::from_yaml_str("search_window_ms: [1, 2]"),
            Err(Error::Yaml(_))
        ));
    }
}
