//! Point d'entrée de la découverte : [`SsdpClient`]
//!
//! # Example
//!
//! ```no_run
//! use pmossdp::SsdpClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = SsdpClient::new()?;
//!
//!     for device in client.search_upnp_devices("MediaRenderer", 1).await? {
//!         println!("{} ({}) at {}", device.friendly_name, device.udn, device.url_base);
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use pmoutils::{InterfaceSource, SystemInterfaces, list_local_addresses_from};
use reqwest::Client;
use tracing::info;

use crate::config::SsdpConfig;
use crate::description::{Device, fetch_all_descriptions};
use crate::error::{Error, Result};
use crate::notification::{DeviceNotification, parse_notifications};
use crate::search::{SsdpResponse, search_all};

/// Préfixe des URN de types de devices standard
pub const UPNP_DEVICE_URN_PREFIX: &str = "urn:schemas-upnp-org:device:";

/// Version de type de device utilisée par défaut
pub const DEFAULT_DEVICE_VERSION: u32 = 1;

/// Forme l'URN canonique `urn:schemas-upnp-org:device:{type}:{version}`.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     pmossdp::upnp_device_urn("MediaRenderer", 1).unwrap(),
///     "urn:schemas-upnp-org:device:MediaRenderer:1"
/// );
/// ```
pub fn upnp_device_urn(device_type: &str, version: u32) -> Result<String> {
    if device_type.is_empty()
        || device_type.contains(':')
        || device_type.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(Error::InvalidDeviceType(format!("{device_type:?}")));
    }
    if version == 0 {
        return Err(Error::InvalidDeviceType(format!(
            "{device_type}: version must be >= 1"
        )));
    }
    Ok(format!("{UPNP_DEVICE_URN_PREFIX}{device_type}:{version}"))
}

// The ST value is copied verbatim into the request; a line break would
// inject extra headers.
fn validate_search_target(st: &str) -> Result<()> {
    if st.trim().is_empty() || st.chars().any(|c| c.is_control()) {
        return Err(Error::InvalidSearchTarget(st.to_string()));
    }
    Ok(())
}

/// Client de découverte SSDP / UPnP.
///
/// Stateless: every call enumerates the interfaces again, searches during one
/// window and returns a fully materialized result set.
#[derive(Clone)]
pub struct SsdpClient {
    config: SsdpConfig,
    http: Client,
    interfaces: Arc<dyn InterfaceSource>,
}

impl std::fmt::Debug for SsdpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsdpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SsdpClient {
    /// Client avec la configuration par défaut et les interfaces du système
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> SsdpClientBuilder {
        SsdpClientBuilder::default()
    }

    pub fn config(&self) -> &SsdpConfig {
        &self.config
    }

    pub fn http_client(&self) -> &Client {
        &self.http
    }

    /// Réponses brutes à un M-SEARCH, toutes interfaces confondues.
    pub async fn search_responses(&self, search_target: &str) -> Result<Vec<SsdpResponse>> {
        validate_search_target(search_target)?;

        let addresses = list_local_addresses_from(self.interfaces.as_ref());
        info!(
            "🔍 SSDP search ST={} on {} local address(es)",
            search_target,
            addresses.len()
        );

        Ok(search_all(addresses, search_target, &self.config).await)
    }

    /// Notifications distinctes (par USN) répondant au type demandé.
    pub async fn search_devices(&self, device_type: &str) -> Result<Vec<DeviceNotification>> {
        let responses = self.search_responses(device_type).await?;
        Ok(parse_notifications(&responses))
    }

    /// Devices UPnP complets pour `urn:schemas-upnp-org:device:{device_type}:{device_version}`.
    pub async fn search_upnp_devices(
        &self,
        device_type: &str,
        device_version: u32,
    ) -> Result<Vec<Device>> {
        let urn = upnp_device_urn(device_type, device_version)?;
        let notifications = self.search_devices(&urn).await?;
        Ok(self.describe(&notifications).await)
    }

    /// Récupère les descriptions d'un lot de notifications déjà obtenues.
    pub async fn describe(&self, notifications: &[DeviceNotification]) -> Vec<Device> {
        fetch_all_descriptions(&self.http, notifications).await
    }
}

#[derive(Default)]
pub struct SsdpClientBuilder {
    config: Option<SsdpConfig>,
    http: Option<Client>,
    interfaces: Option<Arc<dyn InterfaceSource>>,
}

impl SsdpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SsdpConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Client HTTP partagé (pool de connexions, proxy...).
    ///
    /// `http_timeout_secs` et `user_agent` de la configuration ne
    /// s'appliquent alors pas.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Remplace l'énumération des interfaces du système.
    pub fn interfaces(mut self, source: impl InterfaceSource + 'static) -> Self {
        self.interfaces = Some(Arc::new(source));
        self
    }

    pub fn build(self) -> Result<SsdpClient> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let http = match self.http {
            Some(client) => client,
            None => Client::builder()
                .timeout(config.http_timeout())
                .user_agent(config.user_agent.clone())
                .build()?,
        };

        let interfaces = self
            .interfaces
            .unwrap_or_else(|| Arc::new(SystemInterfaces));

        Ok(SsdpClient {
            config,
            http,
            interfaces,
        })
    }
}

/// [`SsdpClient::search_devices`] avec un client par défaut.
pub async fn search_devices(device_type: &str) -> Result<Vec<DeviceNotification>> {
    SsdpClient::new()?.search_devices(device_type).await
}

/// [`SsdpClient::search_upnp_devices`] avec un client par défaut.
pub async fn search_upnp_devices(device_type: &str, device_version: u32) -> Result<Vec<Device>> {
    SsdpClient::new()?
        .search_upnp_devices(device_type, device_version)
        .await
}
