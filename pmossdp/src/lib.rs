//! SSDP discovery for PMOMusic
//!
//! This crate finds UPnP devices on the local network and, optionally,
//! downloads their description documents.
//!
//! # Pipeline
//!
//! 1. [`pmoutils::list_local_addresses`] selects the local addresses of
//!    interfaces that have a gateway.
//! 2. One M-SEARCH burst per address is sent to the matching SSDP group
//!    (`239.255.255.250`, `FF02::C` or `FF05::C`, port 1900) and replies are
//!    collected for a fixed window ([`search`]).
//! 3. Replies are parsed into [`DeviceNotification`]s, deduplicated by USN
//!    ([`notification`]).
//! 4. Each notification's `LOCATION` is fetched and parsed into a [`Device`]
//!    tree whose `url_base` is always absolute ([`description`]).
//!
//! Environmental failures (socket errors, silent networks, broken
//! descriptions) never surface as errors: the affected item is left out of the
//! result. Only caller mistakes, such as an invalid device type, do.
//!
//! # Example
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let notifications = pmossdp::search_devices("ssdp:all").await?;
//!     println!("{} device(s) answered", notifications.len());
//!
//!     let renderers = pmossdp::search_upnp_devices("MediaRenderer", 1).await?;
//!     for renderer in &renderers {
//!         println!("{} - {}", renderer.friendly_name, renderer.model_name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod address;
pub mod client;
pub mod config;
pub mod description;
pub mod error;
pub mod notification;
pub mod search;

pub use address::{AddressClass, SSDP_PORT};
pub use client::{
    DEFAULT_DEVICE_VERSION, SsdpClient, SsdpClientBuilder, search_devices, search_upnp_devices,
    upnp_device_urn,
};
pub use config::SsdpConfig;
pub use description::{Device, Icon, Service, fetch_device_description, parse_device_description};
pub use error::{DescriptionError, Error, NotificationError, Result, SearchError};
pub use notification::{
    DeviceNotification, FieldSetter, SsdpHeaders, SsdpRecord, parse_notifications,
};
pub use search::SsdpResponse;

pub use pmoutils::{InterfaceSource, LocalAddress, NetworkInterface};
