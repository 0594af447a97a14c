//! Error types for SSDP discovery
//!
//! Only [`Error`] crosses the public API. The other enums describe failures
//! that are recovered per item: a socket that cannot be bound yields an empty
//! response set for that address, a response missing a header is dropped,
//! a descriptor that cannot be fetched is omitted.

use std::net::SocketAddr;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the caller
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Search target rejected before anything was sent
    #[error("Invalid search target: {0:?}")]
    InvalidSearchTarget(String),

    /// Device type or version cannot form a UPnP device URN
    #[error("Invalid device type: {0}")]
    InvalidDeviceType(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing failed
    #[error("YAML parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Transport failure during one multicast search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Cannot create UDP socket for {local}: {source}")]
    Socket {
        local: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot bind UDP socket to {local}: {source}")]
    Bind {
        local: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send M-SEARCH to {group}: {source}")]
    Send {
        group: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// A response that cannot become a notification record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("Missing required header: {0}")]
    MissingHeader(&'static str),
}

/// Failure while fetching or parsing one device description
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {location}")]
    Status { location: String, status: u16 },

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("Device element deserialization failed: {0}")]
    Deserialize(#[from] quick_xml::DeError),

    #[error("No <device> element in description at {0}")]
    MissingDevice(String),
}
