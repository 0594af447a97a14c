//! Parsing des réponses SSDP en notifications typées

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::NotificationError;
use crate::search::SsdpResponse;

/// Durée de validité par défaut quand CACHE-CONTROL n'est pas exploitable (secondes)
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// En-têtes d'une réponse SSDP, noms normalisés en minuscules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsdpHeaders(HashMap<String, String>);

impl SsdpHeaders {
    /// Découpe un message SSDP en en-têtes.
    ///
    /// Lines are split on CRLF or LF. Every line holding a colon becomes a
    /// header: the name is the text before the first colon, the value is
    /// everything after it. Lines without a colon (the status line) are
    /// ignored, and the last occurrence of a name wins.
    pub fn parse(message: &str) -> Self {
        let mut headers = HashMap::new();

        for line in message.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                trace!("Skipping header line without name: '{}'", line);
                continue;
            }
            headers.insert(name, value.trim().to_string());
        }

        Self(headers)
    }

    /// Recherche insensible à la casse.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Valeur d'un en-tête obligatoire.
    pub fn require(&self, name: &'static str) -> Result<&str, NotificationError> {
        self.get(name).ok_or(NotificationError::MissingHeader(name))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Setter d'un champ d'enregistrement à partir de la valeur d'un en-tête.
pub type FieldSetter<T> = fn(&mut T, String);

/// Enregistrement construit à partir des en-têtes d'une réponse SSDP.
///
/// `FIELDS` maps each header the record reads to the field it fills; every
/// header listed is required.
pub trait SsdpRecord: Default + 'static {
    const FIELDS: &'static [(&'static str, FieldSetter<Self>)];

    /// Clé de déduplication
    fn unique_key(&self) -> &str;

    fn from_headers(headers: &SsdpHeaders) -> Result<Self, NotificationError> {
        let mut record = Self::default();
        for (name, set) in Self::FIELDS {
            set(&mut record, headers.require(*name)?.to_string());
        }
        Ok(record)
    }
}

/// Notification issue d'une réponse à un M-SEARCH.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNotification {
    pub usn: String,
    pub location: String,
    pub st: String,
    pub cache_control: String,
    pub server: String,
}

impl SsdpRecord for DeviceNotification {
    const FIELDS: &'static [(&'static str, FieldSetter<Self>)] = &[
        ("usn", |n, v| n.usn = v),
        ("location", |n, v| n.location = v),
        ("st", |n, v| n.st = v),
        ("cache-control", |n, v| n.cache_control = v),
        ("server", |n, v| n.server = v),
    ];

    fn unique_key(&self) -> &str {
        &self.usn
    }
}

impl DeviceNotification {
    /// Parse une réponse brute.
    pub fn parse(message: &str) -> Result<Self, NotificationError> {
        Self::from_headers(&SsdpHeaders::parse(message))
    }

    /// `max-age` extrait de CACHE-CONTROL, ou [`DEFAULT_MAX_AGE`].
    pub fn max_age(&self) -> u32 {
        parse_max_age(&self.cache_control).unwrap_or(DEFAULT_MAX_AGE)
    }

    /// UDN (`uuid:...`) extrait de l'USN, en minuscules.
    pub fn udn(&self) -> Option<String> {
        extract_udn_from_usn(&self.usn)
    }
}

/// Construit les enregistrements d'un lot de réponses, dédupliqués par clé.
///
/// Responses missing a required header are dropped. Among records sharing a
/// key, the first one in processing order is kept.
pub fn parse_records<T: SsdpRecord>(responses: &[SsdpResponse]) -> Vec<T> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for response in responses {
        let headers = SsdpHeaders::parse(&response.payload);
        let record = match T::from_headers(&headers) {
            Ok(record) => record,
            Err(e) => {
                trace!("SSDP response from {} dropped: {}", response.from, e);
                continue;
            }
        };

        if seen.insert(record.unique_key().to_string()) {
            records.push(record);
        } else {
            trace!("Duplicate SSDP record {} ignored", record.unique_key());
        }
    }

    debug!(
        "{} unique record(s) out of {} response(s)",
        records.len(),
        responses.len()
    );
    records
}

/// Raccourci pour [`DeviceNotification`].
pub fn parse_notifications(responses: &[SsdpResponse]) -> Vec<DeviceNotification> {
    parse_records(responses)
}

fn parse_max_age(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after_eq = lower[idx + "max-age".len()..]
        .trim_start()
        .trim_start_matches('=')
        .trim_start();
    let digits: String = after_eq.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &lower[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
        USN: uuid:abc::urn:schemas-upnp-org:device:Basic:1\r\n\
        LOCATION: http://10.0.0.5:80/desc.xml\r\n\
        ST: urn:schemas-upnp-org:device:Basic:1\r\n\
        CACHE-CONTROL: max-age=1800\r\n\
        SERVER: test\r\n\
        \r\n";

    fn response(payload: &str) -> SsdpResponse {
        SsdpResponse {
            from: "10.0.0.5:1900".parse().unwrap(),
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_parse_basic_response() {
        let notifications = parse_notifications(&[response(BASIC_RESPONSE)]);

        assert_eq!(notifications.len(), 1);
        let n = &notifications[0];
        assert_eq!(n.usn, "uuid:abc::urn:schemas-upnp-org:device:Basic:1");
        assert_eq!(n.location, "http://10.0.0.5:80/desc.xml");
        assert_eq!(n.st, "urn:schemas-upnp-org:device:Basic:1");
        assert_eq!(n.server, "test");
        assert_eq!(n.max_age(), 1800);
        assert_eq!(n.udn().as_deref(), Some("uuid:abc"));
    }

    #[test]
    fn test_header_values_keep_inner_colons() {
        let headers = SsdpHeaders::parse("M-SEARCH * HTTP/1.1\r\nHOST: 239.255.255.250:1900\r\n\r\n");
        assert_eq!(headers.get("host"), Some("239.255.255.250:1900"));
        assert_eq!(headers.get("HOST"), Some("239.255.255.250:1900"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_bare_lf_and_duplicate_headers() {
        let headers = SsdpHeaders::parse("HTTP/1.1 200 OK\nServer: first\nSERVER: second\nExt:\n");
        assert_eq!(headers.get("server"), Some("second"));
        assert_eq!(headers.get("ext"), Some(""));
    }

    #[test]
    fn test_missing_required_header_is_dropped() {
        let without_location = BASIC_RESPONSE.replace("LOCATION: http://10.0.0.5:80/desc.xml\r\n", "");
        assert_eq!(
            DeviceNotification::parse(&without_location),
            Err(NotificationError::MissingHeader("location"))
        );

        let other = BASIC_RESPONSE.replace("uuid:abc", "uuid:def");
        let notifications = parse_notifications(&[response(&without_location), response(&other)]);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].usn, "uuid:def::urn:schemas-upnp-org:device:Basic:1");
    }

    #[test]
    fn test_duplicate_usn_keeps_first() {
        let second = BASIC_RESPONSE.replace("SERVER: test", "SERVER: other");
        let notifications = parse_notifications(&[
            response(BASIC_RESPONSE),
            response(&second),
            response(BASIC_RESPONSE),
        ]);

        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].server, "test");
    }

    #[test]
    fn test_fields_table_drives_parsing() {
        let mut message = String::from("HTTP/1.1 200 OK\r\n");
        for (field, _) in DeviceNotification::FIELDS {
            message.push_str(&format!("{}: value-{}\r\n", field.to_ascii_uppercase(), field));
        }
        let n = DeviceNotification::parse(&message).unwrap();
        assert_eq!(
            n,
            DeviceNotification {
                usn: "value-usn".to_string(),
                location: "value-location".to_string(),
                st: "value-st".to_string(),
                cache_control: "value-cache-control".to_string(),
                server: "value-server".to_string(),
            }
        );

        for (field, _) in DeviceNotification::FIELDS {
            let partial: String = message
                .lines()
                .filter(|l| !l.to_ascii_lowercase().starts_with(&format!("{}:", field)))
                .map(|l| format!("{l}\r\n"))
                .collect();
            assert_eq!(
                DeviceNotification::parse(&partial),
                Err(NotificationError::MissingHeader(*field)),
                "{field} must be required"
            );
        }
    }

    #[test]
    fn test_max_age_fallback() {
        let mut n = DeviceNotification::parse(BASIC_RESPONSE).unwrap();
        n.cache_control = "no-cache".to_string();
        assert_eq!(n.max_age(), DEFAULT_MAX_AGE);
        n.cache_control = "MAX-AGE = 120".to_string();
        assert_eq!(n.max_age(), 120);
    }

    #[test]
    fn test_udn_without_suffix() {
        let mut n = DeviceNotification::parse(BASIC_RESPONSE).unwrap();
        n.usn = "UUID:ABC-123".to_string();
        assert_eq!(n.udn().as_deref(), Some("uuid:abc-123"));
        n.usn = "upnp:rootdevice".to_string();
        assert_eq!(n.udn(), None);
    }
}
