//! Récupération et parsing des descriptions de devices UPnP
//!
//! The description document is stream-parsed with `quick_xml::Reader`: the
//! root's `URLBase` child is read as text (CDATA included), every `device` child is
//! handed to the serde deserializer, which recurses into embedded devices,
//! services and icons. Each resulting root [`Device`] gets its `url_base`
//! from `URLBase` when it is an absolute URL, or from the Location URL the
//! description was fetched from.

use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::DescriptionError;
use crate::notification::DeviceNotification;

/// Device UPnP (racine ou embarqué).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub manufacturer_url: Option<String>,
    pub model_description: Option<String>,
    pub model_name: String,
    pub model_number: Option<String>,
    pub model_url: Option<String>,
    pub serial_number: Option<String>,
    pub udn: String,
    pub upc: Option<String>,
    pub presentation_url: Option<String>,
    /// URL absolue servant de base aux URLs relatives (SCPD, contrôle, icônes)
    pub url_base: String,
    pub icons: Vec<Icon>,
    pub services: Vec<Service>,
    /// Devices embarqués (`deviceList`)
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    pub scpd_url: String,
    pub control_url: String,
    pub event_sub_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub mimetype: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub depth: Option<u32>,
    pub url: String,
}

impl Device {
    /// Résout une URL relative de la description par rapport à `url_base`.
    pub fn resolve_url(&self, relative: &str) -> Option<Url> {
        Url::parse(&self.url_base).ok()?.join(relative).ok()
    }

    /// Premier service dont le type commence par `service_type`
    /// (sans tenir compte de la casse), dans ce device puis ses devices embarqués.
    pub fn find_service(&self, service_type: &str) -> Option<&Service> {
        let wanted = service_type.to_ascii_lowercase();
        self.iter()
            .flat_map(|device| device.services.iter())
            .find(|service| service.service_type.to_ascii_lowercase().starts_with(&wanted))
    }

    /// Parcours en profondeur de l'arbre, ce device compris.
    pub fn iter(&self) -> DeviceIter<'_> {
        DeviceIter { stack: vec![self] }
    }

    fn set_url_base(&mut self, url_base: &str) {
        self.url_base = url_base.to_string();
        for child in &mut self.devices {
            child.set_url_base(url_base);
        }
    }
}

pub struct DeviceIter<'a> {
    stack: Vec<&'a Device>,
}

impl<'a> Iterator for DeviceIter<'a> {
    type Item = &'a Device;

    fn next(&mut self) -> Option<Self::Item> {
        let device = self.stack.pop()?;
        self.stack.extend(device.devices.iter().rev());
        Some(device)
    }
}

/// Parse un document de description.
///
/// `location` est l'URL d'où provient le document ; elle sert d'URL de base
/// si le document ne contient pas d'élément `URLBase`.
pub fn parse_device_description(xml: &str, location: &str) -> Result<Vec<Device>, DescriptionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut depth = 0usize;
    let mut url_base: Option<String> = None;
    let mut devices = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                // depth 1 is <root>, its children are at depth 2
                if depth != 2 {
                    continue;
                }
                match e.local_name().as_ref() {
                    b"URLBase" => {
                        url_base = Some(read_element_text(&mut reader)?);
                        depth -= 1;
                    }
                    b"device" => {
                        let span = reader.read_to_end(e.name())?;
                        let inner = &xml[span.start as usize..span.end as usize];
                        let element = format!("<device>{inner}</device>");
                        let parsed: xml::Device = quick_xml::de::from_str(&element)?;
                        devices.push(Device::from(parsed));
                        depth -= 1;
                    }
                    _ => {}
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => break,
            _ => {}
        }
    }

    if devices.is_empty() {
        return Err(DescriptionError::MissingDevice(location.to_string()));
    }

    let base = match url_base {
        Some(base) if Url::parse(&base).is_ok() => base,
        Some(base) => {
            debug!("Ignoring non-absolute URLBase '{}' in {}", base, location);
            location.to_string()
        }
        None => location.to_string(),
    };
    for device in &mut devices {
        device.set_url_base(&base);
    }

    Ok(devices)
}

// Text of the element whose start tag was just read, up to its end tag.
// CDATA sections count as text, comments are skipped.
fn read_element_text(reader: &mut Reader<&[u8]>) -> Result<String, DescriptionError> {
    let mut escaped = String::new();
    let mut nested = 0usize;

    loop {
        match reader.read_event()? {
            Event::Text(text) => escaped.push_str(&String::from_utf8_lossy(&text)),
            Event::CData(cdata) => {
                escaped.push_str(&escape(String::from_utf8_lossy(&cdata).as_ref()));
            }
            Event::GeneralRef(entity) => {
                escaped.push('&');
                escaped.push_str(&String::from_utf8_lossy(&entity));
                escaped.push(';');
            }
            Event::Start(_) => nested += 1,
            Event::End(_) if nested == 0 => break,
            Event::End(_) => nested -= 1,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(unescape(escaped.trim())?.into_owned())
}

/// Télécharge et parse la description publiée à `location`.
pub async fn fetch_device_description(
    client: &Client,
    location: &str,
) -> Result<Vec<Device>, DescriptionError> {
    debug!("Fetching description at {}", location);

    let response = client.get(location).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DescriptionError::Status {
            location: location.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await?;
    parse_device_description(&body, location)
}

/// Résout les descriptions de toutes les notifications, en parallèle.
///
/// Une notification dont la description ne peut être obtenue est simplement
/// omise ; les autres ne sont pas affectées.
pub async fn fetch_all_descriptions(
    client: &Client,
    notifications: &[DeviceNotification],
) -> Vec<Device> {
    let mut tasks = JoinSet::new();

    for notification in notifications {
        let client = client.clone();
        let location = notification.location.clone();
        tasks.spawn(async move {
            let result = fetch_device_description(&client, &location).await;
            (location, result)
        });
    }

    let mut devices = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(mut found))) => devices.append(&mut found),
            Ok((location, Err(e))) => {
                warn!("❌ Description at {} skipped: {}", location, e);
            }
            Err(e) => warn!("❌ Description task failed: {}", e),
        }
    }

    info!(
        "✅ {} device(s) described out of {} notification(s)",
        devices.len(),
        notifications.len()
    );
    devices
}

/// Forme XML de la description, telle que publiée par les devices.
mod xml {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Device {
        #[serde(rename = "deviceType")]
        pub device_type: String,
        #[serde(rename = "friendlyName", default)]
        pub friendly_name: String,
        #[serde(default)]
        pub manufacturer: String,
        #[serde(rename = "manufacturerURL")]
        pub manufacturer_url: Option<String>,
        #[serde(rename = "modelDescription")]
        pub model_description: Option<String>,
        #[serde(rename = "modelName", default)]
        pub model_name: String,
        #[serde(rename = "modelNumber")]
        pub model_number: Option<String>,
        #[serde(rename = "modelURL")]
        pub model_url: Option<String>,
        #[serde(rename = "serialNumber")]
        pub serial_number: Option<String>,
        #[serde(rename = "UDN")]
        pub udn: String,
        #[serde(rename = "UPC")]
        pub upc: Option<String>,
        #[serde(rename = "presentationURL")]
        pub presentation_url: Option<String>,
        #[serde(rename = "iconList", default)]
        pub icon_list: Option<IconList>,
        #[serde(rename = "serviceList", default)]
        pub service_list: Option<ServiceList>,
        #[serde(rename = "deviceList", default)]
        pub device_list: Option<DeviceList>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct IconList {
        #[serde(rename = "icon", default)]
        pub items: Vec<Icon>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct ServiceList {
        #[serde(rename = "service", default)]
        pub items: Vec<Service>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct DeviceList {
        #[serde(rename = "device", default)]
        pub items: Vec<Device>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Service {
        #[serde(rename = "serviceType", default)]
        pub service_type: String,
        #[serde(rename = "serviceId", default)]
        pub service_id: String,
        #[serde(rename = "SCPDURL", default)]
        pub scpd_url: String,
        #[serde(rename = "controlURL", default)]
        pub control_url: String,
        #[serde(rename = "eventSubURL", default)]
        pub event_sub_url: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Icon {
        #[serde(default)]
        pub mimetype: String,
        pub width: Option<String>,
        pub height: Option<String>,
        pub depth: Option<String>,
        #[serde(default)]
        pub url: String,
    }
}

fn parse_dimension(value: Option<String>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}

impl From<xml::Device> for Device {
    fn from(raw: xml::Device) -> Self {
        Self {
            device_type: raw.device_type,
            friendly_name: raw.friendly_name,
            manufacturer: raw.manufacturer,
            manufacturer_url: raw.manufacturer_url,
            model_description: raw.model_description,
            model_name: raw.model_name,
            model_number: raw.model_number,
            model_url: raw.model_url,
            serial_number: raw.serial_number,
            udn: raw.udn,
            upc: raw.upc,
            presentation_url: raw.presentation_url,
            url_base: String::new(),
            icons: raw
                .icon_list
                .unwrap_or_default()
                .items
                .into_iter()
                .map(Icon::from)
                .collect(),
            services: raw
                .service_list
                .unwrap_or_default()
                .items
                .into_iter()
                .map(Service::from)
                .collect(),
            devices: raw
                .device_list
                .unwrap_or_default()
                .items
                .into_iter()
                .map(Device::from)
                .collect(),
        }
    }
}

impl From<xml::Service> for Service {
    fn from(raw: xml::Service) -> Self {
        Self {
            service_type: raw.service_type,
            service_id: raw.service_id,
            scpd_url: raw.scpd_url,
            control_url: raw.control_url,
            event_sub_url: raw.event_sub_url,
        }
    }
}

impl From<xml::Icon> for Icon {
    fn from(raw: xml::Icon) -> Self {
        Self {
            mimetype: raw.mimetype,
            width: parse_dimension(raw.width),
            height: parse_dimension(raw.height),
            depth: parse_dimension(raw.depth),
            url: raw.url,
        }
    }
}
