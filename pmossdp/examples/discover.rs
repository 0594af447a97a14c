//! Découverte SSDP sur le réseau local.
//!
//! ```text
//! cargo run -p pmossdp --example discover -- MediaRenderer 1
//! cargo run -p pmossdp --example discover -- ssdp:all
//! ```

use pmossdp::{SsdpClient, SsdpConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let target = args.next().unwrap_or_else(|| "MediaRenderer".to_string());
    let version: u32 = args.next().map(|v| v.parse()).transpose()?.unwrap_or(1);

    let client = SsdpClient::builder().config(SsdpConfig::from_env()?).build()?;

    // Un ST complet (ssdp:all, urn:..., uuid:...) : seulement les notifications
    if target.contains(':') {
        let notifications = client.search_devices(&target).await?;
        println!("{} notification(s) for {}", notifications.len(), target);
        for n in &notifications {
            println!("- {} @ {} [{}] max-age={}", n.usn, n.location, n.server, n.max_age());
        }
        return Ok(());
    }

    let devices = client.search_upnp_devices(&target, version).await?;
    println!("=====================");
    println!("{} device(s) of type {}:{}", devices.len(), target, version);
    for device in &devices {
        println!(
            "- {} ({} {}) {}",
            device.friendly_name, device.manufacturer, device.model_name, device.udn
        );
        println!("  base: {}", device.url_base);
        for service in device.iter().flat_map(|d| d.services.iter()) {
            let control = device
                .resolve_url(&service.control_url)
                .map(|u| u.to_string())
                .unwrap_or_else(|| service.control_url.clone());
            println!("  * {} -> {}", service.service_type, control);
        }
    }
    println!("=====================");
    println!("{}", serde_json::to_string_pretty(&devices)?);

    Ok(())
}
