use std::net::IpAddr;

use tracing::{debug, trace};

/// Interface réseau locale, telle que remontée par le système.
///
/// Seules les informations utiles à la découverte multicast sont conservées :
/// le nom, l'index (utilisé comme scope id IPv6 et comme interface multicast),
/// les adresses unicast et la présence d'une passerelle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub name: String,
    pub index: u32,
    pub addresses: Vec<IpAddr>,
    pub has_gateway: bool,
}

/// Adresse locale utilisable pour une recherche multicast.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalAddress {
    /// Adresse unicast de l'interface
    pub ip: IpAddr,
    /// Nom de l'interface (ex: `"eth0"`, `"en0"`)
    pub interface: String,
    /// Index système de l'interface
    pub interface_index: u32,
}

impl LocalAddress {
    pub fn new(ip: IpAddr, interface: impl Into<String>, interface_index: u32) -> Self {
        Self {
            ip,
            interface: interface.into(),
            interface_index,
        }
    }

    pub fn is_ipv4(&self) -> bool {
        self.ip.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.ip.is_ipv6()
    }
}

/// Source d'interfaces réseau.
///
/// Permet de remplacer l'énumération système par une liste fixe
/// (tests, environnements contraints).
pub trait InterfaceSource: Send + Sync {
    fn interfaces(&self) -> Vec<NetworkInterface>;
}

/// Énumération des interfaces via l'OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        netdev::get_interfaces()
            .into_iter()
            .map(|iface| {
                let has_gateway = iface
                    .gateway
                    .as_ref()
                    .is_some_and(|gw| !gw.ipv4.is_empty() || !gw.ipv6.is_empty());

                let addresses = iface
                    .ipv4
                    .iter()
                    .map(|net| IpAddr::V4(net.addr()))
                    .chain(iface.ipv6.iter().map(|net| IpAddr::V6(net.addr())))
                    .collect();

                NetworkInterface {
                    name: iface.name,
                    index: iface.index,
                    addresses,
                    has_gateway,
                }
            })
            .collect()
    }
}

/// Une liste d'interfaces fixée à l'avance.
impl InterfaceSource for Vec<NetworkInterface> {
    fn interfaces(&self) -> Vec<NetworkInterface> {
        self.clone()
    }
}

/// Sélectionne les adresses locales éligibles à la découverte multicast.
///
/// Une interface n'est retenue que si elle annonce au moins une passerelle
/// (heuristique "a une vraie route sortante", qui écarte le loopback et les
/// interfaces virtuelles isolées). Toutes ses adresses IPv4 et IPv6 sont
/// alors conservées.
///
/// Une liste vide n'est pas une erreur : la découverte ne trouvera simplement
/// rien.
pub fn select_local_addresses(interfaces: &[NetworkInterface]) -> Vec<LocalAddress> {
    let mut result = Vec::new();

    for iface in interfaces {
        if !iface.has_gateway {
            trace!("Skipping interface {} (no gateway)", iface.name);
            continue;
        }

        for ip in &iface.addresses {
            debug!("Local address {} on {} (#{})", ip, iface.name, iface.index);
            result.push(LocalAddress::new(*ip, iface.name.clone(), iface.index));
        }
    }

    result
}

/// Liste les adresses locales éligibles à partir de l'énumération système.
pub fn list_local_addresses() -> Vec<LocalAddress> {
    list_local_addresses_from(&SystemInterfaces)
}

/// Comme [`list_local_addresses`], avec une source d'interfaces arbitraire.
pub fn list_local_addresses_from<S: InterfaceSource + ?Sized>(source: &S) -> Vec<LocalAddress> {
    select_local_addresses(&source.interfaces())
}
