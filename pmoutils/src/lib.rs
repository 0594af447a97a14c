/// Utilitaires pour la gestion des interfaces réseau.
///
/// Ce module fournit l'énumération des interfaces réseau locales et la
/// sélection des adresses utilisables pour la découverte multicast (SSDP).
///
/// # Fonctions principales
///
/// - [`list_local_addresses`] : adresses des interfaces disposant d'une passerelle
/// - [`select_local_addresses`] : même sélection, sur une liste d'interfaces fournie
///
/// # Examples
///
/// ```no_run
/// use pmoutils::list_local_addresses;
///
/// for addr in list_local_addresses() {
///     println!("{} ({})", addr.ip, addr.interface);
/// }
/// ```
mod ip_utils;

pub use ip_utils::{
    InterfaceSource, LocalAddress, NetworkInterface, SystemInterfaces, list_local_addresses,
    list_local_addresses_from, select_local_addresses,
};
