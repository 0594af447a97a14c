//! Classification des adresses locales et groupes multicast SSDP

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Groupe multicast SSDP IPv4
pub const SSDP_MULTICAST_V4: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Groupe multicast SSDP IPv6 link-local (`FF02::C`)
pub const SSDP_MULTICAST_V6_LINK_LOCAL: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xc);

/// Groupe multicast SSDP IPv6 site-local (`FF05::C`)
pub const SSDP_MULTICAST_V6_SITE_LOCAL: Ipv6Addr = Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0, 0xc);

/// Famille / portée d'une adresse locale, du point de vue SSDP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressClass {
    Ipv4,
    Ipv6LinkLocal,
    Ipv6SiteLocal,
    /// Adresse IPv6 globale ou autre : pas de recherche sur cette adresse.
    Unknown,
}

impl AddressClass {
    pub fn classify(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressClass::Ipv4,
            IpAddr::V6(v6) if is_ipv6_link_local(v6) => AddressClass::Ipv6LinkLocal,
            IpAddr::V6(v6) if is_ipv6_site_local(v6) => AddressClass::Ipv6SiteLocal,
            IpAddr::V6(_) => AddressClass::Unknown,
        }
    }

    /// Groupe multicast (adresse + port 1900) associé, `None` pour `Unknown`.
    pub fn multicast_group(self) -> Option<SocketAddr> {
        let ip = match self {
            AddressClass::Ipv4 => IpAddr::V4(SSDP_MULTICAST_V4),
            AddressClass::Ipv6LinkLocal => IpAddr::V6(SSDP_MULTICAST_V6_LINK_LOCAL),
            AddressClass::Ipv6SiteLocal => IpAddr::V6(SSDP_MULTICAST_V6_SITE_LOCAL),
            AddressClass::Unknown => return None,
        };
        Some(SocketAddr::new(ip, SSDP_PORT))
    }

    pub fn is_known(self) -> bool {
        self != AddressClass::Unknown
    }
}

// fe80::/10
fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

// fec0::/10 (deprecated by RFC 3879 but still announced by some stacks)
fn is_ipv6_site_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfec0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v6(s: &str) -> IpAddr {
        IpAddr::V6(s.parse().unwrap())
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            AddressClass::classify(&IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            AddressClass::Ipv4
        );
        assert_eq!(AddressClass::classify(&v6("fe80::1")), AddressClass::Ipv6LinkLocal);
        assert_eq!(AddressClass::classify(&v6("febf::1")), AddressClass::Ipv6LinkLocal);
        assert_eq!(AddressClass::classify(&v6("fec0::1")), AddressClass::Ipv6SiteLocal);
        assert_eq!(AddressClass::classify(&v6("2001:db8::1")), AddressClass::Unknown);
        assert_eq!(AddressClass::classify(&v6("::1")), AddressClass::Unknown);
    }

    #[test]
    fn test_multicast_groups() {
        assert_eq!(
            AddressClass::Ipv4.multicast_group(),
            Some("239.255.255.250:1900".parse().unwrap())
        );
        assert_eq!(
            AddressClass::Ipv6LinkLocal.multicast_group(),
            Some("[ff02::c]:1900".parse().unwrap())
        );
        assert_eq!(
            AddressClass::Ipv6SiteLocal.multicast_group(),
            Some("[ff05::c]:1900".parse().unwrap())
        );
        assert_eq!(AddressClass::Unknown.multicast_group(), None);
        assert!(!AddressClass::Unknown.is_known());
    }
}
