/*!
Recherche SSDP active (M-SEARCH) sur toutes les interfaces locales.

One search runs per local address. Each search owns a UDP socket bound to
that address on an ephemeral port: a control point must not bind 1900,
otherwise the kernel may hand the unicast HTTP/200 replies to another socket
sharing the port (the local SSDP server, for instance).

A search never fails from the caller's point of view. Bind or send errors
produce an empty response set for that address, and the receive loop stops
either at the deadline or at the first receive error, keeping whatever
arrived so far.
*/

use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV6, UdpSocket as StdUdpSocket};

use pmoutils::LocalAddress;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::address::AddressClass;
use crate::config::SsdpConfig;
use crate::error::SearchError;

/// Réponse brute reçue pendant une fenêtre de recherche.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    pub from: SocketAddr,
    pub payload: String,
}

/// Construit la requête M-SEARCH envoyée au groupe multicast.
pub fn build_msearch(group: SocketAddr, st: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         ST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         \r\n",
        group, st, mx
    )
}

/// Lance une recherche par adresse locale, en parallèle, et fusionne les réponses.
///
/// Les adresses de classe [`AddressClass::Unknown`] sont ignorées. Le temps
/// total est d'environ une fenêtre de recherche, quel que soit le nombre
/// d'interfaces.
pub async fn search_all(
    addresses: Vec<LocalAddress>,
    st: &str,
    config: &SsdpConfig,
) -> Vec<SsdpResponse> {
    let known: Vec<LocalAddress> = addresses
        .into_iter()
        .filter(|local| {
            let known = AddressClass::classify(&local.ip).is_known();
            if !known {
                trace!("Skipping {} on {}: no SSDP group for this scope", local.ip, local.interface);
            }
            known
        })
        .collect();

    let responses = fan_out(known, |local| {
        let st = st.to_string();
        let config = config.clone();
        async move { search_address(&local, &st, &config).await }
    })
    .await;

    info!("📥 {} SSDP response(s) collected for ST={}", responses.len(), st);
    responses
}

/// Une tâche par adresse ; les réponses de toutes les tâches sont concaténées.
async fn fan_out<F, Fut>(addresses: Vec<LocalAddress>, search: F) -> Vec<SsdpResponse>
where
    F: Fn(LocalAddress) -> Fut,
    Fut: Future<Output = Vec<SsdpResponse>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for local in addresses {
        tasks.spawn(search(local));
    }

    let mut responses = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(mut found) => responses.append(&mut found),
            Err(e) => warn!("❌ SSDP search task failed: {}", e),
        }
    }
    responses
}

/// Recherche sur une seule adresse locale.
///
/// Retourne immédiatement un ensemble vide, sans ouvrir de socket, si
/// l'adresse n'a pas de groupe multicast SSDP.
pub async fn search_address(
    local: &LocalAddress,
    st: &str,
    config: &SsdpConfig,
) -> Vec<SsdpResponse> {
    let Some(group) = AddressClass::classify(&local.ip).multicast_group() else {
        debug!("No SSDP multicast group for {}, search skipped", local.ip);
        return Vec::new();
    };

    let result = async {
        let socket = open_search_socket(local)?;
        let payload = build_msearch(group, st, config.mx);
        run_search(&socket, group, &payload, config).await
    }
    .await;

    match result {
        Ok(responses) => {
            debug!(
                "SSDP search on {} ({}) got {} response(s)",
                local.ip,
                local.interface,
                responses.len()
            );
            responses
        }
        Err(e) => {
            warn!("❌ SSDP search on {} ({}) failed: {}", local.ip, local.interface, e);
            Vec::new()
        }
    }
}

/// Envoie la requête `send_count` fois puis écoute jusqu'à la fin de la fenêtre.
pub(crate) async fn run_search(
    socket: &UdpSocket,
    group: SocketAddr,
    payload: &str,
    config: &SsdpConfig,
) -> Result<Vec<SsdpResponse>, SearchError> {
    for _ in 0..config.send_count {
        socket
            .send_to(payload.as_bytes(), group)
            .await
            .map_err(|source| SearchError::Send { group, source })?;
    }

    info!("📤 M-SEARCH sent {} time(s) to {}", config.send_count, group);
    debug!(
        "📨 M-SEARCH payload\n<details>\n\n```\n{}\n```\n</details>\n",
        payload
    );

    let mut responses = Vec::new();
    let mut buf = vec![0u8; config.recv_buffer_size];

    if timeout(
        config.search_window(),
        receive_loop(socket, &mut buf, &mut responses),
    )
    .await
    .is_err()
    {
        trace!("SSDP search window elapsed for {}", group);
    }

    Ok(responses)
}

async fn receive_loop(socket: &UdpSocket, buf: &mut [u8], responses: &mut Vec<SsdpResponse>) {
    loop {
        match socket.recv_from(buf).await {
            Ok((n, from)) => {
                let payload = String::from_utf8_lossy(&buf[..n]).into_owned();
                trace!("📥 SSDP datagram from {} ({} bytes)", from, n);
                responses.push(SsdpResponse { from, payload });
            }
            Err(e) => {
                // Socket closed or reset: keep what we already have.
                debug!("SSDP receive loop stopped: {}", e);
                return;
            }
        }
    }
}

fn open_search_socket(local: &LocalAddress) -> Result<UdpSocket, SearchError> {
    let bind_addr = match local.ip {
        IpAddr::V4(ip) => SocketAddr::new(IpAddr::V4(ip), 0),
        IpAddr::V6(ip) => SocketAddr::V6(SocketAddrV6::new(ip, 0, 0, local.interface_index)),
    };

    let socket_err = |source: io::Error| SearchError::Socket {
        local: bind_addr,
        source,
    };

    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(socket_err)?;

    request_exclusive_port(&socket).map_err(socket_err)?;
    disable_connection_reset(&socket).map_err(socket_err)?;

    match local.ip {
        IpAddr::V4(ip) => socket.set_multicast_if_v4(&ip).map_err(socket_err)?,
        IpAddr::V6(_) => socket
            .set_multicast_if_v6(local.interface_index)
            .map_err(socket_err)?,
    }

    socket
        .bind(&bind_addr.into())
        .map_err(|source| SearchError::Bind {
            local: bind_addr,
            source,
        })?;
    socket.set_nonblocking(true).map_err(socket_err)?;

    let std_socket: StdUdpSocket = socket.into();
    UdpSocket::from_std(std_socket).map_err(socket_err)
}

#[cfg(not(windows))]
fn request_exclusive_port(socket: &Socket) -> io::Result<()> {
    socket.set_reuse_address(false)
}

#[cfg(windows)]
fn request_exclusive_port(socket: &Socket) -> io::Result<()> {
    use std::os::windows::io::AsRawSocket;
    use winapi::um::winsock2::{SOCKET, setsockopt};

    const SOL_SOCKET: i32 = 0xffff;
    const SO_EXCLUSIVEADDRUSE: i32 = !0x0004;

    let enable: i32 = 1;
    let ret = unsafe {
        setsockopt(
            socket.as_raw_socket() as SOCKET,
            SOL_SOCKET,
            SO_EXCLUSIVEADDRUSE,
            &enable as *const i32 as *const i8,
            std::mem::size_of::<i32>() as i32,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// Only Windows fails subsequent UDP receives after an ICMP port-unreachable.
#[cfg(not(windows))]
fn disable_connection_reset(_socket: &Socket) -> io::Result<()> {
    Ok(())
}

#[cfg(windows)]
fn disable_connection_reset(socket: &Socket) -> io::Result<()> {
    use std::os::windows::io::AsRawSocket;
    use winapi::um::winsock2::{SOCKET, WSAIoctl};

    const SIO_UDP_CONNRESET: u32 = 0x9800_000C;

    let mut enabled: u32 = 0;
    let mut returned: u32 = 0;
    let ret = unsafe {
        WSAIoctl(
            socket.as_raw_socket() as SOCKET,
            SIO_UDP_CONNRESET,
            &mut enabled as *mut u32 as *mut _,
            std::mem::size_of::<u32>() as u32,
            std::ptr::null_mut(),
            0,
            &mut returned,
            std::ptr::null_mut(),
            None,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn quick_config() -> SsdpConfig {
        SsdpConfig {
            search_window_ms: 300,
            ..SsdpConfig::default()
        }
    }

    #[test]
    fn test_msearch_payload() {
        let group: SocketAddr = "239.255.255.250:1900".parse().unwrap();
        let payload = build_msearch(group, "urn:schemas-upnp-org:device:MediaRenderer:1", 3);

        assert!(payload.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(payload.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(payload.contains("ST: urn:schemas-upnp-org:device:MediaRenderer:1\r\n"));
        assert!(payload.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(payload.contains("MX: 3\r\n"));
        assert!(payload.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_msearch_payload_ipv6_host() {
        let group = AddressClass::Ipv6LinkLocal.multicast_group().unwrap();
        let payload = build_msearch(group, "ssdp:all", 3);
        assert!(payload.contains("HOST: [ff02::c]:1900\r\n"));
    }

    #[test]
    fn test_unknown_address_returns_empty_without_socket() {
        // ::1 is bindable but has no SSDP group. The runtime has neither IO
        // nor timers: reaching the socket or the receive window would panic.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let local = LocalAddress::new("::1".parse().unwrap(), "lo", 0);
        assert_eq!(AddressClass::classify(&local.ip), AddressClass::Unknown);

        let responses = runtime.block_on(search_address(&local, "ssdp:all", &quick_config()));
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn test_run_search_sends_burst_and_collects_replies() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = responder.local_addr().unwrap();
        let searcher = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let reply = "HTTP/1.1 200 OK\r\nUSN: uuid:abc\r\nLOCATION: http://127.0.0.1/desc.xml\r\n\r\n";
        let responder_task = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let mut received = Vec::new();
            for _ in 0..3 {
                let (n, from) = responder.recv_from(&mut buf).await.unwrap();
                received.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                if received.len() == 1 {
                    responder.send_to(reply.as_bytes(), from).await.unwrap();
                }
            }
            received
        });

        let payload = build_msearch(responder_addr, "ssdp:all", 3);
        let config = quick_config();
        let started = Instant::now();
        let responses = run_search(&searcher, responder_addr, &payload, &config)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].payload, reply);
        assert_eq!(responses[0].from, responder_addr);

        let received = responder_task.await.unwrap();
        assert_eq!(received.len(), 3);
        assert!(received.iter().all(|r| r == &payload));
    }

    #[tokio::test]
    async fn test_search_all_skips_unknown_addresses() {
        let addresses = vec![LocalAddress::new("2001:db8::1".parse().unwrap(), "eth0", 2)];
        let started = Instant::now();
        let responses = search_all(addresses, "ssdp:all", &quick_config()).await;
        assert!(responses.is_empty());
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_search_all_takes_one_window_for_several_addresses() {
        let config = quick_config();
        let addresses = vec![
            LocalAddress::new("127.0.0.1".parse().unwrap(), "lo", 1),
            LocalAddress::new("127.0.0.1".parse().unwrap(), "lo", 1),
        ];

        let started = Instant::now();
        let responses = search_all(addresses, "ssdp:all", &config).await;

        // Nobody answers on loopback; searches run side by side.
        assert!(responses.is_empty());
        assert!(started.elapsed() < 2 * config.search_window());
    }

    #[tokio::test]
    async fn test_fan_out_merges_every_address() {
        let window = Duration::from_millis(200);
        let addresses: Vec<LocalAddress> = (1..=3)
            .map(|i| LocalAddress::new(format!("10.0.0.{i}").parse().unwrap(), "eth0", i))
            .collect();

        let started = Instant::now();
        let responses = fan_out(addresses, move |local| async move {
            tokio::time::sleep(window).await;
            vec![SsdpResponse {
                from: SocketAddr::new(local.ip, 1900),
                payload: format!("from {}", local.interface_index),
            }]
        })
        .await;

        assert!(started.elapsed() < 2 * window);
        let mut payloads: Vec<&str> = responses.iter().map(|r| r.payload.as_str()).collect();
        payloads.sort();
        assert_eq!(payloads, vec!["from 1", "from 2", "from 3"]);
    }
}
