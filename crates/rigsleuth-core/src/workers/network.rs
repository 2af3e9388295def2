/// Network identity: hostname, primary IPv4 address, adapters.
use super::{Category, Publisher};
use crate::error::{ProbeError, WorkerError};
use crate::platform::{HostEnv, InterfaceInfo};
use crate::probe::{
    parse, CommandProbe, Confidence, FnProbe, ProbeAnswer, ProbeChain, ProbeMethod,
    VirtualFileProbe,
};
use crate::snapshot::{AdapterInfo, InfoKey, InfoValue, NetworkInfo};

use std::net::{IpAddr, ToSocketAddrs};

pub fn run(host: &HostEnv, out: &Publisher) -> Result<(), WorkerError> {
    let hostname = hostname_chain().resolve(host);
    let hostname = hostname.is_known().then_some(hostname.value);

    let ip = ip_chain(hostname.clone()).resolve(host);
    let ip_address = ip.is_known().then_some(ip.value);

    let interfaces = host.system.interfaces();
    let adapters: Vec<AdapterInfo> = interfaces
        .iter()
        .filter(|i| !is_loopback(i))
        .map(|i| AdapterInfo {
            name: i.name.clone(),
            mac: i.mac.clone(),
            addresses: i.addresses.iter().map(IpAddr::to_string).collect(),
            received_bytes: i.received_bytes,
            transmitted_bytes: i.transmitted_bytes,
        })
        .collect();

    if hostname.is_none() && ip_address.is_none() && adapters.is_empty() {
        return Err(Category::Network.failure("no hostname, address or adapter found"));
    }

    let mac_address = ip_address
        .as_deref()
        .and_then(|ip| mac_for_address(&interfaces, ip));

    out.publish(
        InfoKey::Network,
        InfoValue::Network(NetworkInfo {
            hostname,
            ip_address,
            mac_address,
            adapters,
        }),
    );
    Ok(())
}

fn is_loopback(iface: &InterfaceInfo) -> bool {
    iface.name == "lo"
        || (!iface.addresses.is_empty() && iface.addresses.iter().all(IpAddr::is_loopback))
}

/// MAC of the adapter that holds `ip`.
pub fn mac_for_address(interfaces: &[InterfaceInfo], ip: &str) -> Option<String> {
    let ip: IpAddr = ip.parse().ok()?;
    interfaces
        .iter()
        .find(|i| i.addresses.contains(&ip))
        .map(|i| i.mac.clone())
        .filter(|mac| mac != "00:00:00:00:00:00")
}

pub fn hostname_chain() -> ProbeChain {
    ProbeChain::new("hostname")
        .then(FnProbe::new("sysinfo hostname", ProbeMethod::ManagementInterface, |h| {
            h.system
                .hostname()
                .map(|v| ProbeAnswer::new(v, Confidence::Reported))
                .ok_or_else(|| ProbeError::Unavailable("hostname".into()))
        }))
        .then(VirtualFileProbe::new("/proc/sys/kernel/hostname"))
        .then(CommandProbe::tool("hostname", &[], parse::first_value_line))
}

/// Route probe, then `ip -4 addr`, then resolving the hostname.
pub fn ip_chain(hostname: Option<String>) -> ProbeChain {
    ProbeChain::new("ip_address")
        .then(FnProbe::new("outbound route", ProbeMethod::ManagementInterface, |h| {
            h.system
                .outbound_ip()
                .map(|ip| ProbeAnswer::new(ip.to_string(), Confidence::Authoritative))
                .ok_or_else(|| ProbeError::Unavailable("outbound route".into()))
        }))
        .then(CommandProbe::tool("ip", &["-4", "addr"], |out| {
            parse::ip_addr_primary(out).map(|ip| ip.to_string())
        }))
        .then(FnProbe::heuristic("hostname resolution", move |_| {
            let name = hostname.as_deref()?;
            (name, 0)
                .to_socket_addrs()
                .ok()?
                .map(|a| a.ip())
                .find(|ip| ip.is_ipv4() && !ip.is_loopback())
                .map(|ip| ip.to_string())
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn iface(name: &str, mac: &str, ip: [u8; 4]) -> InterfaceInfo {
        InterfaceInfo {
            name: name.into(),
            mac: mac.into(),
            addresses: vec![IpAddr::V4(Ipv4Addr::from(ip))],
            received_bytes: 0,
            transmitted_bytes: 0,
        }
    }

    #[test]
    fn mac_comes_from_adapter_holding_ip() {
        let ifaces = vec![
            iface("lo", "00:00:00:00:00:00", [127, 0, 0, 1]),
            iface("eth0", "3c:52:82:aa:bb:01", [10, 0, 0, 5]),
            iface("wlan0", "f4:8c:50:cc:dd:02", [192, 168, 1, 23]),
        ];
        assert_eq!(
            mac_for_address(&ifaces, "192.168.1.23").as_deref(),
            Some("f4:8c:50:cc:dd:02")
        );
        assert_eq!(mac_for_address(&ifaces, "127.0.0.1"), None);
        assert_eq!(mac_for_address(&ifaces, "not an ip"), None);
        assert!(is_loopback(&ifaces[0]));
        assert!(!is_loopback(&ifaces[1]));
    }
}
