//! Selection of the best local IPv4 address.
//!
//! On an HPC node there are usually several interfaces (management
//! Ethernet, high-speed Ethernet, InfiniBand IPoIB). Servers that other
//! nodes must reach bind to the fastest one: enumerate interfaces, drop
//! loopback and anything administratively or operationally down, look up
//! each survivor's advertised link rate in sysfs and keep the highest.
//! Ties go to enumeration order.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use tracing::debug;

/// Pick the IPv4 address of the fastest usable interface.
///
/// Returns `None` when no interface qualifies (no link speed readable, or
/// everything is down). Callers fall back to loopback in that case so that
/// development machines without sysfs link data still work.
pub fn best_local_ipv4() -> Option<Ipv4Addr> {
    let addrs = getifaddrs().ok()?;

    // getifaddrs yields one record per address family. Fold them into one
    // record per interface, keeping the first non-loopback IPv4.
    let mut order: Vec<String> = Vec::new();
    let mut flags_of: Vec<InterfaceFlags> = Vec::new();
    let mut ipv4_of: Vec<Option<Ipv4Addr>> = Vec::new();
    for ifa in addrs {
        let idx = match order.iter().position(|name| *name == ifa.interface_name) {
            Some(idx) => idx,
            None => {
                order.push(ifa.interface_name.clone());
                flags_of.push(ifa.flags);
                ipv4_of.push(None);
                order.len() - 1
            }
        };
        flags_of[idx] |= ifa.flags;
        if ipv4_of[idx].is_none() {
            if let Some(sin) = ifa.address.as_ref().and_then(|a| a.as_sockaddr_in()) {
                let ip = sin.ip();
                if !ip.is_loopback() {
                    ipv4_of[idx] = Some(ip);
                }
            }
        }
    }

    let mut best: Option<(i64, Ipv4Addr)> = None;
    for (idx, name) in order.iter().enumerate() {
        let flags = flags_of[idx];
        if flags.contains(InterfaceFlags::IFF_LOOPBACK) || !flags.contains(InterfaceFlags::IFF_UP) {
            continue;
        }
        if !oper_up(name) {
            continue;
        }
        let Some(ip) = ipv4_of[idx] else {
            continue;
        };
        let mbps = link_speed_mbps(name);
        if mbps <= 0 {
            continue;
        }
        debug!("candidate interface {} at {} ({} Mb/s)", name, ip, mbps);
        if best.map_or(true, |(best_mbps, _)| mbps > best_mbps) {
            best = Some((mbps, ip));
        }
    }

    best.map(|(_, ip)| ip)
}

/// Check the operational state of an interface.
fn oper_up(name: &str) -> bool {
    let base = Path::new("/sys/class/net").join(name);
    if let Some(state) = read_trimmed(&base.join("operstate")) {
        return state == "up";
    }
    read_int(&base.join("carrier")) == Some(1)
}

/// Advertised link rate in Mb/s, or a non-positive value when unreadable.
fn link_speed_mbps(name: &str) -> i64 {
    if let Some(speed) = ethernet_speed_mbps(name) {
        return speed;
    }
    infiniband_speed_mbps(name).unwrap_or(-1)
}

/// Ethernet rate from `/sys/class/net/<if>/speed`.
fn ethernet_speed_mbps(name: &str) -> Option<i64> {
    read_int(&Path::new("/sys/class/net").join(name).join("speed")).filter(|speed| *speed > 0)
}

/// IPoIB rate from `/sys/class/infiniband/<hca>/ports/<port>/rate`.
///
/// The rate file reads like `"100 Gb/sec (4X EDR)"`.
fn infiniband_speed_mbps(name: &str) -> Option<i64> {
    let base = Path::new("/sys/class/net").join(name);
    let hca_dir = base.join("device").join("infiniband");
    let hca = fs::read_dir(hca_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .next()?;

    let port = read_int(&base.join("dev_port")).filter(|p| *p > 0).unwrap_or(1);
    let rate = read_trimmed(
        &Path::new("/sys/class/infiniband")
            .join(&hca)
            .join("ports")
            .join(port.to_string())
            .join("rate"),
    )?;

    let mut parts = rate.split_whitespace();
    let value: f64 = parts.next()?.parse().ok()?;
    let unit = parts.next()?.to_ascii_lowercase();
    if unit.contains("gb") {
        Some((value * 1000.0).round() as i64)
    } else if unit.contains("mb") {
        Some(value.round() as i64)
    } else {
        None
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|content| content.trim().to_string())
}

fn read_int(path: &Path) -> Option<i64> {
    read_trimmed(path)?.parse().ok()
}
