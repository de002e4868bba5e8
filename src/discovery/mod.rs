pub(crate) mod address;
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use tracing::debug;

use crate::sysfs::{self, Sysfs};
use crate::types::{IbPort, LinkState, NetInterface, OperState};

/// Source of the interface names the `ib` and `ipoib` keywords expand to.
pub(crate) trait PortDiscovery {
    /// Interfaces riding on an `InfiniBand` port whose link is active.
    fn active_ib_ports(&self) -> Vec<String>;

    /// IPoIB interfaces that are operationally up.
    fn active_ipoib(&self) -> Vec<String>;
}

impl PortDiscovery for Sysfs {
    fn active_ib_ports(&self) -> Vec<String> {
        list_active_ib_ports(self)
    }

    fn active_ipoib(&self) -> Vec<String> {
        list_active_ipoib(self)
    }
}

/// Enumerates every port of every adapter under `class/infiniband`.
pub(crate) fn discover_ib_ports(sysfs: &Sysfs) -> Vec<IbPort> {
    let mut ports = Vec::new();

    for (device, device_path) in sysfs::sorted_entries(&sysfs.infiniband_class()) {
        for (port_name, port_path) in sysfs::sorted_entries(&device_path.join("ports")) {
            let Ok(port_number) = port_name.parse::<u16>() else {
                continue;
            };
            ports.push(create_port_info(device.clone(), port_number, &port_path));
        }
    }

    ports
}

fn create_port_info(device: String, port_number: u16, port_path: &Path) -> IbPort {
    let state = sysfs::read_attr(&port_path.join("state"))
        .map_or(LinkState::Unknown, |raw| LinkState::from_sysfs(&raw));
    let gid = sysfs::read_attr(&port_path.join("gids/0")).map(|raw| sysfs::normalize_hex(&raw));

    IbPort {
        device,
        port_number,
        state,
        gid,
    }
}

/// Enumerates every interface under `class/net`.
pub(crate) fn discover_interfaces(sysfs: &Sysfs) -> Vec<NetInterface> {
    sysfs::sorted_entries(&sysfs.net_class())
        .into_iter()
        .map(|(name, path)| create_interface_info(name, &path))
        .collect()
}

fn create_interface_info(name: String, if_path: &Path) -> NetInterface {
    let address = sysfs::read_attr(&if_path.join("address")).map(|raw| sysfs::normalize_hex(&raw));
    let oper_state = sysfs::read_attr(&if_path.join("operstate"))
        .map_or(OperState::Other, |raw| OperState::from_sysfs(&raw));
    let has_ib_device = if_path.join("device/infiniband").exists();

    NetInterface {
        name,
        address,
        oper_state,
        has_ib_device,
    }
}

/// Names of the interfaces whose hardware address embeds the GID of an
/// active port, sorted and unique.
pub(crate) fn list_active_ib_ports(sysfs: &Sysfs) -> Vec<String> {
    let active_gids: HashSet<String> = discover_ib_ports(sysfs)
        .into_iter()
        .filter(|port| {
            if port.state.is_active() {
                true
            } else {
                debug!(device = %port.device, port = port.port_number, state = %port.state, "skipping inactive port");
                false
            }
        })
        .filter_map(|port| port.gid)
        .collect();

    let found: BTreeSet<String> = discover_interfaces(sysfs)
        .into_iter()
        .filter(|iface| {
            iface
                .address
                .as_deref()
                .and_then(sysfs::gid_of_hw_addr)
                .is_some_and(|gid| active_gids.contains(gid))
        })
        .map(|iface| iface.name)
        .collect();

    found.into_iter().collect()
}

/// Names of the interfaces that are up and backed by an `InfiniBand`
/// device, sorted.
pub(crate) fn list_active_ipoib(sysfs: &Sysfs) -> Vec<String> {
    // discover_interfaces already yields name order
    discover_interfaces(sysfs)
        .into_iter()
        .filter(|iface| iface.oper_state == OperState::Up && iface.has_ib_device)
        .map(|iface| iface.name)
        .collect()
}
