//! Maps an IPoIB interface back to the adapter port it rides on.

use tracing::debug;

use crate::sysfs::{self, Sysfs};
use crate::types::PortLocator;

/// Finds the device/port whose GID (index 0) is embedded in the hardware
/// address of `interface`.
///
/// Only the ports of the interface's own backing device are searched.
/// `None` means no mapping exists; callers must not query counters then.
pub(crate) fn resolve(sysfs: &Sysfs, interface: &str) -> Option<PortLocator> {
    let if_path = sysfs.interface(interface);

    let Some(address) = sysfs::read_attr(&if_path.join("address")) else {
        debug!(interface, "no hardware address");
        return None;
    };
    let address = sysfs::normalize_hex(&address);
    let wanted_gid = sysfs::gid_of_hw_addr(&address)?;

    for (device, device_path) in sysfs::sorted_entries(&if_path.join("device/infiniband")) {
        for (port_name, port_path) in sysfs::sorted_entries(&device_path.join("ports")) {
            let Ok(port_number) = port_name.parse::<u16>() else {
                continue;
            };
            let Some(gid) = sysfs::read_attr(&port_path.join("gids/0")) else {
                continue;
            };

            if sysfs::normalize_hex(&gid) == wanted_gid {
                let found = PortLocator {
                    device,
                    port_number,
                };
                debug!(interface, port = %found, "resolved interface");
                return Some(found);
            }
        }
    }

    debug!(interface, "no GID matches hardware address");
    None
}
