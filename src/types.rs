use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Logical link state of an `InfiniBand` port as exposed in `ports/N/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    Down,
    Init,
    Armed,
    Active,
    ActiveDefer,
    Unknown,
}

impl LinkState {
    /// Parses the raw sysfs text, e.g. `4: ACTIVE` or plain `ACTIVE`.
    pub(crate) fn from_sysfs(raw: &str) -> Self {
        let raw = raw.trim();
        let state_str = if let Some(colon_pos) = raw.find(':') {
            raw[colon_pos + 1..].trim()
        } else {
            raw
        };

        state_str.parse().unwrap_or(LinkState::Unknown)
    }

    /// Any state whose name contains `ACTIVE` carries traffic.
    pub(crate) fn is_active(self) -> bool {
        matches!(self, LinkState::Active | LinkState::ActiveDefer)
    }
}

impl FromStr for LinkState {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOWN" => Ok(LinkState::Down),
            "INIT" => Ok(LinkState::Init),
            "ARMED" => Ok(LinkState::Armed),
            "ACTIVE" => Ok(LinkState::Active),
            "ACTIVE_DEFER" => Ok(LinkState::ActiveDefer),
            _ => Err(()),
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Down => "DOWN",
            LinkState::Init => "INIT",
            LinkState::Armed => "ARMED",
            LinkState::Active => "ACTIVE",
            LinkState::ActiveDefer => "ACTIVE_DEFER",
            LinkState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// RFC 2863 operational state from `class/net/<if>/operstate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperState {
    Up,
    Down,
    Other,
}

impl OperState {
    /// Only the exact text `up` counts as up.
    pub(crate) fn from_sysfs(raw: &str) -> Self {
        match raw.trim() {
            "up" => OperState::Up,
            "down" => OperState::Down,
            _ => OperState::Other,
        }
    }
}

/// One physical adapter port found under `class/infiniband`.
#[derive(Debug, Clone)]
pub(crate) struct IbPort {
    pub(crate) device: String,
    pub(crate) port_number: u16,
    pub(crate) state: LinkState,
    /// GID index 0, separators stripped, lowercase.
    pub(crate) gid: Option<String>,
}

/// One OS network interface found under `class/net`.
#[derive(Debug, Clone)]
pub(crate) struct NetInterface {
    pub(crate) name: String,
    /// Hardware address, separators stripped, lowercase.
    pub(crate) address: Option<String>,
    pub(crate) oper_state: OperState,
    pub(crate) has_ib_device: bool,
}

/// Device/port pair perfquery is pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PortLocator {
    pub(crate) device: String,
    pub(crate) port_number: u16,
}

impl fmt::Display for PortLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.port_number)
    }
}

/// Cumulative byte counters of one series at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub(crate) struct Traffic {
    pub(crate) sent: u64,
    pub(crate) received: u64,
}

impl std::ops::Add for Traffic {
    type Output = Traffic;

    fn add(self, rhs: Traffic) -> Traffic {
        Traffic {
            sent: self.sent.saturating_add(rhs.sent),
            received: self.received.saturating_add(rhs.received),
        }
    }
}
