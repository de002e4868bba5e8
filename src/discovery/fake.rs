//! Simulated fabric for demos on hosts without `InfiniBand` hardware.

use std::cell::RefCell;
use std::collections::HashMap;

use super::PortDiscovery;
use crate::counters::{CounterSnapshot, CounterSource};
use crate::error::QueryError;

struct FakePort {
    interface: &'static str,
    link_active: bool,
    oper_up: bool,
    /// Upper bound of quad-octets added per query, (xmit, rcv).
    max_step: (u64, u64),
}

const FAKE_PORTS: &[FakePort] = &[
    FakePort {
        interface: "ib0",
        link_active: true,
        oper_up: true,
        max_step: (80_000, 100_000),
    },
    FakePort {
        interface: "ib1",
        link_active: true,
        oper_up: true,
        max_step: (120_000, 150_000),
    },
    FakePort {
        interface: "ib2",
        link_active: false,
        oper_up: true,
        max_step: (1, 1),
    },
];

/// Cumulative quad-octet counters that grow by a random step per query.
#[derive(Debug, Default)]
pub(crate) struct FakeFabric {
    counters: RefCell<HashMap<&'static str, (u64, u64)>>,
}

impl FakeFabric {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl PortDiscovery for FakeFabric {
    fn active_ib_ports(&self) -> Vec<String> {
        FAKE_PORTS
            .iter()
            .filter(|p| p.link_active)
            .map(|p| p.interface.to_string())
            .collect()
    }

    fn active_ipoib(&self) -> Vec<String> {
        FAKE_PORTS
            .iter()
            .filter(|p| p.oper_up)
            .map(|p| p.interface.to_string())
            .collect()
    }
}

impl CounterSource for FakeFabric {
    fn query(&self, interface: &str) -> Result<CounterSnapshot, QueryError> {
        let port = FAKE_PORTS
            .iter()
            .find(|p| p.interface == interface)
            .ok_or_else(|| QueryError::Unresolved {
                interface: interface.to_string(),
            })?;

        let mut counters = self.counters.borrow_mut();
        let (xmit, rcv) = counters.entry(port.interface).or_insert((1_234_567, 2_345_678));
        if port.link_active {
            *xmit += rand::random::<u64>() % port.max_step.0;
            *rcv += rand::random::<u64>() % port.max_step.1;
        }

        // values are in bytes, as parse::parse_output would report them
        let mut snapshot = CounterSnapshot::default();
        snapshot.insert("XmtData", *xmit * 4);
        snapshot.insert("RcvData", *rcv * 4);
        snapshot.insert("LinkDownedCounter", u64::from(!port.link_active));
        Ok(snapshot)
    }
}
