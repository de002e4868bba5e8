pub(crate) mod parse;
pub(crate) mod perfquery;

use std::collections::BTreeMap;

use crate::error::QueryError;
use crate::types::Traffic;

/// Transmitted-octets counter names, legacy first then extended.
const XMIT_DATA_KEYS: &[&str] = &["XmtData", "PortXmitData"];
/// Received-octets counter names, legacy first then extended.
const RCV_DATA_KEYS: &[&str] = &["RcvData", "PortRcvData"];

/// Counters of one device/port at one instant, data counters in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CounterSnapshot {
    counters: BTreeMap<String, u64>,
}

impl CounterSnapshot {
    pub(crate) fn insert(&mut self, key: impl Into<String>, value: u64) {
        self.counters.insert(key.into(), value);
    }

    pub(crate) fn get(&self, key: &str) -> Option<u64> {
        self.counters.get(key).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.counters.len()
    }

    fn first_of(&self, keys: &[&str]) -> Option<u64> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Sent/received bytes, or `IncompleteSnapshot` naming what is missing.
    pub(crate) fn traffic(&self, interface: &str) -> Result<Traffic, QueryError> {
        let sent = self.first_of(XMIT_DATA_KEYS);
        let received = self.first_of(RCV_DATA_KEYS);

        match (sent, received) {
            (Some(sent), Some(received)) => Ok(Traffic { sent, received }),
            _ => {
                let mut missing = Vec::new();
                if sent.is_none() {
                    missing.push(XMIT_DATA_KEYS[0]);
                }
                if received.is_none() {
                    missing.push(RCV_DATA_KEYS[0]);
                }
                Err(QueryError::IncompleteSnapshot {
                    interface: interface.to_string(),
                    missing,
                })
            }
        }
    }
}

/// Reads the counters behind a named interface.
pub(crate) trait CounterSource {
    fn query(&self, interface: &str) -> Result<CounterSnapshot, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traffic_legacy_keys() {
        let mut snapshot = CounterSnapshot::default();
        snapshot.insert("XmtData", 492);
        snapshot.insert("RcvData", 800);
        snapshot.insert("LinkDowned", 0);

        assert_eq!(
            snapshot.traffic("ib0"),
            Ok(Traffic {
                sent: 492,
                received: 800
            })
        );
    }

    #[test]
    fn test_traffic_extended_keys() {
        let mut snapshot = CounterSnapshot::default();
        snapshot.insert("PortXmitData", 4);
        snapshot.insert("PortRcvData", 8);

        assert_eq!(
            snapshot.traffic("ib0"),
            Ok(Traffic {
                sent: 4,
                received: 8
            })
        );
    }

    #[test]
    fn test_traffic_incomplete() {
        let mut snapshot = CounterSnapshot::default();
        snapshot.insert("XmtData", 4);

        assert_eq!(
            snapshot.traffic("ib0"),
            Err(QueryError::IncompleteSnapshot {
                interface: "ib0".to_string(),
                missing: vec!["RcvData"],
            })
        );

        let empty = CounterSnapshot::default();
        assert!(matches!(
            empty.traffic("ib0"),
            Err(QueryError::IncompleteSnapshot { missing, .. }) if missing.len() == 2
        ));
    }
}
