//! One sampling cycle: query every configured series once.

use std::collections::HashMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::warn;

use crate::config::{SeriesConfig, TOTAL_SERIES};
use crate::counters::CounterSource;
use crate::error::QueryError;
use crate::types::Traffic;

/// Result of one series in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeriesSample {
    pub(crate) name: String,
    pub(crate) result: Result<Traffic, QueryError>,
}

/// All series of one cycle, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Sample {
    pub(crate) series: Vec<SeriesSample>,
}

impl Sample {
    #[cfg(test)]
    pub(crate) fn get(&self, name: &str) -> Option<&Result<Traffic, QueryError>> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.result)
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum SeriesValue<'a> {
    Ok(&'a Traffic),
    Err { error: String },
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.series.len()))?;
        for s in &self.series {
            let value = match &s.result {
                Ok(traffic) => SeriesValue::Ok(traffic),
                Err(err) => SeriesValue::Err {
                    error: err.to_string(),
                },
            };
            map.serialize_entry(&s.name, &value)?;
        }
        map.end()
    }
}

type CycleCache = HashMap<String, Result<Traffic, QueryError>>;

pub(crate) struct Sampler<S> {
    config: SeriesConfig,
    source: S,
}

impl<S: CounterSource> Sampler<S> {
    pub(crate) fn new(config: SeriesConfig, source: S) -> Self {
        Self { config, source }
    }

    pub(crate) fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Queries each distinct interface at most once and reports every
    /// configured series. A failing series never affects the others.
    pub(crate) fn sample(&self) -> Sample {
        // scoped to this cycle; adapters and counters change between cycles
        let mut cache = CycleCache::new();

        if self.config.has_total() {
            for port in &self.config.total_ports {
                self.prefetch(&mut cache, port);
            }
        }

        let series = self
            .config
            .series
            .iter()
            .map(|name| {
                let result = if name == TOTAL_SERIES {
                    self.total(&mut cache)
                } else {
                    self.lookup(&mut cache, name)
                };
                if let Err(err) = &result {
                    warn!(series = %name, error = %err, "sample failed");
                }
                SeriesSample {
                    name: name.clone(),
                    result,
                }
            })
            .collect();

        Sample { series }
    }

    fn fetch(&self, interface: &str) -> Result<Traffic, QueryError> {
        self.source
            .query(interface)
            .and_then(|snapshot| snapshot.traffic(interface))
    }

    /// Fills the cache entry of `interface` unless it is already present.
    fn prefetch(&self, cache: &mut CycleCache, interface: &str) {
        if !cache.contains_key(interface) {
            let result = self.fetch(interface);
            cache.insert(interface.to_string(), result);
        }
    }

    fn lookup(&self, cache: &mut CycleCache, interface: &str) -> Result<Traffic, QueryError> {
        self.prefetch(cache, interface);
        cache
            .get(interface)
            .cloned()
            .unwrap_or_else(|| self.fetch(interface))
    }

    fn total(&self, cache: &mut CycleCache) -> Result<Traffic, QueryError> {
        let mut sum = Traffic::default();
        let mut failed = Vec::new();

        for port in &self.config.total_ports {
            match self.lookup(cache, port) {
                Ok(traffic) => sum = sum + traffic,
                Err(_) => failed.push(port.clone()),
            }
        }

        if failed.is_empty() {
            Ok(sum)
        } else {
            Err(QueryError::TotalIncomplete { failed })
        }
    }
}
