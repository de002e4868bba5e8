use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::history::{HistoryCollector, SeriesHistory};
use crate::sampler::Sample;
use crate::types::Traffic;

#[derive(Debug, Clone, Default)]
pub(crate) struct SeriesRate {
    pub(crate) sent_per_sec: f64,
    pub(crate) received_per_sec: f64,
}

/// Turns successive cumulative samples into per-second rates.
#[derive(Debug)]
pub(crate) struct MetricsCollector {
    previous_counters: HashMap<String, Traffic>,
    current_metrics: HashMap<String, SeriesRate>,
    errors: HashMap<String, String>,
    last_collection: Option<Instant>,
    /// Counters restart from zero after each read, so a raw value is
    /// already the delta.
    reset_after_read: bool,
    history: HistoryCollector,
}

impl MetricsCollector {
    pub(crate) fn new(reset_after_read: bool) -> Self {
        Self {
            previous_counters: HashMap::new(),
            current_metrics: HashMap::new(),
            errors: HashMap::new(),
            last_collection: None,
            reset_after_read,
            history: HistoryCollector::new(),
        }
    }

    pub(crate) fn update(&mut self, sample: &Sample) {
        self.update_at(sample, Instant::now());
    }

    fn update_at(&mut self, sample: &Sample, now: Instant) {
        let time_delta = self
            .last_collection
            .map_or(Duration::from_secs(1), |last| now.duration_since(last));

        let mut current_names = HashSet::new();

        for series in &sample.series {
            current_names.insert(series.name.clone());

            match &series.result {
                Ok(traffic) => {
                    self.errors.remove(&series.name);

                    if let Some(prev) = self.previous_counters.get(&series.name) {
                        let rate = self.calculate_rates(prev, traffic, time_delta);
                        self.history
                            .record(&series.name, rate.sent_per_sec, rate.received_per_sec);
                        self.current_metrics.insert(series.name.clone(), rate);
                    }

                    self.previous_counters.insert(series.name.clone(), *traffic);
                }
                Err(err) => {
                    // next success starts a fresh baseline
                    self.previous_counters.remove(&series.name);
                    self.current_metrics.remove(&series.name);
                    self.errors.insert(series.name.clone(), err.to_string());
                }
            }
        }

        self.previous_counters
            .retain(|key, _| current_names.contains(key));
        self.current_metrics
            .retain(|key, _| current_names.contains(key));
        self.errors.retain(|key, _| current_names.contains(key));
        let names: Vec<String> = current_names.into_iter().collect();
        self.history.retain_series(&names);

        self.last_collection = Some(now);
    }

    #[allow(clippy::cast_precision_loss)]
    fn calculate_rates(&self, prev: &Traffic, current: &Traffic, time_delta: Duration) -> SeriesRate {
        let delta_seconds = time_delta.as_secs_f64();

        if delta_seconds == 0.0 {
            return SeriesRate::default();
        }

        let (sent_delta, received_delta) = if self.reset_after_read {
            (current.sent, current.received)
        } else {
            (
                current.sent.saturating_sub(prev.sent),
                current.received.saturating_sub(prev.received),
            )
        };

        SeriesRate {
            sent_per_sec: sent_delta as f64 / delta_seconds,
            received_per_sec: received_delta as f64 / delta_seconds,
        }
    }

    pub(crate) fn get_metrics(&self, series: &str) -> Option<&SeriesRate> {
        self.current_metrics.get(series)
    }

    pub(crate) fn get_error(&self, series: &str) -> Option<&str> {
        self.errors.get(series).map(String::as_str)
    }

    pub(crate) fn get_history(&self, series: &str) -> Option<&SeriesHistory> {
        self.history.get(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::sampler::SeriesSample;

    fn sample(entries: &[(&str, Result<(u64, u64), ()>)]) -> Sample {
        Sample {
            series: entries
                .iter()
                .map(|(name, result)| SeriesSample {
                    name: (*name).to_string(),
                    result: result
                        .map(|(sent, received)| Traffic { sent, received })
                        .map_err(|()| QueryError::Unresolved {
                            interface: (*name).to_string(),
                        }),
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_sample_has_no_rate() {
        let mut metrics = MetricsCollector::new(false);
        metrics.update_at(&sample(&[("total", Ok((100, 200)))]), Instant::now());
        assert!(metrics.get_metrics("total").is_none());
    }

    #[test]
    fn test_rates_from_cumulative_counters() {
        let mut metrics = MetricsCollector::new(false);
        let start = Instant::now();

        metrics.update_at(&sample(&[("ib0", Ok((1000, 4000)))]), start);
        metrics.update_at(
            &sample(&[("ib0", Ok((3000, 5000)))]),
            start + Duration::from_secs(2),
        );

        let rate = metrics.get_metrics("ib0").unwrap();
        assert!((rate.sent_per_sec - 1000.0).abs() < 0.001);
        assert!((rate.received_per_sec - 500.0).abs() < 0.001);
        assert_eq!(metrics.get_history("ib0").unwrap().sent_per_sec.len(), 1);
    }

    #[test]
    fn test_counter_wrap_saturates() {
        let mut metrics = MetricsCollector::new(false);
        let start = Instant::now();

        metrics.update_at(&sample(&[("ib0", Ok((5000, 5000)))]), start);
        metrics.update_at(
            &sample(&[("ib0", Ok((10, 10)))]),
            start + Duration::from_secs(1),
        );

        let rate = metrics.get_metrics("ib0").unwrap();
        assert!(rate.sent_per_sec.abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_after_read_uses_raw_value() {
        let mut metrics = MetricsCollector::new(true);
        let start = Instant::now();

        metrics.update_at(&sample(&[("ib0", Ok((400, 800)))]), start);
        metrics.update_at(
            &sample(&[("ib0", Ok((400, 800)))]),
            start + Duration::from_secs(4),
        );

        let rate = metrics.get_metrics("ib0").unwrap();
        assert!((rate.sent_per_sec - 100.0).abs() < 0.001);
        assert!((rate.received_per_sec - 200.0).abs() < 0.001);
    }

    #[test]
    fn test_error_clears_rate_and_baseline() {
        let mut metrics = MetricsCollector::new(false);
        let start = Instant::now();

        metrics.update_at(&sample(&[("ib1", Ok((0, 0)))]), start);
        metrics.update_at(
            &sample(&[("ib1", Ok((10, 10)))]),
            start + Duration::from_secs(1),
        );
        assert!(metrics.get_metrics("ib1").is_some());

        metrics.update_at(&sample(&[("ib1", Err(()))]), start + Duration::from_secs(2));
        assert!(metrics.get_metrics("ib1").is_none());
        assert!(metrics.get_error("ib1").unwrap().contains("ib1"));

        metrics.update_at(
            &sample(&[("ib1", Ok((1_000_000, 1_000_000)))]),
            start + Duration::from_secs(3),
        );
        assert!(metrics.get_metrics("ib1").is_none());
        assert!(metrics.get_error("ib1").is_none());
    }

    #[test]
    fn test_stale_series_removed() {
        let mut metrics = MetricsCollector::new(false);
        let start = Instant::now();

        metrics.update_at(
            &sample(&[("ib0", Ok((0, 0))), ("ib1", Ok((0, 0)))]),
            start,
        );
        metrics.update_at(
            &sample(&[("ib0", Ok((1, 1))), ("ib1", Ok((1, 1)))]),
            start + Duration::from_secs(1),
        );
        metrics.update_at(
            &sample(&[("ib0", Ok((2, 2)))]),
            start + Duration::from_secs(2),
        );

        assert!(metrics.get_metrics("ib1").is_none());
        assert!(metrics.get_history("ib1").is_none());
        assert!(metrics.get_metrics("ib0").is_some());
    }
}
