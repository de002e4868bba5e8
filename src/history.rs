//! Ring buffers of recent per-series rates, for sparklines and charts.

#![allow(clippy::cast_precision_loss)] // Acceptable for metrics
#![allow(clippy::cast_possible_truncation)] // Acceptable for sparkline values
#![allow(clippy::cast_sign_loss)] // Values are always positive

use std::collections::HashMap;

/// Default history length (number of samples)
pub(crate) const DEFAULT_HISTORY_SIZE: usize = 120; // 2 minutes at 1 sample/sec

/// Fixed-capacity buffer that overwrites its oldest value
#[derive(Debug, Clone)]
pub(crate) struct RingBuffer<T: Clone + Default> {
    data: Vec<T>,
    capacity: usize,
    write_pos: usize,
    len: usize,
}

impl<T: Clone + Default> RingBuffer<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: vec![T::default(); capacity],
            capacity,
            write_pos: 0,
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, value: T) {
        self.data[self.write_pos] = value;
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.len = self.len.saturating_add(1).min(self.capacity);
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Values oldest to newest
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        let start = if self.len < self.capacity {
            0
        } else {
            self.write_pos
        };

        (0..self.len).map(move |i| {
            let idx = (start + i) % self.capacity;
            &self.data[idx]
        })
    }

    /// The last N values, oldest to newest
    pub(crate) fn last_n(&self, n: usize) -> impl Iterator<Item = &T> {
        let take_count = n.min(self.len);
        let skip_count = self.len.saturating_sub(take_count);
        self.iter().skip(skip_count)
    }
}

/// Recent send/receive rates of one series
#[derive(Debug, Clone)]
pub(crate) struct SeriesHistory {
    pub(crate) sent_per_sec: RingBuffer<f64>,
    pub(crate) received_per_sec: RingBuffer<f64>,
}

impl SeriesHistory {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            sent_per_sec: RingBuffer::new(capacity),
            received_per_sec: RingBuffer::new(capacity),
        }
    }

    pub(crate) fn record(&mut self, sent_bps: f64, received_bps: f64) {
        self.sent_per_sec.push(sent_bps);
        self.received_per_sec.push(received_bps);
    }

    /// Combined send+receive sparkline levels (0-7) of the last N samples
    pub(crate) fn combined_sparkline_data(&self, samples: usize) -> Vec<u64> {
        let sent: Vec<f64> = self.sent_per_sec.last_n(samples).copied().collect();
        let received: Vec<f64> = self.received_per_sec.last_n(samples).copied().collect();

        let combined: Vec<f64> = sent
            .iter()
            .zip(received.iter())
            .map(|(s, r)| s + r)
            .collect();
        normalize_for_sparkline(combined.iter())
    }

    /// Highest combined rate observed
    pub(crate) fn peak_throughput(&self) -> f64 {
        self.sent_per_sec
            .iter()
            .zip(self.received_per_sec.iter())
            .map(|(s, r)| s + r)
            .fold(0.0_f64, f64::max)
    }
}

/// Normalize values for sparkline display (0-7 range for 8-level sparkline)
fn normalize_for_sparkline<'a>(values: impl Iterator<Item = &'a f64>) -> Vec<u64> {
    let values: Vec<f64> = values.copied().collect();
    if values.is_empty() {
        return vec![];
    }

    let max = values.iter().copied().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0; values.len()];
    }

    values
        .iter()
        .map(|v| ((v / max) * 7.0).round() as u64)
        .collect()
}

/// Histories of all series, keyed by series name
#[derive(Debug, Default)]
pub(crate) struct HistoryCollector {
    histories: HashMap<String, SeriesHistory>,
    capacity: usize,
}

impl HistoryCollector {
    pub(crate) fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_SIZE)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            histories: HashMap::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, series: &str) -> Option<&SeriesHistory> {
        self.histories.get(series)
    }

    pub(crate) fn record(&mut self, series: &str, sent_bps: f64, received_bps: f64) {
        let capacity = self.capacity;
        self.histories
            .entry(series.to_string())
            .or_insert_with(|| SeriesHistory::with_capacity(capacity))
            .record(sent_bps, received_bps);
    }

    /// Drop histories of series that are no longer reported
    pub(crate) fn retain_series(&mut self, names: &[String]) {
        self.histories.retain(|key, _| names.contains(key));
    }
}
