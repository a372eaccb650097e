//! Two-pass distribution statistics over the tracked population.
//!
//! Standard deviation needs the mean, and the mean is only known after a
//! full scan, so the summary runs in two passes: pass one collects counts,
//! sums, extrema and the value lists for the medians; pass two accumulates
//! squared deviations against the finished means. Per-broadcaster values
//! are cached between passes so the history is only walked once.

use serde::{Deserialize, Serialize};

use crate::tracking::{Broadcaster, Population};

/// Distribution of one measured quantity across contributing broadcasters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityStats {
    /// Number of broadcasters with a non-zero value for this quantity
    pub sample_count: usize,
    pub min: u64,
    pub max: u64,
    /// Rounded to 2 decimals
    pub mean: f64,
    /// Lower median: element at index `floor(n / 2)` of the ascending sort
    pub median: u64,
    /// Sample standard deviation (n - 1 denominator), rounded to 2 decimals
    pub std_dev: f64,
}

/// Population-wide history statistics for the four measured quantities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Live session starts per broadcaster
    pub live_sessions: QuantityStats,
    /// Distinct livestreamed titles per broadcaster
    pub live_titles: QuantityStats,
    /// Recording session starts per broadcaster
    pub recordings: QuantityStats,
    /// Distinct recorded titles per broadcaster (of those with recordings)
    pub recording_titles: QuantityStats,
}

const QUANTITIES: usize = 4;

/// Running state for one quantity during the passes.
#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sum: u64,
    min: Option<u64>,
    max: Option<u64>,
    values: Vec<u64>,
    mean: f64,
    squared_error: f64,
}

impl Accumulator {
    /// Pass-one observation. Zero values do not contribute to any statistic.
    fn observe(&mut self, value: u64) {
        if value == 0 {
            return;
        }
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.values.push(value);
    }

    /// Closes pass one: fixes the mean and the lower median.
    fn finish_first_pass(&mut self) {
        if self.count > 0 {
            self.mean = self.sum as f64 / self.count as f64;
        }
        self.values.sort_unstable();
    }

    /// Pass-two observation against the finished mean.
    fn observe_deviation(&mut self, value: u64) {
        if value == 0 {
            return;
        }
        let diff = self.mean - value as f64;
        self.squared_error += diff * diff;
    }

    fn into_stats(self) -> QuantityStats {
        let median = self
            .values
            .get(self.values.len() / 2)
            .copied()
            .unwrap_or(0);
        // sample variance; a single observation has no spread
        let variance = if self.count > 1 {
            self.squared_error / (self.count - 1) as f64
        } else {
            0.0
        };
        QuantityStats {
            sample_count: self.count,
            min: self.min.unwrap_or(0),
            max: self.max.unwrap_or(0),
            mean: round2(self.mean),
            median,
            std_dev: round2(variance.sqrt()),
        }
    }
}

/// The four per-broadcaster values, in summary field order.
fn quantity_values(broadcaster: &Broadcaster) -> [u64; QUANTITIES] {
    [
        broadcaster.live_session_count(),
        broadcaster.live_title_count(),
        broadcaster.recording_session_count(),
        broadcaster.recording_title_count(),
    ]
}

/// Computes the full history summary. Pure read; never fails — an empty
/// population just yields all-zero records.
pub fn summarize(population: &Population) -> HistorySummary {
    let mut accumulators: [Accumulator; QUANTITIES] = Default::default();

    // first pass: counts, sums, extrema, median lists; cache the values so
    // the second pass doesn't walk the histories again
    let mut cache: Vec<[u64; QUANTITIES]> = Vec::with_capacity(population.len());
    for (_, broadcaster) in population.iter() {
        let values = quantity_values(broadcaster);
        for (acc, value) in accumulators.iter_mut().zip(values) {
            acc.observe(value);
        }
        cache.push(values);
    }
    for acc in accumulators.iter_mut() {
        acc.finish_first_pass();
    }

    // second pass: squared deviations from the now-known means
    for values in &cache {
        for (acc, value) in accumulators.iter_mut().zip(values) {
            acc.observe_deviation(*value);
        }
    }

    let [live_sessions, live_titles, recordings, recording_titles] =
        accumulators.map(Accumulator::into_stats);
    HistorySummary {
        live_sessions,
        live_titles,
        recordings,
        recording_titles,
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
