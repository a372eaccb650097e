//! Request timing log: records how long each category of API action takes
//! so scrape runs can be profiled after the fact. All times in
//! milliseconds.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::summary::round2;

/// One start/end span. `end == 0` means the action is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ActionSpan {
    start: i64,
    end: i64,
}

/// Duration statistics for one action category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStats {
    pub n: usize,
    pub min_ms: i64,
    pub max_ms: i64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
}

/// Per-category request timings for one scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTimings {
    logs: BTreeMap<String, Vec<ActionSpan>>,
    started: i64,
}

impl RequestTimings {
    pub fn new() -> Self {
        RequestTimings {
            logs: BTreeMap::new(),
            started: now_ms(),
        }
    }

    /// Opens a span for `action`. A category with an unfinished span keeps
    /// it; overlapping spans of the same category are not tracked.
    pub fn start_action(&mut self, action: &str) {
        let spans = self.logs.entry(action.to_string()).or_default();
        match spans.last() {
            Some(open) if open.end == 0 => {}
            _ => spans.push(ActionSpan {
                start: now_ms(),
                end: 0,
            }),
        }
    }

    /// Closes the most recent span for `action`, if one is open.
    pub fn end_action(&mut self, action: &str) {
        if let Some(open) = self
            .logs
            .get_mut(action)
            .and_then(|spans| spans.last_mut())
        {
            if open.end == 0 {
                open.end = now_ms();
            }
        }
    }

    /// Milliseconds since this log was created.
    pub fn elapsed_ms(&self) -> i64 {
        now_ms() - self.started
    }

    /// Duration statistics per action category, finished spans only.
    pub fn stats(&self) -> BTreeMap<String, ActionStats> {
        self.logs
            .iter()
            .filter_map(|(action, spans)| {
                let stats = span_stats(spans)?;
                Some((action.clone(), stats))
            })
            .collect()
    }

    /// Logs the per-category stats at info level.
    pub fn log_stats(&self) {
        for (action, stats) in self.stats() {
            info!(
                action = %action,
                requests = stats.n,
                mean_ms = stats.mean_ms,
                min_ms = stats.min_ms,
                max_ms = stats.max_ms,
                std_dev_ms = stats.std_dev_ms,
                "request timings"
            );
        }
        info!(total_ms = self.elapsed_ms(), "scrape run finished");
    }
}

impl Default for RequestTimings {
    fn default() -> Self {
        Self::new()
    }
}

/// One appended runtime-log row describing a finished scrape run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeLogEntry {
    pub time_started: i64,
    pub time_ended: i64,
    pub content_type: String,
    pub num_items: usize,
    pub logs: BTreeMap<String, ActionStats>,
}

/// Appends one run to the NDJSON runtime log. Each run is a single line so
/// the log can grow forever without rewrites.
pub fn append_runtime_log(
    path: impl AsRef<Path>,
    timings: &RequestTimings,
    content_type: &str,
    num_items: usize,
) -> std::io::Result<()> {
    let entry = RuntimeLogEntry {
        time_started: timings.started,
        time_ended: now_ms(),
        content_type: content_type.to_string(),
        num_items,
        logs: timings.stats(),
    };
    let line = serde_json::to_string(&entry).expect("runtime log entry always serializes");

    if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn span_stats(spans: &[ActionSpan]) -> Option<ActionStats> {
    let durations: Vec<i64> = spans
        .iter()
        .filter(|s| s.end > 0)
        .map(|s| s.end - s.start)
        .collect();
    if durations.is_empty() {
        return None;
    }

    let n = durations.len();
    let min = *durations.iter().min().expect("non-empty");
    let max = *durations.iter().max().expect("non-empty");
    let mean = durations.iter().sum::<i64>() as f64 / n as f64;

    let squared_error: f64 = durations
        .iter()
        .map(|&d| {
            let diff = mean - d as f64;
            diff * diff
        })
        .sum();
    let variance = if n > 1 {
        squared_error / (n - 1) as f64
    } else {
        0.0
    };

    Some(ActionStats {
        n,
        min_ms: min,
        max_ms: max,
        mean_ms: round2(mean),
        std_dev_ms: round2(variance.sqrt()),
    })
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
