//! Population-level scrape health report: coverage counts, percentages and
//! a few histograms. Useful for spotting irregularities in the scraping
//! (broadcasters with no recordings, stale follower data, etc).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::summary::{round2, summarize, HistorySummary};
use crate::tracking::{Population, SECONDS_PER_DAY};

/// A count together with its share of the population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CountPct {
    pub number: usize,
    /// Percent of all tracked broadcasters, rounded to 2 decimals
    pub percentage: f64,
}

impl CountPct {
    fn of(number: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            round2(number as f64 / total as f64 * 100.0)
        };
        CountPct { number, percentage }
    }
}

/// Snapshot of scrape coverage across the whole population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationReport {
    pub num_broadcasters: usize,
    /// Broadcasters with at least one recording entry
    pub have_recording_data: CountPct,
    /// Broadcasters with a follower sample from the past day
    pub followers_past_day: CountPct,
    /// Broadcasters with any session started in the past day / week
    pub streamed_past_day: CountPct,
    pub streamed_past_week: CountPct,
    /// Broadcasters with an audience sample from the past day
    pub audience_data_past_day: CountPct,
    /// How many follower samples a broadcaster typically has
    pub follower_sample_counts: BTreeMap<usize, usize>,
    /// Language breakdown across profiles
    pub languages: BTreeMap<String, usize>,
    /// Distribution statistics over the title histories
    pub history: HistorySummary,
}

/// Builds the report for one point in time. Pure read over the population.
pub fn population_report(population: &Population, now: i64) -> PopulationReport {
    let total = population.len();
    let yesterday = now - SECONDS_PER_DAY;
    let week_ago = now - 7 * SECONDS_PER_DAY;

    let missing_recordings = population.ids_without_recordings().len();
    let missing_followers = population.ids_missing_follower_data(now).len();
    let streamed_day = population.ids_streamed_in_range(yesterday, now).len();
    let streamed_week = population.ids_streamed_in_range(week_ago, now).len();
    let audience_day = population
        .ids_with_audience_samples_in_range(yesterday, now)
        .len();

    let mut follower_sample_counts: BTreeMap<usize, usize> = BTreeMap::new();
    let mut languages: BTreeMap<String, usize> = BTreeMap::new();
    for (_, broadcaster) in population.iter() {
        *follower_sample_counts
            .entry(broadcaster.follower_samples.len())
            .or_insert(0) += 1;
        *languages.entry(broadcaster.language.clone()).or_insert(0) += 1;
    }

    PopulationReport {
        num_broadcasters: total,
        have_recording_data: CountPct::of(total - missing_recordings, total),
        followers_past_day: CountPct::of(total - missing_followers, total),
        streamed_past_day: CountPct::of(streamed_day, total),
        streamed_past_week: CountPct::of(streamed_week, total),
        audience_data_past_day: CountPct::of(audience_day, total),
        follower_sample_counts,
        languages,
        history: summarize(population),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Session, TitleKey};

    const DAY: i64 = SECONDS_PER_DAY;

    fn profile(id: u64, language: &str) -> crate::tracking::RawRecord {
        serde_json::json!({
            "id": id,
            "login": format!("user{}", id),
            "display_name": format!("User {}", id),
            "view_count": 10,
            "language": language
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn empty_population_reports_zeroes_without_dividing() {
        let report = population_report(&Population::new(), DAY * 100);
        assert_eq!(report.num_broadcasters, 0);
        assert_eq!(report.have_recording_data.percentage, 0.0);
        assert_eq!(report.streamed_past_week.number, 0);
    }

    #[test]
    fn percentages_and_histograms_line_up() {
        let now = DAY * 100;
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "en"), now - 60).unwrap();
        pop.add_or_update(&profile(2, "en"), now - 10 * DAY).unwrap();
        pop.add_or_update(&profile(3, "ja"), now - 60).unwrap();
        pop.add_or_update(&profile(4, "en"), now - 60).unwrap();

        pop.add_follower_sample(1, 100, now - 60);
        pop.add_session_at(
            &Session {
                id: 0,
                broadcaster_id: 2,
                title_key: TitleKey::Recording("VOD".to_string()),
                date: now - DAY / 2,
                views: 5,
                is_live: false,
                title: String::new(),
                language: "en".to_string(),
            },
            now,
        );

        let report = population_report(&pop, now);
        assert_eq!(report.num_broadcasters, 4);
        assert_eq!(report.have_recording_data.number, 1);
        assert_eq!(report.have_recording_data.percentage, 25.0);
        assert_eq!(report.followers_past_day.number, 1);
        assert_eq!(report.streamed_past_day.number, 1);
        assert_eq!(report.audience_data_past_day.number, 3);
        assert_eq!(report.languages["en"], 3);
        assert_eq!(report.languages["ja"], 1);
        // three broadcasters with zero follower samples, one with a single sample
        assert_eq!(report.follower_sample_counts[&0], 3);
        assert_eq!(report.follower_sample_counts[&1], 1);
    }
}
