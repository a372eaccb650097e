//! The full tracked population: broadcaster-id → aggregate, plus the bulk
//! queries the reporting layer runs over it.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::broadcaster::{Broadcaster, SECONDS_PER_DAY};
use super::session::{require_u64, MalformedRecordError, RawRecord, Session};

/// Collection of every tracked broadcaster. A `BTreeMap` keeps enumeration
/// deterministic (ascending id) without a separate sort step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    broadcasters: BTreeMap<u64, Broadcaster>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipes the collection, e.g. between dataset loads.
    pub fn reset(&mut self) {
        self.broadcasters.clear();
    }

    pub fn len(&self) -> usize {
        self.broadcasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.broadcasters.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Broadcaster> {
        self.broadcasters.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Broadcaster> {
        self.broadcasters.get_mut(&id)
    }

    /// All broadcaster ids in ascending order.
    pub fn ids(&self) -> Vec<u64> {
        self.broadcasters.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Broadcaster)> {
        self.broadcasters.iter()
    }

    /// Inserts a pre-built aggregate, replacing any existing one with the
    /// same id. Used by the CSV loader and test fixtures.
    pub fn insert(&mut self, broadcaster: Broadcaster) {
        self.broadcasters.insert(broadcaster.id, broadcaster);
    }

    /// Creates a broadcaster on first sighting of its id, or refreshes the
    /// existing profile wholesale. Raw records may carry the id under
    /// either `user_id` or `id` depending on the endpoint.
    pub fn add_or_update(&mut self, raw: &RawRecord, now: i64) -> Result<u64, MalformedRecordError> {
        let id = match require_u64(raw, "user_id") {
            Ok(id) => id,
            Err(_) => require_u64(raw, "id")?,
        };

        match self.broadcasters.get_mut(&id) {
            Some(existing) => existing.refresh_profile(raw, now)?,
            None => {
                debug!(broadcaster_id = id, "first sighting, creating aggregate");
                self.broadcasters.insert(id, Broadcaster::from_raw(raw, now)?);
            }
        }
        Ok(id)
    }

    /// Folds a session into its broadcaster's history. Sessions for unknown
    /// broadcasters are dropped; profiles are always scraped first.
    pub fn add_session(&mut self, session: &Session) {
        self.add_session_at(session, Utc::now().timestamp());
    }

    pub fn add_session_at(&mut self, session: &Session, now: i64) {
        if let Some(broadcaster) = self.broadcasters.get_mut(&session.broadcaster_id) {
            broadcaster.merge_session_at(session, now);
        } else {
            debug!(
                broadcaster_id = session.broadcaster_id,
                "dropping session for untracked broadcaster"
            );
        }
    }

    /// Appends a follower sample for a known broadcaster.
    pub fn add_follower_sample(&mut self, id: u64, followers: u64, now: i64) {
        if let Some(broadcaster) = self.broadcasters.get_mut(&id) {
            broadcaster.add_follower_sample(followers, now);
        }
    }

    // Bulk queries -----------------------------------------------------------

    /// Ids with no recording-kind entries in their title history.
    pub fn ids_without_recordings(&self) -> Vec<u64> {
        self.broadcasters
            .iter()
            .filter(|(_, b)| !b.has_recordings())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids whose most recent follower sample is missing or older than 24h.
    pub fn ids_missing_follower_data(&self, now: i64) -> Vec<u64> {
        let day_boundary = now - SECONDS_PER_DAY;
        self.broadcasters
            .iter()
            .filter(|(_, b)| match b.latest_follower_sample() {
                None => true,
                Some(sample) => sample.date < day_boundary,
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids with at least one session (live or recording) whose broadcast
    /// day falls within `[t1, t2]`.
    pub fn ids_streamed_in_range(&self, t1: i64, t2: i64) -> Vec<u64> {
        self.broadcasters
            .iter()
            .filter(|(_, b)| b.streamed_in_range(t1, t2))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Ids with at least one audience sample captured within `[t1, t2]`.
    pub fn ids_with_audience_samples_in_range(&self, t1: i64, t2: i64) -> Vec<u64> {
        self.broadcasters
            .iter()
            .filter(|(_, b)| !b.audience_samples_in_range(t1, t2).is_empty())
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::session::TitleKey;

    const DAY: i64 = SECONDS_PER_DAY;

    fn profile(id: u64, login: &str) -> RawRecord {
        serde_json::json!({
            "id": id,
            "login": login,
            "display_name": login,
            "view_count": 100,
            "language": "en"
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn live_session(broadcaster_id: u64, title_id: u64, date: i64, views: u64) -> Session {
        Session {
            id: 1,
            broadcaster_id,
            title_key: TitleKey::Live(title_id),
            date,
            views,
            is_live: true,
            title: String::new(),
            language: "en".to_string(),
        }
    }

    fn video(broadcaster_id: u64, name: &str, date: i64) -> Session {
        Session {
            id: 2,
            broadcaster_id,
            title_key: TitleKey::Recording(name.to_string()),
            date,
            views: 500,
            is_live: false,
            title: String::new(),
            language: "en".to_string(),
        }
    }

    #[test]
    fn add_or_update_creates_then_refreshes() {
        let mut pop = Population::new();
        pop.add_or_update(&profile(5, "alpha"), 1000).unwrap();
        assert_eq!(pop.len(), 1);

        let mut updated = profile(5, "alpha");
        updated.insert("display_name".into(), serde_json::json!("Alpha Prime"));
        pop.add_or_update(&updated, 2000).unwrap();
        assert_eq!(pop.len(), 1);
        assert_eq!(pop.get(5).unwrap().display_name, "Alpha Prime");
    }

    #[test]
    fn ids_are_sorted_ascending() {
        let mut pop = Population::new();
        for id in [30u64, 10, 20] {
            pop.add_or_update(&profile(id, "x"), 0).unwrap();
        }
        assert_eq!(pop.ids(), vec![10, 20, 30]);
    }

    #[test]
    fn session_for_unknown_broadcaster_is_dropped() {
        let mut pop = Population::new();
        pop.add_session_at(&live_session(99, 1, DAY, 10), 0);
        assert!(pop.is_empty());
    }

    #[test]
    fn query_ids_without_recordings() {
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "a"), 0).unwrap();
        pop.add_or_update(&profile(2, "b"), 0).unwrap();
        pop.add_session_at(&live_session(1, 7, DAY * 10, 5), 0);
        pop.add_session_at(&video(2, "Some VOD", DAY * 10), 0);

        assert_eq!(pop.ids_without_recordings(), vec![1]);
    }

    #[test]
    fn query_ids_missing_follower_data() {
        let now = DAY * 1000;
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "a"), 0).unwrap();
        pop.add_or_update(&profile(2, "b"), 0).unwrap();
        pop.add_or_update(&profile(3, "c"), 0).unwrap();

        pop.add_follower_sample(1, 50, now - 60); // fresh
        pop.add_follower_sample(2, 50, now - 2 * DAY); // stale
        // broadcaster 3 has none at all

        assert_eq!(pop.ids_missing_follower_data(now), vec![2, 3]);
    }

    #[test]
    fn query_ids_streamed_in_range_covers_both_kinds() {
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "a"), 0).unwrap();
        pop.add_or_update(&profile(2, "b"), 0).unwrap();
        pop.add_or_update(&profile(3, "c"), 0).unwrap();

        pop.add_session_at(&live_session(1, 7, DAY * 10, 5), 0);
        pop.add_session_at(&video(2, "VOD", DAY * 20), 0);
        pop.add_session_at(&live_session(3, 8, DAY * 30, 5), 0);

        assert_eq!(pop.ids_streamed_in_range(DAY * 9, DAY * 21), vec![1, 2]);
        assert!(pop.ids_streamed_in_range(DAY * 40, DAY * 50).is_empty());
    }

    #[test]
    fn query_ids_with_audience_samples_in_range() {
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "a"), DAY * 5).unwrap();
        pop.add_or_update(&profile(2, "b"), DAY * 50).unwrap();

        assert_eq!(
            pop.ids_with_audience_samples_in_range(DAY * 4, DAY * 6),
            vec![1]
        );
    }

    #[test]
    fn reset_clears_everything() {
        let mut pop = Population::new();
        pop.add_or_update(&profile(1, "a"), 0).unwrap();
        pop.reset();
        assert!(pop.is_empty());
    }
}
