//! Per-broadcaster aggregate: profile, audience and follower samples, and
//! the per-title session history with its anti-double-count merge.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::session::{
    optional_str, require_str, require_u64, MalformedRecordError, RawRecord, Session, TitleKey,
};

pub const SECONDS_PER_DAY: i64 = 60 * 60 * 24;

/// One audience-size sample. Append-only, except the most recent sample may
/// be overwritten in place while it is still inside its own 24h window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceSample {
    pub views: u64,
    pub date: i64,
}

/// One follower-count sample. Strictly append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowerSample {
    pub followers: u64,
    pub date: i64,
}

/// Date pair recorded for each distinct session start of a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDates {
    /// Broadcast day (epoch seconds, midnight UTC)
    pub streamed: i64,
    /// When we observed it
    pub observed: i64,
}

/// Accumulated history for one title key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleHistoryEntry {
    /// Views attributed to this title across all its sessions
    pub cumulative_views: u64,
    /// Views attributed by the most recently merged session; kept so a
    /// repeated sample of the same ongoing stream can be corrected instead
    /// of counted twice
    pub recent_contribution: u64,
    /// Number of archived videos folded into this entry (0 for pure live)
    pub recording_count: u64,
    /// One pair per distinct session start detected for this title
    pub session_dates: Vec<SessionDates>,
}

impl TitleHistoryEntry {
    /// Latest broadcast day recorded for this title.
    pub fn latest_streamed(&self) -> i64 {
        self.session_dates.iter().map(|d| d.streamed).max().unwrap_or(0)
    }
}

/// One tracked broadcaster: profile fields plus the full observation
/// history. Created on first sighting, updated on every subsequent profile,
/// session, or follower observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcaster {
    pub id: u64,
    pub login: String,
    pub display_name: String,
    pub profile_image_url: String,
    pub description: String,
    pub language: String,
    pub audience_samples: Vec<AudienceSample>,
    pub follower_samples: Vec<FollowerSample>,
    pub title_history: BTreeMap<TitleKey, TitleHistoryEntry>,

    // Running "recently active" state: the latest broadcast day seen across
    // the whole history and the title keys whose latest day equals it.
    // Maintained incrementally on merge; rebuilt after deserialization.
    #[serde(skip)]
    last_stream_date: i64,
    #[serde(skip)]
    recent_title_keys: Vec<TitleKey>,
}

impl Broadcaster {
    /// Empty aggregate for a bare id. Callers fill the profile fields in
    /// afterwards (CSV loader, test fixtures).
    pub fn new(id: u64) -> Self {
        Broadcaster {
            id,
            login: String::new(),
            display_name: String::new(),
            profile_image_url: String::new(),
            description: String::new(),
            language: String::new(),
            audience_samples: Vec::new(),
            follower_samples: Vec::new(),
            title_history: BTreeMap::new(),
            last_stream_date: 0,
            recent_title_keys: Vec::new(),
        }
    }

    /// Builds a new aggregate from a raw profile record, seeding the
    /// audience history with the profile's current view count.
    pub fn from_raw(raw: &RawRecord, now: i64) -> Result<Self, MalformedRecordError> {
        let id = require_u64(raw, "id")?;
        let views = require_u64(raw, "view_count")?;
        Ok(Broadcaster {
            id,
            login: require_str(raw, "login")?.to_string(),
            display_name: require_str(raw, "display_name")?.to_string(),
            profile_image_url: optional_str(raw, "profile_image_url"),
            description: optional_str(raw, "description"),
            language: optional_str(raw, "language"),
            audience_samples: vec![AudienceSample { views, date: now }],
            follower_samples: Vec::new(),
            title_history: BTreeMap::new(),
            last_stream_date: 0,
            recent_title_keys: Vec::new(),
        })
    }

    /// Overwrites the profile fields wholesale with a fresh raw record and
    /// refreshes the audience history with its view count.
    pub fn refresh_profile(&mut self, raw: &RawRecord, now: i64) -> Result<(), MalformedRecordError> {
        self.login = require_str(raw, "login")?.to_string();
        self.display_name = require_str(raw, "display_name")?.to_string();
        let views = require_u64(raw, "view_count")?;
        self.profile_image_url = optional_str(raw, "profile_image_url");
        self.description = optional_str(raw, "description");
        // a profile record without a language keeps the previous one
        if let Some(language) = raw.get("language").and_then(|v| v.as_str()) {
            self.language = language.to_string();
        }
        self.refresh_audience(views, now);
        Ok(())
    }

    /// Records a fresh audience-size reading.
    ///
    /// If the most recent sample is still inside the trailing 24 hours it is
    /// treated as a correction of the same sampling window and overwritten
    /// in place; otherwise a new sample is appended. The window slides with
    /// the previous sample rather than snapping to calendar days, which can
    /// drift slowly across repeated near-24h refreshes. That matches the
    /// historical datasets, so it stays.
    pub fn refresh_audience(&mut self, views: u64, now: i64) {
        let window_start = now - SECONDS_PER_DAY;
        let latest_in_window = self
            .audience_samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.date >= window_start && s.date <= now)
            .max_by_key(|(_, s)| s.date)
            .map(|(i, _)| i);

        match latest_in_window {
            Some(i) => {
                self.audience_samples[i] = AudienceSample { views, date: now };
            }
            None => self.audience_samples.push(AudienceSample { views, date: now }),
        }
    }

    /// Appends a follower-count sample. Follower readings are totals, not
    /// running samples of one session, so there is nothing to dedup.
    pub fn add_follower_sample(&mut self, followers: u64, now: i64) {
        self.follower_samples.push(FollowerSample { followers, date: now });
    }

    /// Folds one observed session into the title history. See
    /// [`merge_session_at`](Self::merge_session_at) for the actual rules.
    pub fn merge_session(&mut self, session: &Session) {
        self.merge_session_at(session, Utc::now().timestamp());
    }

    /// Folds one observed session into the title history without double
    /// counting.
    ///
    /// External view counts for an ongoing livestream are monotonically
    /// non-decreasing snapshots of the same audience, not independent
    /// events. A session is treated as a repeat observation of the same
    /// ongoing stream when its title key is among the recently active keys
    /// *and* its broadcast day equals the latest day on record; in that
    /// case only a strictly larger reading replaces the previous
    /// contribution. Anything else counts as a genuinely new session and
    /// appends a date entry. Sessions are tracked at day granularity, so
    /// this is a heuristic, not a stable session identifier.
    pub fn merge_session_at(&mut self, session: &Session, now: i64) {
        let key = session.title_key.clone();
        let views_contributed = session.views_contributed();
        let is_recording = !session.is_live;
        let ongoing =
            session.date == self.last_stream_date && self.recent_title_keys.contains(&key);

        match self.title_history.get_mut(&key) {
            None => {
                self.title_history.insert(
                    key.clone(),
                    TitleHistoryEntry {
                        cumulative_views: views_contributed,
                        recent_contribution: views_contributed,
                        recording_count: if is_recording { 1 } else { 0 },
                        session_dates: vec![SessionDates {
                            streamed: session.date,
                            observed: now,
                        }],
                    },
                );
                self.note_stream_date(key, session.date);
            }
            Some(entry) => {
                if is_recording {
                    entry.recording_count += 1;
                }

                if !ongoing {
                    entry.session_dates.push(SessionDates {
                        streamed: session.date,
                        observed: now,
                    });
                    entry.recent_contribution = views_contributed;
                    entry.cumulative_views += views_contributed;
                    self.note_stream_date(key, session.date);
                } else if views_contributed > entry.recent_contribution {
                    // the same ongoing stream, sampled again with a larger
                    // audience: replace the previous contribution
                    entry.cumulative_views -= entry.recent_contribution;
                    entry.cumulative_views += views_contributed;
                    entry.recent_contribution = views_contributed;
                }
                // a smaller or equal reading of an ongoing stream changes nothing
            }
        }
    }

    fn note_stream_date(&mut self, key: TitleKey, date: i64) {
        if date > self.last_stream_date {
            self.last_stream_date = date;
            self.recent_title_keys.clear();
            self.recent_title_keys.push(key);
        } else if date == self.last_stream_date && !self.recent_title_keys.contains(&key) {
            self.recent_title_keys.push(key);
        }
    }

    /// Recomputes the recently-active state from the full history. Needed
    /// once after deserialization; merges keep it current from then on.
    pub fn rebuild_recent_activity(&mut self) {
        self.last_stream_date = 0;
        self.recent_title_keys.clear();

        let max = self
            .title_history
            .values()
            .map(|e| e.latest_streamed())
            .max()
            .unwrap_or(0);
        if max == 0 {
            return;
        }
        self.last_stream_date = max;
        self.recent_title_keys = self
            .title_history
            .iter()
            .filter(|(_, e)| e.latest_streamed() == max)
            .map(|(k, _)| k.clone())
            .collect();
    }

    /// Latest broadcast day across the whole history (0 when empty).
    pub fn last_stream_date(&self) -> i64 {
        self.last_stream_date
    }

    /// Title keys whose latest broadcast day equals [`last_stream_date`](Self::last_stream_date).
    pub fn recently_active_titles(&self) -> &[TitleKey] {
        &self.recent_title_keys
    }

    // Read helpers -----------------------------------------------------------

    pub fn live_history(&self) -> impl Iterator<Item = (&TitleKey, &TitleHistoryEntry)> {
        self.title_history.iter().filter(|(k, _)| k.is_live())
    }

    pub fn recording_history(&self) -> impl Iterator<Item = (&TitleKey, &TitleHistoryEntry)> {
        self.title_history.iter().filter(|(k, _)| k.is_recording())
    }

    pub fn has_recordings(&self) -> bool {
        self.title_history.keys().any(|k| k.is_recording())
    }

    /// Total live session starts across all live titles.
    pub fn live_session_count(&self) -> u64 {
        self.live_history().map(|(_, e)| e.session_dates.len() as u64).sum()
    }

    /// Number of distinct titles seen in livestreams.
    pub fn live_title_count(&self) -> u64 {
        self.live_history().count() as u64
    }

    /// Total recording session starts across all recording titles.
    pub fn recording_session_count(&self) -> u64 {
        self.recording_history()
            .map(|(_, e)| e.session_dates.len() as u64)
            .sum()
    }

    /// Number of distinct titles seen in recordings.
    pub fn recording_title_count(&self) -> u64 {
        self.recording_history().count() as u64
    }

    /// Most recent follower sample. The last element should be the newest,
    /// but the dates are checked anyway.
    pub fn latest_follower_sample(&self) -> Option<&FollowerSample> {
        self.follower_samples.iter().max_by_key(|s| s.date)
    }

    /// True when any session of any kind started within `[t1, t2]`.
    pub fn streamed_in_range(&self, t1: i64, t2: i64) -> bool {
        self.title_history.values().any(|entry| {
            entry
                .session_dates
                .iter()
                .any(|d| d.streamed >= t1 && d.streamed <= t2)
        })
    }

    /// Audience samples captured within `[t1, t2]`.
    pub fn audience_samples_in_range(&self, t1: i64, t2: i64) -> Vec<AudienceSample> {
        self.audience_samples
            .iter()
            .copied()
            .filter(|s| s.date >= t1 && s.date <= t2)
            .collect()
    }
}
