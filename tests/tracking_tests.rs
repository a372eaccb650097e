//! トラッキング統合テスト
//!
//! セッションのマージとビュー数の二重計上防止を公開APIだけで検証する。

use serde_json::json;
use streamtrack::{Population, RawRecord, Session, SessionKind, TitleKey, SECONDS_PER_DAY};

const DAY: i64 = SECONDS_PER_DAY;

fn profile(id: u64, login: &str) -> RawRecord {
    match json!({
        "id": id.to_string(),
        "login": login,
        "display_name": login,
        "profile_image_url": "",
        "description": "",
        "view_count": 1000u64,
        "language": "en",
    }) {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn live_session(id: u64, broadcaster_id: u64, game_id: u64, day: i64, views: u64) -> Session {
    Session {
        id,
        broadcaster_id,
        title_key: TitleKey::Live(game_id),
        date: day * DAY,
        views,
        is_live: true,
        title: "test stream".to_string(),
        language: "en".to_string(),
    }
}

fn video_session(id: u64, broadcaster_id: u64, game: &str, day: i64) -> Session {
    Session {
        id,
        broadcaster_id,
        title_key: TitleKey::Recording(game.to_string()),
        date: day * DAY,
        views: 0,
        is_live: false,
        title: "archived".to_string(),
        language: "en".to_string(),
    }
}

/// 同一配信の再観測テスト
mod ongoing_stream_accounting {
    use super::*;

    #[test]
    fn test_repeated_samples_of_one_stream_keep_the_maximum() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        // the same livestream sampled three times while its audience
        // fluctuates: 50 -> 80 -> 40 viewers
        for (sample, views) in [(1u64, 50u64), (2, 80), (3, 40)] {
            population.add_session_at(&live_session(sample, 1, 777, 10, views), 10 * DAY);
        }

        let broadcaster = population.get(1).unwrap();
        let (_, entry) = broadcaster.live_history().next().unwrap();
        assert_eq!(entry.cumulative_views, 80);
        assert_eq!(entry.recent_contribution, 80);
        // still one session start
        assert_eq!(entry.session_dates.len(), 1);
        assert_eq!(broadcaster.live_session_count(), 1);
    }

    #[test]
    fn test_new_day_means_a_new_session() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        population.add_session_at(&live_session(1, 1, 777, 10, 50), 10 * DAY);
        population.add_session_at(&live_session(2, 1, 777, 11, 30), 11 * DAY);

        let broadcaster = population.get(1).unwrap();
        let (_, entry) = broadcaster.live_history().next().unwrap();
        assert_eq!(entry.cumulative_views, 80);
        assert_eq!(entry.session_dates.len(), 2);
        assert_eq!(broadcaster.live_session_count(), 2);
    }

    #[test]
    fn test_switching_titles_ends_the_ongoing_session() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        // same day: game 777, then 888, then back to 777
        population.add_session_at(&live_session(1, 1, 777, 10, 50), 10 * DAY);
        population.add_session_at(&live_session(2, 1, 888, 10, 60), 10 * DAY);
        population.add_session_at(&live_session(3, 1, 777, 10, 20), 10 * DAY);

        let broadcaster = population.get(1).unwrap();
        let history: std::collections::BTreeMap<_, _> = broadcaster.live_history().collect();
        // both titles stayed recently active within the day, so the return
        // to 777 counts as a continuation and only corrects upward
        assert_eq!(history[&TitleKey::Live(777)].cumulative_views, 50);
        assert_eq!(history[&TitleKey::Live(888)].cumulative_views, 60);
        assert_eq!(broadcaster.live_title_count(), 2);
    }
}

/// アーカイブ動画のマージテスト
mod recording_accounting {
    use super::*;

    #[test]
    fn test_recordings_count_sessions_and_titles_separately() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        population.add_session_at(&video_session(1, 1, "Zelda", 10), 20 * DAY);
        population.add_session_at(&video_session(2, 1, "Zelda", 11), 20 * DAY);
        population.add_session_at(&video_session(3, 1, "Mario", 12), 20 * DAY);

        let broadcaster = population.get(1).unwrap();
        assert_eq!(broadcaster.recording_session_count(), 3);
        assert_eq!(broadcaster.recording_title_count(), 2);
        assert!(broadcaster.has_recordings());

        // recordings never contribute views
        for (_, entry) in broadcaster.recording_history() {
            assert_eq!(entry.cumulative_views, 0);
        }
    }

    #[test]
    fn test_live_and_recording_histories_do_not_mix() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        population.add_session_at(&live_session(1, 1, 777, 10, 50), 10 * DAY);
        population.add_session_at(&video_session(2, 1, "Zelda", 10), 10 * DAY);

        let broadcaster = population.get(1).unwrap();
        assert_eq!(broadcaster.live_session_count(), 1);
        assert_eq!(broadcaster.recording_session_count(), 1);
        assert_eq!(broadcaster.live_history().count(), 1);
        assert_eq!(broadcaster.recording_history().count(), 1);
    }
}

/// 視聴者数サンプルの24時間窓テスト
mod audience_window {
    use super::*;

    #[test]
    fn test_profile_refresh_within_a_day_overwrites_the_sample() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 100 * DAY).unwrap();
        population
            .add_or_update(&profile(1, "alice"), 100 * DAY + 3600)
            .unwrap();

        let broadcaster = population.get(1).unwrap();
        assert_eq!(broadcaster.audience_samples.len(), 1);
        assert_eq!(broadcaster.audience_samples[0].date, 100 * DAY + 3600);
    }

    #[test]
    fn test_profile_refresh_after_a_day_appends_a_sample() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 100 * DAY).unwrap();
        population
            .add_or_update(&profile(1, "alice"), 101 * DAY + 1)
            .unwrap();

        let broadcaster = population.get(1).unwrap();
        assert_eq!(broadcaster.audience_samples.len(), 2);
    }
}

/// 母集団クエリのテスト
mod population_queries {
    use super::*;

    #[test]
    fn test_sessions_for_unknown_broadcasters_are_dropped() {
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), 0).unwrap();

        population.add_session_at(&live_session(1, 999, 777, 10, 50), 10 * DAY);
        assert_eq!(population.len(), 1);
        assert_eq!(population.get(1).unwrap().live_session_count(), 0);
    }

    #[test]
    fn test_bulk_queries_partition_the_population() {
        let now = 200 * DAY;
        let mut population = Population::new();
        population.add_or_update(&profile(1, "alice"), now).unwrap();
        population.add_or_update(&profile(2, "bob"), now).unwrap();
        population.add_or_update(&profile(3, "carol"), now).unwrap();

        population.add_session_at(&video_session(1, 2, "Zelda", 199), now);
        population.add_follower_sample(3, 500, now - 3600);
        population.add_session_at(&live_session(2, 1, 777, 199, 40), now);

        assert_eq!(population.ids_without_recordings(), vec![1, 3]);
        assert_eq!(population.ids_missing_follower_data(now), vec![1, 2]);
        assert_eq!(
            population.ids_streamed_in_range(199 * DAY, now),
            vec![1, 2]
        );
        // every profile refresh at `now` seeded an audience sample
        assert_eq!(
            population.ids_with_audience_samples_in_range(now - 1, now + 1),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_malformed_profile_is_rejected() {
        let mut population = Population::new();
        let mut raw = profile(1, "alice");
        raw.remove("login");
        assert!(population.add_or_update(&raw, 0).is_err());
        assert!(population.is_empty());
    }
}

/// 生レコードからのセッション構築テスト
mod raw_records {
    use super::*;

    #[test]
    fn test_live_record_parses_with_live_title_key() {
        let raw = match json!({
            "id": "41375541868",
            "user_id": "459331509",
            "game_id": "509658",
            "viewer_count": 78365u64,
            "started_at": "2021-03-10T15:04:21Z",
            "title": "hi",
            "language": "en",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        let session = Session::from_raw(&raw, SessionKind::Livestream).unwrap();
        assert_eq!(session.title_key, TitleKey::Live(509658));
        assert_eq!(session.views, 78365);
        assert!(session.is_live);
        // midnight UTC of the broadcast day
        assert_eq!(session.date % DAY, 0);
    }

    #[test]
    fn test_video_record_parses_with_recording_title_key() {
        let raw = match json!({
            "id": "335921245",
            "user_id": "459331509",
            "game_name": "Just Chatting",
            "view_count": 5u64,
            "created_at": "2021-03-09T16:18:11Z",
            "title": "archived",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };

        let session = Session::from_raw(&raw, SessionKind::Video).unwrap();
        assert_eq!(
            session.title_key,
            TitleKey::Recording("Just Chatting".to_string())
        );
        assert!(!session.is_live);
        assert_eq!(session.views_contributed(), 0);
    }
}
