//! streamtrack CLI - Twitch配信者トラッキングツール
//!
//! ライブ配信・アーカイブ・フォロワー数をスクレイプして母集団CSVへ集約し、
//! 集計統計やカバレッジレポートを出力します。

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use streamtrack::api::{append_runtime_log, Cursor};
use streamtrack::config::{self, DatasetConfig};
use streamtrack::{
    load_population_or_default, population_report, save_population, summarize, HelixClient,
    Session, SessionKind,
};

/// Compiles data about broadcasters over long periods of time.
#[derive(Debug, Parser)]
#[command(name = "streamtrack", version)]
struct Args {
    /// Scrape all current livestreams and fold them into broadcaster profiles
    #[arg(short, long)]
    streamers: bool,

    /// Scrape archived videos for N broadcasters that have none yet (0 = all)
    #[arg(short, long, value_name = "N", num_args = 0..=1, default_missing_value = "0")]
    videos: Option<usize>,

    /// Scrape follower counts for broadcasters without a sample from the past day
    #[arg(short, long)]
    followers: bool,

    /// Print distribution statistics over the stored title histories
    #[arg(long)]
    summary: bool,

    /// Print the scrape-coverage report
    #[arg(long)]
    report: bool,

    /// Stop after this many livestreams (development aid)
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// 設定ファイル (TOML) のパス
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging();

    info!("📡 Starting streamtrack");
    let config = DatasetConfig::load_or_default(args.config.as_deref());

    if args.streamers {
        scrape_streamers(&config, args.limit).await?;
    }
    if let Some(limit) = args.videos {
        scrape_videos(&config, limit).await?;
    }
    if args.followers {
        scrape_followers(&config).await?;
    }
    if args.summary {
        let population = load_population_or_default(&config.streamers_csv)?;
        let summary = summarize(&population);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    if args.report {
        let population = load_population_or_default(&config.streamers_csv)?;
        let report = population_report(&population, chrono::Utc::now().timestamp());
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

/// stdoutと日次ローテーションのログファイルへ出力
fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all("./logs");
    let file_appender = tracing_appender::rolling::daily("./logs", "streamtrack.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout.and(non_blocking))
        .init();
    guard
}

async fn connect(config: &DatasetConfig) -> anyhow::Result<HelixClient> {
    let credentials = config::load_credentials(&config.credentials_file)?;
    HelixClient::connect(&credentials.twitch)
        .await
        .context("Helix OAuth handshake failed")
}

/// Scrapes every current livestream and merges each one into its
/// broadcaster's profile, creating profiles on first sighting.
async fn scrape_streamers(config: &DatasetConfig, limit: Option<usize>) -> anyhow::Result<()> {
    let mut client = connect(config).await?;
    let mut population = load_population_or_default(&config.streamers_csv)?;
    info!(broadcasters = population.len(), "starting from stored population");

    let sessions = collect_livestreams(&mut client, limit).await?;
    info!(livestreams = sessions.len(), "livestream scrape finished");

    // profile lookups run in batches of up to 100 ids
    let now = chrono::Utc::now().timestamp();
    for batch in sessions.chunks(streamtrack::api::helix::MAX_PAGE_SIZE) {
        let lookup: HashMap<u64, &Session> =
            batch.iter().map(|s| (s.broadcaster_id, s)).collect();
        let ids: Vec<u64> = lookup.keys().copied().collect();

        for mut raw in client.get_users(&ids).await? {
            // the profile record has no language field; the stream does
            let session = match raw.get("id").and_then(|v| v.as_str()) {
                Some(id) => id.parse::<u64>().ok().and_then(|id| lookup.get(&id)),
                None => raw.get("id").and_then(|v| v.as_u64()).and_then(|id| lookup.get(&id)),
            };
            if let Some(session) = session {
                raw.insert("language".to_string(), serde_json::json!(session.language));
            }

            match population.add_or_update(&raw, now) {
                Ok(id) => {
                    if let Some(session) = lookup.get(&id) {
                        population.add_session_at(session, now);
                    }
                }
                Err(e) => warn!(error = %e, "skipping malformed profile record"),
            }
        }
    }

    save_population(&population, &config.streamers_csv)?;
    client.timings.log_stats();
    append_runtime_log(
        &config.runtime_log,
        &client.timings,
        "streamers",
        population.len(),
    )?;
    Ok(())
}

/// Pages through /streams until it runs dry, the limit is hit, or a page
/// stops yielding unseen stream ids.
async fn collect_livestreams(
    client: &mut HelixClient,
    limit: Option<usize>,
) -> anyhow::Result<Vec<Session>> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut sessions: Vec<Session> = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let (records, next_cursor) = client.get_streams(cursor.as_ref()).await?;
        if records.is_empty() {
            break;
        }

        let before = seen_ids.len();
        for raw in &records {
            if sessions.len() >= limit {
                break;
            }
            match Session::from_raw(raw, SessionKind::Livestream) {
                Ok(session) => {
                    if seen_ids.insert(session.id) {
                        sessions.push(session);
                    }
                }
                Err(e) => warn!(error = %e, "skipping malformed stream record"),
            }
        }
        info!(livestreams = seen_ids.len(), "…scraping livestreams");

        // a page of nothing but repeats means the listing wrapped around
        if sessions.len() >= limit || seen_ids.len() == before {
            break;
        }
        cursor = match next_cursor {
            Some(c) => Some(c),
            None => break,
        };
    }
    Ok(sessions)
}

/// Adds archived-video history for broadcasters that have none yet.
async fn scrape_videos(config: &DatasetConfig, limit: usize) -> anyhow::Result<()> {
    let mut client = connect(config).await?;
    let mut population = load_population_or_default(&config.streamers_csv)?;

    let mut ids = population.ids_without_recordings();
    if limit > 0 {
        ids.truncate(limit);
    }
    info!(broadcasters = ids.len(), "scraping videos");

    let now = chrono::Utc::now().timestamp();
    for (i, id) in ids.iter().enumerate() {
        let mut cursor: Option<Cursor> = None;
        let mut merged = 0usize;
        loop {
            let (records, next_cursor) = client.get_videos(*id, cursor.as_ref(), 100).await?;
            if records.is_empty() {
                break;
            }
            for raw in &records {
                match Session::from_raw(raw, SessionKind::Video) {
                    Ok(session) => {
                        population.add_session_at(&session, now);
                        merged += 1;
                    }
                    Err(e) => warn!(error = %e, "skipping malformed video record"),
                }
            }
            cursor = match next_cursor {
                Some(c) => Some(c),
                None => break,
            };
        }
        info!(n = i, broadcaster_id = id, videos = merged, "videos merged");
    }

    save_population(&population, &config.streamers_csv)?;
    client.timings.log_stats();
    append_runtime_log(&config.runtime_log, &client.timings, "videos", ids.len())?;
    Ok(())
}

/// Samples follower counts for broadcasters with stale or missing data.
async fn scrape_followers(config: &DatasetConfig) -> anyhow::Result<()> {
    let mut client = connect(config).await?;
    let mut population = load_population_or_default(&config.streamers_csv)?;

    let now = chrono::Utc::now().timestamp();
    let ids = population.ids_missing_follower_data(now);
    info!(broadcasters = ids.len(), "scraping follower counts");

    for id in &ids {
        match client.get_followers(*id).await {
            Ok(total) => population.add_follower_sample(*id, total, now),
            Err(e) => warn!(broadcaster_id = id, error = %e, "follower lookup failed"),
        }
    }

    save_population(&population, &config.streamers_csv)?;
    client.timings.log_stats();
    append_runtime_log(&config.runtime_log, &client.timings, "followers", ids.len())?;
    Ok(())
}
