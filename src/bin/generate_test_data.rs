use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use streamtrack::{save_population, Population, Session, TitleKey};

const GAMES: &[u64] = &[509658, 21779, 516575, 518203, 33214];
const LANGUAGES: &[&str] = &["en", "ja", "de", "pt", "ko"];

fn main() -> anyhow::Result<()> {
    // 固定シードで再現可能な母集団を生成
    let mut rng = StdRng::seed_from_u64(20240817);
    let mut population = Population::new();
    let now = 1_700_000_000i64;

    for i in 0..50u64 {
        let id = 1000 + i;
        let language = LANGUAGES[rng.gen_range(0..LANGUAGES.len())];
        let profile = json!({
            "id": id.to_string(),
            "login": format!("streamer{:03}", i),
            "display_name": format!("Streamer{:03}", i),
            "profile_image_url": format!("https://example.com/avatar/{}.png", id),
            "description": "generated test broadcaster",
            "view_count": rng.gen_range(100u64..1_000_000),
            "language": language,
        });
        let raw = match profile {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        population.add_or_update(&raw, now)?;

        // 数日分のライブ配信履歴
        for day in 0..rng.gen_range(1..8i64) {
            let date = (now - day * 86_400) / 86_400 * 86_400;
            let session = Session {
                id: id * 1000 + day as u64,
                broadcaster_id: id,
                title_key: TitleKey::Live(GAMES[rng.gen_range(0..GAMES.len())]),
                date,
                views: rng.gen_range(1u64..5_000),
                is_live: true,
                title: format!("stream day {}", day),
                language: language.to_string(),
            };
            population.add_session_at(&session, now);
        }

        // 半数にはアーカイブ動画の履歴も持たせる
        if i % 2 == 0 {
            let session = Session {
                id: id * 1000 + 900,
                broadcaster_id: id,
                title_key: TitleKey::Recording("Just Chatting".to_string()),
                date: (now - 3 * 86_400) / 86_400 * 86_400,
                views: 0,
                is_live: false,
                title: "archived broadcast".to_string(),
                language: language.to_string(),
            };
            population.add_session_at(&session, now);
        }

        if i % 3 == 0 {
            population.add_follower_sample(id, rng.gen_range(10u64..100_000), now);
        }
    }

    // tests/data/ディレクトリを作成
    std::fs::create_dir_all("tests/data")?;
    save_population(&population, "tests/data/streamers.csv")?;

    println!(
        "✅ テストデータファイルを生成しました: tests/data/streamers.csv ({} broadcasters)",
        population.len()
    );
    Ok(())
}
