//! データセット設定管理モジュール
//!
//! どの永続ファイルが母集団データを保持するかは、グローバルなモード切替では
//! なく明示的な設定値としてコンストラクタに渡します。

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::api::HelixCredentials;

/// データセット設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// 母集団CSVファイルのパス
    pub streamers_csv: PathBuf,
    /// スクレイプ実行ログ (NDJSON) のパス
    pub runtime_log: PathBuf,
    /// API認証情報 (JSON) のパス
    pub credentials_file: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            streamers_csv: PathBuf::from("./data/streamers.csv"),
            runtime_log: PathBuf::from("./logs/runtime.ndjson"),
            credentials_file: PathBuf::from("./credentials.json"),
        }
    }
}

impl DatasetConfig {
    /// 指定パスのTOMLファイルから設定を読み込み
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("設定ファイルの読み込みに失敗: {}", path.display()))?;
        let config: DatasetConfig = toml::from_str(&content)
            .with_context(|| format!("設定ファイルの解析に失敗: {}", path.display()))?;
        debug!(path = %path.display(), "設定を読み込みました");
        Ok(config)
    }

    /// 設定ファイルを読み込み。指定がなければXDGデフォルトパスを探し、
    /// 見つからなければデフォルト設定を返す。
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };
        match candidate {
            Some(p) if p.exists() => Self::load(&p).unwrap_or_else(|e| {
                warn!("設定読み込みエラー、デフォルト設定を使用: {}", e);
                Self::default()
            }),
            _ => Self::default(),
        }
    }
}

/// API認証情報ファイル（credentials.json）の内容
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub twitch: HelixCredentials,
}

/// 認証情報をJSONファイルから読み込み
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("認証情報ファイルの読み込みに失敗: {}", path.display()))?;
    let credentials: Credentials = serde_json::from_str(&content)
        .with_context(|| format!("認証情報ファイルの解析に失敗: {}", path.display()))?;
    Ok(credentials)
}

/// XDG設定ディレクトリ内のデフォルト設定パス
fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "sifyfy", "streamtrack")
        .map(|dirs| dirs.config_dir().join("streamtrack.toml"))
}
