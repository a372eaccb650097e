pub mod helix; // Twitch Helix クライアント
pub mod timing; // リクエスト計測ログ

pub use helix::{ApiError, Cursor, HelixClient, HelixCredentials};
pub use timing::{append_runtime_log, ActionStats, RequestTimings};
