//! Twitch Helix API client.
//!
//! Fetches the raw livestream/profile/video/follower records the tracking
//! layer consumes. Endpoints are paginated with opaque cursors and rate
//! limited per minute; when the `Ratelimit-Remaining` header hits zero the
//! client sleeps a full second before the next request.

use reqwest::header::HeaderMap;
use serde::Deserialize;
use tracing::{debug, warn};

use super::timing::RequestTimings;
use crate::tracking::RawRecord;

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const STREAMS_URL: &str = "https://api.twitch.tv/helix/streams";
const USERS_URL: &str = "https://api.twitch.tv/helix/users";
const VIDEOS_URL: &str = "https://api.twitch.tv/helix/videos";
const FOLLOWS_URL: &str = "https://api.twitch.tv/helix/users/follows";

/// Helix lets at most 100 items per page / ids per lookup.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Request failed")]
    Request(#[from] reqwest::Error),
    #[error("OAuth token request rejected with status {status}")]
    Auth { status: u16 },
    #[error("{endpoint} returned unexpected status {status}")]
    UnexpectedStatus { endpoint: &'static str, status: u16 },
}

/// Client-credentials pair for the OAuth handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct HelixCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Opaque pagination cursor handed back by Helix list endpoints.
#[derive(Debug, Clone, derive_more::Display, serde::Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub String);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct Page {
    data: Vec<serde_json::Value>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    cursor: Option<Cursor>,
}

#[derive(Debug, Deserialize)]
struct FollowsResponse {
    total: u64,
}

/// Authenticated Helix client with per-action request timings.
#[derive(Debug)]
pub struct HelixClient {
    http: reqwest::Client,
    client_id: String,
    bearer: String,
    pub timings: RequestTimings,
}

impl HelixClient {
    /// Performs the client-credentials OAuth handshake and returns a ready
    /// client.
    pub async fn connect(credentials: &HelixCredentials) -> Result<Self, ApiError> {
        let http = reqwest::Client::new();
        let response = http
            .post(TOKEN_URL)
            .query(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::Auth {
                status: response.status().as_u16(),
            });
        }
        let token: TokenResponse = response.json().await?;

        Ok(HelixClient {
            http,
            client_id: credentials.client_id.clone(),
            bearer: token.access_token,
            timings: RequestTimings::new(),
        })
    }

    /// One page of current livestreams, most popular first, plus the cursor
    /// for the next page (None when exhausted).
    pub async fn get_streams(
        &mut self,
        cursor: Option<&Cursor>,
    ) -> Result<(Vec<RawRecord>, Option<Cursor>), ApiError> {
        self.timings.start_action("get_streams");

        let mut query: Vec<(&str, String)> = vec![("first", MAX_PAGE_SIZE.to_string())];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.to_string()));
        }
        let page = self.fetch_page(STREAMS_URL, "get_streams", &query).await?;

        self.timings.end_action("get_streams");
        Ok(page)
    }

    /// Profile records for up to [`MAX_PAGE_SIZE`] broadcaster ids.
    pub async fn get_users(&mut self, ids: &[u64]) -> Result<Vec<RawRecord>, ApiError> {
        self.timings.start_action("get_users");

        let query: Vec<(&str, String)> = ids
            .iter()
            .take(MAX_PAGE_SIZE)
            .map(|id| ("id", id.to_string()))
            .collect();
        let (records, _) = self.fetch_page(USERS_URL, "get_users", &query).await?;

        self.timings.end_action("get_users");
        Ok(records)
    }

    /// One page of archived videos for a broadcaster.
    pub async fn get_videos(
        &mut self,
        user_id: u64,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<(Vec<RawRecord>, Option<Cursor>), ApiError> {
        self.timings.start_action("get_videos");

        let first = limit.clamp(1, MAX_PAGE_SIZE);
        let mut query: Vec<(&str, String)> = vec![
            ("user_id", user_id.to_string()),
            ("first", first.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("after", cursor.to_string()));
        }
        let page = self.fetch_page(VIDEOS_URL, "get_videos", &query).await?;

        self.timings.end_action("get_videos");
        Ok(page)
    }

    /// Total follower count for a broadcaster.
    pub async fn get_followers(&mut self, user_id: u64) -> Result<u64, ApiError> {
        self.timings.start_action("get_followers");

        let response = self
            .http
            .get(FOLLOWS_URL)
            .bearer_auth(&self.bearer)
            .header("Client-Id", &self.client_id)
            .query(&[("to_id", user_id.to_string()), ("first", "1".to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::UnexpectedStatus {
                endpoint: "get_followers",
                status: response.status().as_u16(),
            });
        }
        throttle(response.headers()).await;
        let follows: FollowsResponse = response.json().await?;

        self.timings.end_action("get_followers");
        Ok(follows.total)
    }

    async fn fetch_page(
        &self,
        url: &str,
        endpoint: &'static str,
        query: &[(&str, String)],
    ) -> Result<(Vec<RawRecord>, Option<Cursor>), ApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer)
            .header("Client-Id", &self.client_id)
            .query(query)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::UnexpectedStatus {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        throttle(response.headers()).await;

        let page: Page = response.json().await?;
        let cursor = page.pagination.cursor.filter(|c| !c.0.is_empty());
        let records: Vec<RawRecord> = page
            .data
            .into_iter()
            .filter_map(|value| match value {
                serde_json::Value::Object(map) => Some(map),
                other => {
                    debug!(endpoint, ?other, "skipping non-object record");
                    None
                }
            })
            .collect();
        Ok((records, cursor))
    }
}

/// Backs off for a second once the rate-limit budget is spent.
async fn throttle(headers: &HeaderMap) {
    let remaining = headers
        .get("Ratelimit-Remaining")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if remaining == Some(0) {
        warn!("rate limit exhausted, sleeping 1s");
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_with_cursor_deserializes() {
        let page: Page = serde_json::from_str(
            r#"{
                "data": [{"id": "1", "user_id": "2"}],
                "pagination": {"cursor": "abc123"}
            }"#,
        )
        .unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(
            page.pagination.cursor.map(|c| c.to_string()).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn page_without_pagination_deserializes() {
        let page: Page = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(page.data.is_empty());
        assert!(page.pagination.cursor.is_none());
    }

    #[test]
    fn empty_cursor_means_exhausted() {
        let pagination: Pagination = serde_json::from_str(r#"{"cursor": ""}"#).unwrap();
        assert!(pagination.cursor.filter(|c| !c.0.is_empty()).is_none());
    }

    #[test]
    fn throttle_is_immediate_while_budget_remains() {
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Remaining", "42".parse().unwrap());
        // neither header state should block
        tokio_test::block_on(throttle(&headers));
        tokio_test::block_on(throttle(&HeaderMap::new()));
    }

    #[test]
    fn credentials_deserialize_from_json() {
        let creds: HelixCredentials = serde_json::from_str(
            r#"{"client_id": "abc", "client_secret": "shh"}"#,
        )
        .unwrap();
        assert_eq!(creds.client_id, "abc");
    }
}
