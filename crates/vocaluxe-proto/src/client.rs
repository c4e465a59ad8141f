//! HTTP client for the Vocaluxe web server.
//!
//! Two read-only endpoints are used:
//!
//! ```text
//!   GET /getCurrentSongId          → "17"  (plain text, -1 = nothing playing)
//!   GET /getSong?songId=17         → {"SongId":17,"Title":"…","Artist":"…",…}
//! ```
//!
//! Any transport failure or non-success status is a [`FetchError`]; callers
//! treat every variant as "server unavailable, try again later".

use std::future::Future;

use tracing::debug;

use crate::config::ServerConfig;
use crate::protocol::{self, Song};

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("cannot reach Vocaluxe server at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Vocaluxe server answered {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("malformed response from {url}: {detail}")]
    Malformed { url: String, detail: String },
}

impl FetchError {
    /// True when the server could not be talked to at all (as opposed to
    /// answering with something we could not understand).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Status { .. })
    }
}

/// Anything that can tell which song is playing right now.
pub trait SongSource {
    /// `Ok(None)` means no song is playing.
    fn current_song(&self) -> impl Future<Output = Result<Option<Song>, FetchError>> + Send;
}

pub struct VocaluxeClient {
    http: reqwest::Client,
    base_url: String,
}

impl VocaluxeClient {
    /// `base_url` is scheme + host + port, e.g. `http://localhost:3000`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vocaluxe-history/", env!("CARGO_PKG_VERSION")))
            // the server is on the local network, never behind a proxy
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, reqwest::Error> {
        Self::new(server.base_url())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Id of the song currently playing, `None` when idle.
    pub async fn current_song_id(&self) -> Result<Option<i64>, FetchError> {
        let (url, body) = self.get_text(protocol::CURRENT_SONG_ID_PATH).await?;
        protocol::parse_current_song_id(&body).map_err(|e| FetchError::Malformed {
            url,
            detail: format!("song id {:?}: {}", body.trim(), e),
        })
    }

    /// Full details for `id`.
    pub async fn song(&self, id: i64) -> Result<Song, FetchError> {
        let (url, body) = self.get_text(&protocol::song_details_path(id)).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Malformed {
            url,
            detail: e.to_string(),
        })
    }

    async fn get_text(&self, path: &str) -> Result<(String, String), FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Unreachable {
                url: url.clone(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url, status });
        }

        let body = resp.text().await.map_err(|source| FetchError::Unreachable {
            url: url.clone(),
            source,
        })?;
        debug!("[client] GET {} -> {} ({} bytes)", url, status, body.len());
        Ok((url, body))
    }
}

impl SongSource for VocaluxeClient {
    async fn current_song(&self) -> Result<Option<Song>, FetchError> {
        match self.current_song_id().await? {
            Some(id) => self.song(id).await.map(Some),
            None => Ok(None),
        }
    }
}
