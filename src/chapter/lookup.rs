use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{MergeError, Result};

/// MusicBrainz web service root.
const MUSICBRAINZ_API_URL: &str = "https://musicbrainz.org/ws/2";

/// Sent with every request; the service rejects anonymous clients.
const USER_AGENT: &str = concat!("abmerge/", env!("CARGO_PKG_VERSION"));

/// One track of an externally retrieved chapter reference, in track order.
#[derive(Debug, Clone)]
pub struct TrackReference {
    pub title: String,
    pub length: Option<Duration>,
}

/// External chapter reference source, addressed by a release identifier.
#[async_trait]
pub trait ChapterLookup: Send + Sync {
    async fn lookup(&self, release_id: &str) -> Result<Vec<TrackReference>>;
    fn name(&self) -> &'static str;
}

/// MusicBrainz release lookup returning the recording list in track order.
pub struct MusicBrainzLookup {
    client: reqwest::Client,
    base_url: String,
}

impl Default for MusicBrainzLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicBrainzLookup {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: MUSICBRAINZ_API_URL.to_string(),
        }
    }

    /// Point the client at a different service root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_release(&self, release_id: &str) -> Result<ReleaseResponse> {
        let url = format!(
            "{}/release/{}?inc=recordings&fmt=json",
            self.base_url, release_id
        );
        debug!("looking up chapter reference {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MergeError::MetadataLookup(format!(
                "release lookup for {} failed ({}): {}",
                release_id, status, body
            )));
        }

        let release: ReleaseResponse = response.json().await?;
        Ok(release)
    }
}

#[async_trait]
impl ChapterLookup for MusicBrainzLookup {
    async fn lookup(&self, release_id: &str) -> Result<Vec<TrackReference>> {
        let release = self.fetch_release(release_id).await?;

        let mut tracks = Vec::new();
        for mut medium in release.media {
            medium.tracks.sort_by_key(|t| t.position.unwrap_or(0));
            for track in medium.tracks {
                let title = track.title.unwrap_or_default();
                if title.is_empty() {
                    warn!("skipping reference track without title");
                    continue;
                }
                tracks.push(TrackReference {
                    title,
                    length: track.length.map(Duration::from_millis),
                });
            }
        }

        debug!("chapter reference resolved to {} tracks", tracks.len());
        Ok(tracks)
    }

    fn name(&self) -> &'static str {
        "MusicBrainz"
    }
}

// Web service response types

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    #[serde(default)]
    media: Vec<Medium>,
}

#[derive(Debug, Deserialize)]
struct Medium {
    #[serde(default)]
    tracks: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    position: Option<u32>,
    title: Option<String>,
    length: Option<u64>,
}
