#![forbid(unsafe_code)]

//! Typed view of the catalog API plus the paginated HTTP client.
//!
//! The upstream JSON is loosely shaped (fields missing on older records, the
//! pagination marker switching between a bool and a page number), so every
//! record makes required vs. optional explicit instead of unwrapping maps.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::Settings;

/// Bounded timeout for every catalog request; a stalled server aborts the
/// run instead of hanging it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub channel_description: Option<String>,
    #[serde(default)]
    pub channel_thumb_url: String,
    #[serde(default)]
    pub channel_banner_url: String,
    #[serde(default)]
    pub channel_last_refresh: String,
}

impl Channel {
    /// Display name with the stable id as fallback for unnamed channels.
    pub fn display_name(&self) -> &str {
        if self.channel_name.is_empty() {
            &self.channel_id
        } else {
            &self.channel_name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Playlist {
    pub playlist_id: String,
    #[serde(default)]
    pub playlist_name: String,
    #[serde(default)]
    pub playlist_description: Option<String>,
    #[serde(default)]
    pub playlist_thumbnail: String,
    #[serde(default)]
    pub playlist_last_refresh: String,
    pub playlist_channel_id: String,
    #[serde(default)]
    pub playlist_entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn display_name(&self) -> &str {
        if self.playlist_name.is_empty() {
            &self.playlist_id
        } else {
            &self.playlist_name
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    pub youtube_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoStats {
    #[serde(default)]
    pub view_count: i64,
    #[serde(default)]
    pub like_count: i64,
}

/// Denormalized channel reference embedded in every video record.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoChannel {
    pub channel_id: String,
    #[serde(default)]
    pub channel_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub youtube_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub published: String,
    pub media_url: String,
    #[serde(default)]
    pub vid_thumb_url: String,
    #[serde(default)]
    pub stats: VideoStats,
    pub channel: VideoChannel,
    /// Playlist memberships; empty means the video belongs to the synthetic
    /// "Videos" pseudo-playlist.
    #[serde(default)]
    pub playlist: Vec<String>,
}

impl Video {
    /// Channel name used in derived file names, id as fallback.
    pub fn channel_label(&self) -> &str {
        if self.channel.channel_name.is_empty() {
            &self.channel.channel_id
        } else {
            &self.channel.channel_name
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub paginate: Paginate,
}

#[derive(Debug, Deserialize)]
pub struct Paginate {
    pub current_page: u32,
    #[serde(default)]
    pub last_page: PageMarker,
}

/// The API reports `last_page` as `false` on the final page and as a page
/// number while more pages remain.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PageMarker {
    Flag(bool),
    Number(u32),
}

impl PageMarker {
    pub fn has_more(&self) -> bool {
        match self {
            PageMarker::Flag(flag) => *flag,
            PageMarker::Number(page) => *page != 0,
        }
    }
}

impl Default for PageMarker {
    fn default() -> Self {
        PageMarker::Flag(false)
    }
}

/// Fetches successive pages until the marker reports no more, concatenating
/// the records. Any page failure is propagated: a partially fetched catalog
/// is never reconciled against the tree.
pub fn fetch_all_pages<T>(mut fetch_page: impl FnMut(u32) -> Result<Page<T>>) -> Result<Vec<T>> {
    let mut page = fetch_page(1)?;
    let mut records = std::mem::take(&mut page.data);
    while page.paginate.last_page.has_more() {
        let next = page.paginate.current_page + 1;
        page = fetch_page(next)?;
        records.append(&mut page.data);
    }
    Ok(records)
}

/// Synchronous catalog client; the bearer token is attached to every request.
pub struct CatalogClient {
    agent: ureq::Agent,
    server: String,
    token: String,
}

impl CatalogClient {
    pub fn new(settings: &Settings) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            agent,
            server: settings.catalog_server.clone(),
            token: settings.catalog_token.clone(),
        }
    }

    fn page_request<T: DeserializeOwned>(
        &self,
        url: &str,
        page: u32,
        channel_filter: Option<&str>,
    ) -> Result<Page<T>> {
        let mut request = self
            .agent
            .get(url)
            .set("Authorization", &format!("Token {}", self.token))
            .query("page", &page.to_string());
        if let Some(channel_id) = channel_filter {
            request = request.query("channel", channel_id);
        }
        let response = request
            .call()
            .with_context(|| format!("fetching {url} page {page}"))?;
        response
            .into_json()
            .with_context(|| format!("decoding {url} page {page}"))
    }

    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let url = format!("{}/api/channel/", self.server);
        fetch_all_pages(|page| self.page_request(&url, page, None))
    }

    pub fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let url = format!("{}/api/playlist/", self.server);
        fetch_all_pages(|page| self.page_request(&url, page, None))
    }

    pub fn channel_videos(&self, channel_id: &str) -> Result<Vec<Video>> {
        let url = format!("{}/api/video/", self.server);
        fetch_all_pages(|page| self.page_request(&url, page, Some(channel_id)))
    }

    /// Single-video lookup. A non-success status means the catalog no longer
    /// knows the id; callers skip such entries.
    pub fn video(&self, youtube_id: &str) -> Result<Option<Video>> {
        let url = format!("{}/api/video/{}/", self.server, youtube_id);
        let request = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Token {}", self.token));
        match request.call() {
            Ok(response) => {
                let video = response
                    .into_json()
                    .with_context(|| format!("decoding video {youtube_id}"))?;
                Ok(Some(video))
            }
            Err(ureq::Error::Status(code, _)) => {
                tracing::debug!(youtube_id, code, "video lookup returned non-success status");
                Ok(None)
            }
            Err(err) => Err(anyhow!(err)).with_context(|| format!("fetching video {youtube_id}")),
        }
    }
}
