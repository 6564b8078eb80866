use super::pages;
use super::schema::{PlaylistItem, PlaylistObject, UserObject};
use super::transport::{RetryPolicy, Transport};
use super::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{CreatedPlaylist, Credential, PlaylistRef, Track, User};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::json;

pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Fields requested for playlist track listings.
const TRACK_FIELDS: &str = "items(track(id,name,uri,artists(name),album(name),is_local),is_local),next,total";

/// Spotify Web API catalog on top of the authenticated transport.
pub struct SpotifyCatalog {
    transport: Transport,
}

impl SpotifyCatalog {
    pub fn new(credential: Credential) -> Self {
        Self::with_base(credential, DEFAULT_API_BASE)
    }

    pub fn from_config(credential: Credential, cfg: &Config) -> Self {
        Self::with_base(credential, cfg.api_base.clone()).with_policy(cfg.retry_policy())
    }

    pub fn with_base(credential: Credential, api_base: impl Into<String>) -> Self {
        Self {
            transport: Transport::new(credential, api_base),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport = self.transport.with_policy(policy);
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn current_user(&self) -> Result<User> {
        let u: UserObject = self.transport.get("/me").await?;
        Ok(u.into())
    }

    async fn list_user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistRef>> {
        let mut walker = pages::walk::<PlaylistObject>(
            &self.transport,
            format!("/users/{}/playlists?limit=50", enc(user_id)),
        );
        let mut playlists = Vec::new();
        loop {
            match walker.next_batch().await {
                Ok(Some(batch)) => playlists.extend(batch.into_iter().map(PlaylistRef::from)),
                Ok(None) => break,
                Err(Error::Unauthorized) => return Err(Error::Unauthorized),
                Err(e) => {
                    // A partial list is still useful to pick from.
                    warn!(
                        "listing playlists stopped after {} page(s): {}",
                        walker.pages_fetched(),
                        e
                    );
                    break;
                }
            }
        }
        debug!("user {} has {} playlists", user_id, playlists.len());
        Ok(playlists)
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        let mut walker = pages::walk::<PlaylistItem>(
            &self.transport,
            format!(
                "/playlists/{}/tracks?limit=100&fields={}",
                enc(playlist_id),
                enc(TRACK_FIELDS)
            ),
        );
        let mut tracks = Vec::new();
        while let Some(batch) = walker.next_batch().await? {
            tracks.extend(batch.into_iter().filter_map(PlaylistItem::into_track));
        }
        debug!(
            "playlist {}: {} playable tracks over {} page(s)",
            playlist_id,
            tracks.len(),
            walker.pages_fetched()
        );
        Ok(tracks)
    }

    async fn create_playlist(&self, user_id: &str, name: &str, description: &str) -> Result<CreatedPlaylist> {
        let body = json!({
            "name": name,
            "description": description,
            "public": false
        });
        let created: PlaylistObject = self
            .transport
            .post(&format!("/users/{}/playlists", enc(user_id)), &body)
            .await?;
        Ok(created.into())
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        let body = json!({ "uris": uris });
        self.transport
            .request(
                reqwest::Method::POST,
                &format!("/playlists/{}/tracks", enc(playlist_id)),
                Some(&body),
            )
            .await?;
        Ok(())
    }
}
