//! Wire shapes of the catalog API responses.
//!
//! Fields the merge does not need are left out; serde ignores them.
use crate::models::{CreatedPlaylist, PlaylistRef, Track, User};
use serde::Deserialize;

/// One page of a paginated collection. Items are kept as raw JSON so a
/// single odd item (null, episode, ...) can be dropped without failing the
/// whole page.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub total: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct UserObject {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl From<UserObject> for User {
    fn from(u: UserObject) -> Self {
        User { id: u.id, display_name: u.display_name }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TracksRef {
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub tracks: Option<TracksRef>,
    #[serde(default)]
    pub external_urls: Option<ExternalUrls>,
}

impl From<PlaylistObject> for PlaylistRef {
    fn from(p: PlaylistObject) -> Self {
        PlaylistRef {
            id: p.id,
            name: p.name,
            track_count: p.tracks.map(|t| t.total).unwrap_or(0),
        }
    }
}

impl From<PlaylistObject> for CreatedPlaylist {
    fn from(p: PlaylistObject) -> Self {
        CreatedPlaylist {
            id: p.id,
            name: p.name,
            uri: p.uri,
            external_url: p.external_urls.and_then(|u| u.spotify),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NamedObject {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrackObject {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artists: Vec<NamedObject>,
    #[serde(default)]
    pub album: Option<NamedObject>,
    #[serde(default)]
    pub is_local: bool,
}

/// An entry of a playlist's track listing.
#[derive(Debug, Deserialize)]
pub struct PlaylistItem {
    #[serde(default)]
    pub track: Option<TrackObject>,
    #[serde(default)]
    pub is_local: bool,
}

impl PlaylistItem {
    /// The playable track behind this entry, if any. Removed tracks, local
    /// files and entries without a uri yield `None`.
    pub fn into_track(self) -> Option<Track> {
        if self.is_local {
            return None;
        }
        let t = self.track?;
        if t.is_local {
            return None;
        }
        let uri = t.uri.filter(|u| !u.trim().is_empty() && !u.starts_with("spotify:local:"))?;
        Some(Track {
            uri,
            name: t.name.unwrap_or_default(),
            primary_artist: t
                .artists
                .into_iter()
                .next()
                .and_then(|a| a.name)
                .unwrap_or_default(),
            album: t.album.and_then(|a| a.name).unwrap_or_default(),
        })
    }
}
