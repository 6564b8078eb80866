use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque bearer token. Expiry is only ever discovered through a rejected
/// request, so nothing else is stored alongside it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// A source playlist as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    pub track_count: u32,
}

/// A playable catalog track. Local files and removed entries never become a
/// `Track`; they are dropped while decoding playlist items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub uri: String,
    pub name: String,
    pub primary_artist: String,
    pub album: String,
}

/// The playlist created by a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub external_url: Option<String>,
}

impl CreatedPlaylist {
    /// Link that opens the playlist in the app/web player.
    pub fn open_url(&self) -> String {
        if let Some(id) = self.uri.strip_prefix("spotify:playlist:") {
            return format!("https://open.spotify.com/playlist/{}", id);
        }
        self.external_url.clone().unwrap_or_else(|| self.uri.clone())
    }
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: Option<String>,
}

/// Playlist ids the user has picked for merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    /// Select every playlist, or clear the selection when all of them are
    /// already selected.
    pub fn toggle_all(&mut self, playlists: &[PlaylistRef]) {
        let all_selected =
            !playlists.is_empty() && playlists.iter().all(|p| self.ids.contains(&p.id));
        if all_selected {
            self.ids.clear();
        } else {
            self.ids = playlists.iter().map(|p| p.id.clone()).collect();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Selected playlists, in the order they appear in `playlists`.
    /// Ids that are not in the listing are ignored.
    pub fn resolve(&self, playlists: &[PlaylistRef]) -> Vec<PlaylistRef> {
        playlists
            .iter()
            .filter(|p| self.ids.contains(&p.id))
            .cloned()
            .collect()
    }
}
