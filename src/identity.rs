use crate::models::Track;
use std::collections::HashSet;
use std::fmt;

/// Placeholder used when a track has no artist or album metadata.
pub const UNKNOWN: &str = "unknown";

/// Normalized (name, primary artist, album) triple deciding whether two
/// tracks are the same song for merge purposes.
///
/// The same recording on a different album produces a different key, so
/// live and studio versions both survive a merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey(String);

impl TrackKey {
    pub fn of(track: &Track) -> Self {
        // A nameless track keys on its uri so it cannot swallow other
        // nameless tracks.
        let name = match normalize(&track.name) {
            n if n.is_empty() => track.uri.trim().to_string(),
            n => n,
        };
        let artist = or_unknown(normalize(&track.primary_artist));
        let album = or_unknown(normalize(&track.album));
        TrackKey(format!("{}|{}|{}", name, artist, album))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn or_unknown(s: String) -> String {
    if s.is_empty() {
        UNKNOWN.to_string()
    } else {
        s
    }
}

/// Insertion-ordered set of unique tracks. The first uri seen for a key is
/// the one kept.
#[derive(Debug, Default)]
pub struct UniqueTrackSet {
    seen: HashSet<TrackKey>,
    uris: Vec<String>,
}

impl UniqueTrackSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the track was not a duplicate.
    pub fn insert(&mut self, track: &Track) -> bool {
        if self.seen.insert(TrackKey::of(track)) {
            self.uris.push(track.uri.clone());
            true
        } else {
            false
        }
    }

    pub fn extend<'a, I>(&mut self, tracks: I) -> usize
    where
        I: IntoIterator<Item = &'a Track>,
    {
        tracks.into_iter().filter(|t| self.insert(t)).count()
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn into_uris(self) -> Vec<String> {
        self.uris
    }
}
