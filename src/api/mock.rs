use super::Catalog;
use crate::error::{Error, Result};
use crate::models::{CreatedPlaylist, PlaylistRef, Track, User};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// A call observed by the mock, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CurrentUser,
    ListPlaylists(String),
    PlaylistTracks(String),
    /// A track fetch finished (successfully or not).
    PlaylistTracksDone(String),
    CreatePlaylist { name: String, description: String },
    AddTracks { playlist_id: String, uris: Vec<String> },
}

/// Failure the mock can be told to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unauthorized,
    RateLimited,
    Remote(u16),
}

impl Failure {
    fn into_error(self) -> Error {
        match self {
            Failure::Unauthorized => Error::Unauthorized,
            Failure::RateLimited => Error::RateLimitExceeded { attempts: 4 },
            Failure::Remote(status) => Error::Remote {
                status,
                body: "{\"error\":\"mock\"}".into(),
            },
        }
    }
}

/// In-memory catalog used in tests. It records every call, returns
/// deterministic ids, and can be scripted to fail specific calls.
pub struct MockCatalog {
    user: User,
    playlists: Vec<(PlaylistRef, Vec<Track>)>,
    fetch_delay: Duration,
    playlist_delays: HashMap<String, Duration>,
    track_failures: HashMap<String, Failure>,
    create_failure: Option<Failure>,
    /// (1-based add call number, failure)
    add_failure: Option<(usize, Failure)>,
    calls: Mutex<Vec<Call>>,
    add_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockCatalog {
    pub fn new(user_id: &str) -> Self {
        Self {
            user: User {
                id: user_id.to_string(),
                display_name: Some(format!("Mock {}", user_id)),
            },
            playlists: Vec::new(),
            fetch_delay: Duration::ZERO,
            playlist_delays: HashMap::new(),
            track_failures: HashMap::new(),
            create_failure: None,
            add_failure: None,
            calls: Mutex::new(Vec::new()),
            add_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_playlist(mut self, id: &str, name: &str, tracks: Vec<Track>) -> Self {
        let r = PlaylistRef {
            id: id.to_string(),
            name: name.to_string(),
            track_count: tracks.len() as u32,
        };
        self.playlists.push((r, tracks));
        self
    }

    /// Make every track fetch take this long, so concurrent fetches overlap.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Override the fetch delay for one playlist.
    pub fn with_playlist_delay(mut self, playlist_id: &str, delay: Duration) -> Self {
        self.playlist_delays.insert(playlist_id.to_string(), delay);
        self
    }

    pub fn fail_tracks(mut self, playlist_id: &str, failure: Failure) -> Self {
        self.track_failures.insert(playlist_id.to_string(), failure);
        self
    }

    pub fn fail_create(mut self, failure: Failure) -> Self {
        self.create_failure = Some(failure);
        self
    }

    /// Fail the `n`th add-tracks call (1-based).
    pub fn fail_add_call(mut self, n: usize, failure: Failure) -> Self {
        self.add_failure = Some((n, failure));
        self
    }

    pub fn playlist_refs(&self) -> Vec<PlaylistRef> {
        self.playlists.iter().map(|(r, _)| r.clone()).collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::CreatePlaylist { .. }))
            .count()
    }

    /// uris of each add-tracks call, in order.
    pub fn add_batches(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddTracks { uris, .. } => Some(uris),
                _ => None,
            })
            .collect()
    }

    /// Highest number of track fetches that were running at the same time.
    pub fn max_concurrent_fetches(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        if let Ok(mut c) = self.calls.lock() {
            c.push(call);
        }
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    fn name(&self) -> &str {
        "mock"
    }

    async fn current_user(&self) -> Result<User> {
        self.record(Call::CurrentUser);
        Ok(self.user.clone())
    }

    async fn list_user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistRef>> {
        self.record(Call::ListPlaylists(user_id.to_string()));
        Ok(self.playlist_refs())
    }

    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>> {
        self.record(Call::PlaylistTracks(playlist_id.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = self
            .playlist_delays
            .get(playlist_id)
            .copied()
            .unwrap_or(self.fetch_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.record(Call::PlaylistTracksDone(playlist_id.to_string()));

        if let Some(f) = self.track_failures.get(playlist_id) {
            return Err(f.into_error());
        }
        let tracks = self
            .playlists
            .iter()
            .find(|(r, _)| r.id == playlist_id)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| Error::Remote {
                status: 404,
                body: format!("no playlist {}", playlist_id),
            })?;
        Ok(tracks)
    }

    async fn create_playlist(&self, _user_id: &str, name: &str, description: &str) -> Result<CreatedPlaylist> {
        info!("MockCatalog: create_playlist {}", name);
        self.record(Call::CreatePlaylist {
            name: name.to_string(),
            description: description.to_string(),
        });
        if let Some(f) = self.create_failure {
            return Err(f.into_error());
        }
        Ok(CreatedPlaylist {
            id: "mock-merged".into(),
            name: name.to_string(),
            uri: "spotify:playlist:mock-merged".into(),
            external_url: None,
        })
    }

    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()> {
        info!("MockCatalog: add_tracks {} -> {} tracks", playlist_id, uris.len());
        self.record(Call::AddTracks {
            playlist_id: playlist_id.to_string(),
            uris: uris.to_vec(),
        });
        let n = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.add_failure {
            Some((at, f)) if at == n => Err(f.into_error()),
            _ => Ok(()),
        }
    }
}
