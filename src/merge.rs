use crate::api::Catalog;
use crate::error::{Error, Result};
use crate::identity::UniqueTrackSet;
use crate::models::{CreatedPlaylist, PlaylistRef, Selection};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Most uris the remote accepts in one add-tracks call.
pub const MAX_ADD_BATCH: usize = 100;

const GENERIC_ERROR: &str = "An unexpected error occurred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergeStatus {
    Idle,
    FetchingTracks,
    CreatingPlaylist,
    AddingTracks,
    Success,
    Error,
}

impl MergeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeStatus::Success | MergeStatus::Error)
    }
}

/// What the UI renders. One is emitted on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSnapshot {
    pub status: MergeStatus,
    /// 0..=100
    pub progress: u8,
    pub message: String,
    pub result_url: Option<String>,
    /// Set when the run failed because the credential was rejected.
    pub reauth_required: bool,
}

impl MergeSnapshot {
    fn idle() -> Self {
        Self {
            status: MergeStatus::Idle,
            progress: 0,
            message: String::new(),
            result_url: None,
            reauth_required: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeSettings {
    /// Playlists fetched concurrently per group.
    pub group_size: usize,
    /// uris per add-tracks call, never above [`MAX_ADD_BATCH`].
    pub batch_size: usize,
    /// Destination name is "<prefix> - <date>".
    pub name_prefix: String,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            group_size: 3,
            batch_size: MAX_ADD_BATCH,
            name_prefix: "Merged Playlist".into(),
        }
    }
}

impl From<&crate::config::Config> for MergeSettings {
    fn from(cfg: &crate::config::Config) -> Self {
        Self {
            group_size: cfg.group_size,
            batch_size: cfg.add_batch_size,
            name_prefix: cfg.playlist_name_prefix.clone(),
        }
    }
}

/// Transient state of a single run.
struct MergeJob {
    id: Uuid,
    selected: Vec<PlaylistRef>,
    unique: UniqueTrackSet,
    created: Option<CreatedPlaylist>,
}

/// Drives one merge at a time from `Idle` to `Success` or `Error`.
///
/// Progress is published on a broadcast channel (see [`subscribe`]) and is
/// also readable through [`snapshot`]. Each run emits exactly one terminal
/// snapshot; the orchestrator stays in that state until [`acknowledge`].
///
/// [`subscribe`]: MergeOrchestrator::subscribe
/// [`snapshot`]: MergeOrchestrator::snapshot
/// [`acknowledge`]: MergeOrchestrator::acknowledge
pub struct MergeOrchestrator {
    catalog: Arc<dyn Catalog>,
    owner_id: String,
    settings: MergeSettings,
    state: MergeSnapshot,
    events: broadcast::Sender<MergeSnapshot>,
}

impl MergeOrchestrator {
    /// `owner_id` is the user the destination playlist is created for.
    pub fn new(catalog: Arc<dyn Catalog>, owner_id: impl Into<String>, settings: MergeSettings) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            catalog,
            owner_id: owner_id.into(),
            settings,
            state: MergeSnapshot::idle(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MergeSnapshot> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> &MergeSnapshot {
        &self.state
    }

    pub fn status(&self) -> MergeStatus {
        self.state.status
    }

    /// Return to `Idle` after a terminal state has been shown to the user.
    pub fn acknowledge(&mut self) {
        if self.state.status.is_terminal() {
            self.state = MergeSnapshot::idle();
            let _ = self.events.send(self.state.clone());
        }
    }

    /// Merge the selected playlists into a new one.
    ///
    /// Returns the terminal snapshot; failures of the merge itself are
    /// reported through it, not as `Err`. `Err(NotIdle)` means the previous
    /// run has not been acknowledged yet. An empty selection does nothing.
    /// On success the selection is cleared.
    pub async fn run(&mut self, selection: &mut Selection, playlists: &[PlaylistRef]) -> Result<MergeSnapshot> {
        if self.state.status != MergeStatus::Idle {
            return Err(Error::NotIdle(self.state.status));
        }
        let selected = selection.resolve(playlists);
        if selected.is_empty() {
            warn!("merge requested with no resolvable playlists selected");
            return Ok(self.state.clone());
        }

        let mut job = MergeJob {
            id: Uuid::new_v4(),
            selected,
            unique: UniqueTrackSet::new(),
            created: None,
        };
        let span = info_span!("merge", job = %job.id, catalog = self.catalog.name());
        let outcome = self.execute(&mut job).instrument(span.clone()).await;

        let _enter = span.enter();
        match outcome {
            Ok(count) => {
                // execute only succeeds after the playlist exists
                let created = job.created.take();
                let (name, url) = created
                    .map(|c| (c.name.clone(), Some(c.open_url())))
                    .unwrap_or_default();
                self.emit(MergeSnapshot {
                    status: MergeStatus::Success,
                    progress: 100,
                    message: format!("Successfully merged {} tracks into \"{}\"", count, name),
                    result_url: url,
                    reauth_required: false,
                });
                selection.clear();
            }
            Err(e) => {
                if let Some(c) = &job.created {
                    warn!("playlist {} ({}) was left partially filled", c.name, c.id);
                }
                let mut message = e.to_string();
                if message.trim().is_empty() {
                    message = GENERIC_ERROR.to_string();
                }
                self.emit(MergeSnapshot {
                    status: MergeStatus::Error,
                    progress: 0,
                    message,
                    result_url: None,
                    reauth_required: e.requires_reauth(),
                });
            }
        }
        Ok(self.state.clone())
    }

    async fn execute(&mut self, job: &mut MergeJob) -> Result<usize> {
        self.progress(MergeStatus::FetchingTracks, 5, "Initializing merge...".into());

        let group_size = self.settings.group_size.max(1);
        let total_groups = (job.selected.len() + group_size - 1) / group_size;
        for (i, group) in job.selected.chunks(group_size).enumerate() {
            let names = quoted_names(group);
            self.progress(
                MergeStatus::FetchingTracks,
                fetch_progress(i, total_groups),
                format!("Fetching tracks from {}...", names),
            );

            let catalog = Arc::clone(&self.catalog);
            let fetched = try_join_all(group.iter().map(|p| {
                let catalog = Arc::clone(&catalog);
                async move { catalog.playlist_tracks(&p.id).await.map(|t| (p, t)) }
            }))
            .await?;

            for (playlist, tracks) in &fetched {
                let added = job.unique.extend(tracks);
                debug!(
                    "{}: {} tracks, {} new, {} unique so far",
                    playlist.name,
                    tracks.len(),
                    added,
                    job.unique.len()
                );
            }
            self.progress(
                MergeStatus::FetchingTracks,
                fetch_progress(i + 1, total_groups),
                format!("Fetched tracks from {}", names),
            );
        }

        if job.unique.is_empty() {
            return Err(Error::NoTracksFound);
        }
        let uris = std::mem::take(&mut job.unique).into_uris();

        let name = format!(
            "{} - {}",
            self.settings.name_prefix,
            chrono::Local::now().format("%Y-%m-%d")
        );
        let description = format!("Merged from {} playlists.", job.selected.len());
        self.progress(
            MergeStatus::CreatingPlaylist,
            70,
            format!("Creating new playlist \"{}\"...", name),
        );
        let created = self
            .catalog
            .create_playlist(&self.owner_id, &name, &description)
            .await?;
        info!("created playlist {} ({})", created.name, created.id);
        let playlist_id = created.id.clone();
        job.created = Some(created);

        self.progress(
            MergeStatus::AddingTracks,
            85,
            format!("Adding {} unique tracks...", uris.len()),
        );
        let batch_size = self.settings.batch_size.clamp(1, MAX_ADD_BATCH);
        for (i, chunk) in uris.chunks(batch_size).enumerate() {
            self.catalog.add_tracks(&playlist_id, chunk).await?;
            debug!("added batch {} ({} tracks)", i + 1, chunk.len());
        }

        Ok(uris.len())
    }

    fn progress(&mut self, status: MergeStatus, progress: u8, message: String) {
        self.emit(MergeSnapshot {
            status,
            progress,
            message,
            result_url: None,
            reauth_required: false,
        });
    }

    fn emit(&mut self, snapshot: MergeSnapshot) {
        info!("{:?} {}% {}", snapshot.status, snapshot.progress, snapshot.message);
        self.state = snapshot;
        // No subscribers is fine; the state is still readable via snapshot().
        let _ = self.events.send(self.state.clone());
    }
}

fn fetch_progress(groups_done: usize, total_groups: usize) -> u8 {
    if total_groups == 0 {
        return 10;
    }
    (10 + groups_done * 50 / total_groups) as u8
}

fn quoted_names(group: &[PlaylistRef]) -> String {
    group
        .iter()
        .map(|p| format!("\"{}\"", p.name))
        .collect::<Vec<_>>()
        .join(", ")
}
