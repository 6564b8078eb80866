pub mod mock;
pub mod pages;
pub mod schema;
pub mod spotify;
pub mod transport;

use crate::error::Result;
use crate::models::{CreatedPlaylist, PlaylistRef, Track, User};

/// Catalog trait: the remote operations the merge engine needs.
/// Implementations: spotify::SpotifyCatalog and mock::MockCatalog.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// The user owning the credential.
    async fn current_user(&self) -> Result<User>;

    /// All playlists of a user. A page failure part way through returns the
    /// playlists gathered so far; only `Unauthorized` is propagated.
    async fn list_user_playlists(&self, user_id: &str) -> Result<Vec<PlaylistRef>>;

    /// Every playable track of a playlist, in playlist order. Any page
    /// failure fails the whole call.
    async fn playlist_tracks(&self, playlist_id: &str) -> Result<Vec<Track>>;

    /// Create a private playlist owned by `user_id`.
    async fn create_playlist(&self, user_id: &str, name: &str, description: &str) -> Result<CreatedPlaylist>;

    /// Append uris to a playlist in one call (batching done by caller).
    async fn add_tracks(&self, playlist_id: &str, uris: &[String]) -> Result<()>;

    /// Return the catalog's name (for logging)
    fn name(&self) -> &str;
}
