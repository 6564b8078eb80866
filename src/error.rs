use crate::merge::MergeStatus;
use thiserror::Error;

/// Failures surfaced by the transport, the catalog and the merge engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The bearer credential was rejected (HTTP 401). Never retried; the
    /// caller has to acquire a fresh credential.
    #[error("Access token expired or was rejected; please log in again.")]
    Unauthorized,

    #[error("Rate limited by the remote service; gave up after {attempts} attempts.")]
    RateLimitExceeded { attempts: u32 },

    #[error("Remote API error: {status} {body}")]
    Remote { status: u16, body: String },

    #[error("No valid tracks found in selected playlists.")]
    NoTracksFound,

    #[error("A merge is already in progress or awaiting acknowledgement ({0:?}).")]
    NotIdle(MergeStatus),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// True when the caller has to re-acquire the credential before retrying.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
