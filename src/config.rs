use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,

    // OAuth app registration, only needed by `auth`
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Where `auth` stores the access token.
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Merge engine
    #[serde(default = "default_group_size")]
    pub group_size: usize,
    #[serde(default = "default_add_batch_size")]
    pub add_batch_size: usize,
    #[serde(default = "default_playlist_name_prefix")]
    pub playlist_name_prefix: String,

    // Rate limiting
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,
    #[serde(default = "default_rate_limit_margin_ms")]
    pub rate_limit_margin_ms: u64,
}

fn default_api_base() -> String { crate::api::spotify::DEFAULT_API_BASE.into() }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_redirect_uri() -> String { "http://127.0.0.1:8888/callback".into() }
fn default_token_path() -> PathBuf { app_dir(dirs::config_dir()).join("token.json") }
fn default_log_dir() -> PathBuf { app_dir(dirs::data_local_dir()).join("logs") }
fn default_group_size() -> usize { 3 }
fn default_add_batch_size() -> usize { crate::merge::MAX_ADD_BATCH }
fn default_playlist_name_prefix() -> String { "Merged Playlist".into() }
fn default_max_rate_limit_retries() -> u32 { 3 }
fn default_rate_limit_margin_ms() -> u64 { 1000 }

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("playlist-merge")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            auth_base: default_auth_base(),
            client_id: String::new(),
            redirect_uri: default_redirect_uri(),
            token_path: default_token_path(),
            log_dir: default_log_dir(),
            group_size: default_group_size(),
            add_batch_size: default_add_batch_size(),
            playlist_name_prefix: default_playlist_name_prefix(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            rate_limit_margin_ms: default_rate_limit_margin_ms(),
        }
    }
}

impl Config {
    /// Load and validate.
    pub fn from_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let cfg = Self::load(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse the file and apply env overrides without validating, so
    /// `config-validate` can report what is wrong.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&s)?;
        cfg.apply_env();
        Ok(cfg)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env();
        cfg
    }

    fn apply_env(&mut self) {
        if let Ok(base) = std::env::var("PLAYLIST_MERGE_API_BASE") {
            if !base.trim().is_empty() {
                self.api_base = base;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.group_size == 0 {
            anyhow::bail!("group_size must be at least 1");
        }
        if self.add_batch_size == 0 || self.add_batch_size > crate::merge::MAX_ADD_BATCH {
            anyhow::bail!(
                "add_batch_size must be between 1 and {}",
                crate::merge::MAX_ADD_BATCH
            );
        }
        url::Url::parse(&self.api_base)?;
        Ok(())
    }

    pub fn retry_policy(&self) -> crate::api::transport::RetryPolicy {
        crate::api::transport::RetryPolicy {
            max_retries: self.max_rate_limit_retries,
            margin: std::time::Duration::from_millis(self.rate_limit_margin_ms),
            ..Default::default()
        }
    }
}
