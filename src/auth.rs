use crate::config::Config;
use crate::models::Credential;
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};
use url::Url;

/// Permissions needed to read the user's playlists and write the merged one.
pub const SCOPES: &[&str] = &[
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
    "playlist-modify-private",
    "user-read-private",
    "user-read-email",
];

/// Token as written to `token_path`. Only `access_token` is handed to the
/// merge engine; `expires_at` is informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: i64, // epoch seconds
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default = "one_hour")]
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
}

fn bearer() -> String {
    "Bearer".into()
}

fn one_hour() -> i64 {
    3600
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_string(64)
}

/// S256 PKCE challenge for a verifier.
pub fn code_challenge_s256(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn authorize_url(cfg: &Config, challenge: &str, state: &str) -> Result<Url> {
    if cfg.client_id.trim().is_empty() {
        return Err(anyhow!("client_id is not set in the config"));
    }
    let mut url = Url::parse(&format!("{}/authorize", cfg.auth_base.trim_end_matches('/')))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &cfg.client_id)
        .append_pair("scope", &SCOPES.join(" "))
        .append_pair("redirect_uri", &cfg.redirect_uri)
        .append_pair("code_challenge_method", "S256")
        .append_pair("code_challenge", challenge)
        .append_pair("state", state)
        .append_pair("show_dialog", "true");
    Ok(url)
}

/// Pull the authorization code out of the pasted redirect url.
pub fn extract_code(redirect: &str, expected_state: &str) -> Result<String> {
    let parsed = Url::parse(redirect.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;
    let param = |name: &str| {
        parsed
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };
    if let Some(err) = param("error") {
        return Err(anyhow!("authorization denied: {}", err));
    }
    if param("state").as_deref() != Some(expected_state) {
        return Err(anyhow!("state mismatch in redirect URL"));
    }
    param("code").ok_or_else(|| anyhow!("no code in redirect URL"))
}

pub async fn exchange_code(cfg: &Config, code: &str, verifier: &str) -> Result<StoredToken> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", cfg.redirect_uri.as_str()),
        ("client_id", cfg.client_id.as_str()),
        ("code_verifier", verifier),
    ];
    let url = format!("{}/api/token", cfg.auth_base.trim_end_matches('/'));
    let resp = Client::new().post(&url).form(&params).send().await?;
    let status = resp.status();
    if !status.is_success() {
        let txt = resp.text().await.unwrap_or_default();
        return Err(anyhow!("token exchange failed: {} => {}", status, txt));
    }
    let tr: TokenResponse = resp.json().await?;
    Ok(StoredToken {
        access_token: tr.access_token,
        token_type: tr.token_type,
        expires_at: Utc::now().timestamp() + tr.expires_in,
        refresh_token: tr.refresh_token,
        scope: tr.scope,
    })
}

pub fn save_token(path: &Path, token: &StoredToken) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating token directory {}", dir.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(token)?)
        .with_context(|| format!("writing token to {}", path.display()))?;
    Ok(())
}

pub fn load_token(path: &Path) -> Result<StoredToken> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading token from {}; run `auth` first", path.display()))?;
    let token: StoredToken =
        serde_json::from_str(&s).map_err(|e| anyhow!("parse token json: {}", e))?;
    Ok(token)
}

/// Credential from the stored token. An expired token is still returned;
/// the remote service is the authority and will answer 401.
pub fn load_credential(cfg: &Config) -> Result<Credential> {
    let token = load_token(&cfg.token_path)?;
    if token.expires_at <= Utc::now().timestamp() {
        warn!("stored access token looks expired; run `auth` if requests are rejected");
    }
    Ok(Credential::new(token.access_token))
}

/// Interactive authorization-code + PKCE login:
/// 1. Print the authorize url.
/// 2. The user approves and is redirected (the page itself may fail to load).
/// 3. The user pastes the full redirect url back here.
/// 4. The code is exchanged for a token, which is saved to `token_path`.
pub async fn run_auth(cfg: &Config) -> Result<()> {
    let verifier = generate_code_verifier();
    let state = random_string(16);
    let url = authorize_url(cfg, &code_challenge_s256(&verifier), &state)?;

    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!("After authorizing, copy the full URL you were redirected to and paste it here:");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let code = extract_code(&input, &state)?;

    let token = exchange_code(cfg, &code, &verifier).await?;
    save_token(&cfg.token_path, &token)?;
    info!("access token saved to {}", cfg.token_path.display());
    println!("Saved token to {}.", cfg.token_path.display());
    Ok(())
}
