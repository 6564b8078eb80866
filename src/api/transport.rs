use crate::error::{Error, Result};
use crate::models::Credential;
use log::{debug, warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::{ParseError, Url};

/// How 429 responses are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a 429 once these are spent fails the call.
    pub max_retries: u32,
    /// Added on top of the server's Retry-After hint.
    pub margin: Duration,
    /// Used when the server sends no (or an unreadable) Retry-After header.
    pub default_retry_after_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            margin: Duration::from_secs(1),
            default_retry_after_secs: 2,
        }
    }
}

/// HTTP client that attaches the bearer credential to every call and
/// classifies failures.
pub struct Transport {
    client: Client,
    credential: Credential,
    api_base: String,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(credential: Credential, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            credential,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Absolute urls (pagination cursors) pass through untouched; anything
    /// else is a path under the API base.
    pub fn resolve(&self, url: &str) -> Result<Url> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse(&format!("{}/", self.api_base))?;
                Ok(base.join(url.trim_start_matches('/'))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Perform one logical request, retrying only on rate limiting.
    /// An empty success body decodes as `null`.
    pub async fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.resolve(url)?;
        let mut retries: u32 = 0;
        loop {
            let mut req = self
                .client
                .request(method.clone(), url.clone())
                .header(AUTHORIZATION, self.credential.bearer());
            if let Some(b) = body {
                req = req.header(CONTENT_TYPE, "application/json").json(b);
            }
            let resp = req.send().await?;
            let status = resp.status();

            if status == StatusCode::UNAUTHORIZED {
                warn!("{} {} rejected the access token (401)", method, url);
                return Err(Error::Unauthorized);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.policy.max_retries {
                    warn!(
                        "{} {} still rate limited after {} retries; giving up",
                        method, url, retries
                    );
                    return Err(Error::RateLimitExceeded { attempts: retries + 1 });
                }
                let retry_after = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .unwrap_or(self.policy.default_retry_after_secs);
                retries += 1;
                let wait = Duration::from_secs(retry_after) + self.policy.margin;
                warn!(
                    "{} {} rate limited; retry {}/{} in {:?}",
                    method, url, retries, self.policy.max_retries, wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let txt = resp.text().await.unwrap_or_default();
                return Err(Error::Remote {
                    status: status.as_u16(),
                    body: txt,
                });
            }

            let txt = resp.text().await?;
            debug!("{} {} -> {} ({} bytes)", method, url, status, txt.len());
            if txt.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&txt)?);
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let v = self.request(Method::GET, url, None).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let v = self.request(Method::POST, url, Some(body)).await?;
        Ok(serde_json::from_value(v)?)
    }
}
