//! Community-signal validation against the Reddit API.
//!
//! The LLM analysis step names subreddits and asserts member counts; this
//! module checks the community exists and replaces the claimed count with
//! the real one, bucketed for display.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cache::ValidationCache;
use crate::error::VerifyError;
use crate::retry::retry_with_backoff;
use crate::types::{CommunityBatchOutcome, CommunityClaim, CommunityValidation};

const DEFAULT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const DEFAULT_API_BASE_URL: &str = "https://oauth.reddit.com";

/// Ground truth for one community, as reported by the authoritative API.
#[derive(Debug, Clone)]
pub struct CommunityInfo {
    pub name: String,
    pub subscribers: u64,
}

/// Capability interface for community ground-truth lookups.
///
/// The production implementation is [`RedditCommunityClient`]; tests and
/// other backends substitute their own.
#[async_trait]
pub trait CommunityLookup: Send + Sync {
    async fn fetch(&self, name: &str) -> Result<CommunityInfo, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    data: AboutData,
}

#[derive(Debug, Deserialize)]
struct AboutData {
    display_name: String,
    #[serde(default)]
    subscribers: Option<u64>,
}

/// Reddit `about.json` client (client-credentials OAuth).
///
/// Redirect following is disabled: a 3xx from the about endpoint usually
/// means the name was close-but-wrong, which callers want to surface as a
/// distinct failure rather than silently validating a different community.
pub struct RedditCommunityClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    user_agent: String,
    token: tokio::sync::OnceCell<String>,
    max_retries: u32,
    backoff_base_ms: u64,
    token_url: String,
    api_base_url: String,
}

impl RedditCommunityClient {
    /// Create a client from app config.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::NotConfigured`] when Reddit credentials are
    /// absent, and [`VerifyError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(config: &insight_core::AppConfig) -> Result<Self, VerifyError> {
        Self::with_base_urls(config, DEFAULT_TOKEN_URL, DEFAULT_API_BASE_URL)
    }

    /// Create a client with custom token/API URLs (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`RedditCommunityClient::new`].
    pub fn with_base_urls(
        config: &insight_core::AppConfig,
        token_url: &str,
        api_base_url: &str,
    ) -> Result<Self, VerifyError> {
        let (Some(client_id), Some(client_secret)) = (
            config.reddit_client_id.clone(),
            config.reddit_client_secret.clone(),
        ) else {
            return Err(VerifyError::NotConfigured {
                service: "reddit".to_owned(),
                reason: "REDDIT_CLIENT_ID / REDDIT_CLIENT_SECRET not set".to_owned(),
            });
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            user_agent: config.reddit_user_agent.clone(),
            token: tokio::sync::OnceCell::new(),
            max_retries: config.http_max_retries,
            backoff_base_ms: config.http_backoff_base_ms,
            token_url: token_url.trim_end_matches('/').to_owned(),
            api_base_url: api_base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn token(&self) -> Result<&str, VerifyError> {
        self.token
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(&self.token_url)
                    .header("User-Agent", &self.user_agent)
                    .basic_auth(&self.client_id, Some(&self.client_secret))
                    .form(&[("grant_type", "client_credentials")])
                    .send()
                    .await?;

                let status = response.status();
                if !status.is_success() {
                    return Err(VerifyError::Upstream {
                        subject: "reddit token exchange".to_owned(),
                        status: status.as_u16(),
                    });
                }

                let body = response.text().await?;
                let token: TokenResponse =
                    serde_json::from_str(&body).map_err(|e| VerifyError::Deserialize {
                        context: "reddit token exchange".to_owned(),
                        source: e,
                    })?;
                Ok(token.access_token)
            })
            .await
            .map(String::as_str)
    }

    async fn fetch_about(&self, name: &str) -> Result<CommunityInfo, VerifyError> {
        let token = self.token().await?;
        let url = format!("{}/r/{name}/about", self.api_base_url);
        let subject = format!("r/{name}");

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("User-Agent", &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        if status.is_redirection() {
            return Err(VerifyError::Redirected { subject });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(VerifyError::NotFound { subject });
        }
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(VerifyError::Forbidden { subject });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(VerifyError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(VerifyError::Upstream {
                subject,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let about: AboutResponse =
            serde_json::from_str(&body).map_err(|e| VerifyError::Deserialize {
                context: format!("about for {subject}"),
                source: e,
            })?;

        Ok(CommunityInfo {
            name: about.data.display_name,
            subscribers: about.data.subscribers.unwrap_or(0),
        })
    }
}

#[async_trait]
impl CommunityLookup for RedditCommunityClient {
    async fn fetch(&self, name: &str) -> Result<CommunityInfo, VerifyError> {
        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            self.fetch_about(name)
        })
        .await
    }
}

/// Validates community claims, caching by normalized name.
///
/// Construct with [`CommunityValidator::new`] when a lookup client exists,
/// or [`CommunityValidator::not_configured`] to get an instance whose every
/// call short-circuits to a typed "not configured" result without touching
/// the network.
pub struct CommunityValidator {
    /// The lookup client, or the reason none could be configured.
    lookup: Result<Arc<dyn CommunityLookup>, String>,
    cache: ValidationCache<CommunityValidation>,
}

impl CommunityValidator {
    #[must_use]
    pub fn new(lookup: Arc<dyn CommunityLookup>) -> Self {
        Self {
            lookup: Ok(lookup),
            cache: ValidationCache::new(),
        }
    }

    /// Build a validator whose calls all fail fast with `reason`.
    #[must_use]
    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self {
            lookup: Err(reason.into()),
            cache: ValidationCache::new(),
        }
    }

    /// Build from app config: configured when Reddit credentials exist,
    /// fail-fast otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &insight_core::AppConfig) -> Result<Self, VerifyError> {
        match RedditCommunityClient::new(config) {
            Ok(client) => Ok(Self::new(Arc::new(client))),
            Err(VerifyError::NotConfigured { reason, .. }) => {
                tracing::warn!(reason = %reason, "community validator running unconfigured");
                Ok(Self::not_configured(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Check one community claim against the live API.
    ///
    /// Results are cached by normalized name for the process lifetime;
    /// concurrent calls for the same name share one fetch.
    pub async fn validate(&self, name: &str) -> CommunityValidation {
        let subject = normalize_community_name(name);

        let lookup = match &self.lookup {
            Ok(lookup) => Arc::clone(lookup),
            Err(reason) => {
                return CommunityValidation {
                    subject,
                    verified: false,
                    actual_members: None,
                    claimed_members: None,
                    error: Some(format!("community lookup not configured: {reason}")),
                };
            }
        };

        self.cache
            .get_or_fetch(&subject, || {
                let subject = subject.clone();
                async move {
                    match lookup.fetch(&subject).await {
                        Ok(info) => {
                            tracing::debug!(
                                community = %subject,
                                subscribers = info.subscribers,
                                "community verified"
                            );
                            CommunityValidation {
                                subject,
                                verified: true,
                                actual_members: Some(info.subscribers),
                                claimed_members: None,
                                error: None,
                            }
                        }
                        Err(e) => {
                            tracing::debug!(community = %subject, error = %e, "community failed validation");
                            CommunityValidation {
                                subject,
                                verified: false,
                                actual_members: None,
                                claimed_members: None,
                                error: Some(e.to_string()),
                            }
                        }
                    }
                }
            })
            .await
    }

    /// Validate every claim independently; no early exit on failures.
    ///
    /// Verified claims come back with `members` overwritten by the bucketed
    /// real count. When fewer than `min_valid_required` verify, a warning is
    /// logged but the outcome is still returned; filtering is the caller's
    /// decision.
    pub async fn validate_all(
        &self,
        claims: Vec<CommunityClaim>,
        min_valid_required: usize,
    ) -> CommunityBatchOutcome {
        let mut verified = Vec::new();
        let mut invalid_count = 0usize;

        for mut claim in claims {
            let validation = self.validate(&claim.name).await;
            if validation.verified {
                let members = validation.actual_members.unwrap_or(0);
                claim.members = Some(format_member_count(members));
                verified.push(claim);
            } else {
                invalid_count += 1;
            }
        }

        let valid_count = verified.len();
        if valid_count < min_valid_required {
            tracing::warn!(
                valid_count,
                min_valid_required,
                "fewer verified communities than required"
            );
        }

        CommunityBatchOutcome {
            verified,
            valid_count,
            invalid_count,
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// Strip `r/`-style prefixes and normalize case/whitespace.
#[must_use]
pub fn normalize_community_name(name: &str) -> String {
    let trimmed = name.trim().trim_start_matches('/');
    let lower = trimmed.to_lowercase();
    lower
        .strip_prefix("r/")
        .unwrap_or(&lower)
        .trim()
        .to_owned()
}

/// Bucket a real subscriber count into the display string stored on the
/// insight: `"2.5M+ members"`, `"150K+ members"`, or the exact count.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_member_count(count: u64) -> String {
    if count >= 1_000_000 {
        let millions = count as f64 / 1_000_000.0;
        let rendered = format!("{millions:.1}");
        let rendered = rendered.strip_suffix(".0").unwrap_or(&rendered);
        format!("{rendered}M+ members")
    } else if count >= 1_000 {
        format!("{}K+ members", count / 1_000)
    } else {
        format!("{count} members")
    }
}
