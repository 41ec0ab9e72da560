use serde::{Deserialize, Serialize};

/// Outcome of checking one community-membership claim.
///
/// `verified == true` implies `actual_members` is populated and `error` is
/// `None`; otherwise `error` names the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityValidation {
    /// Normalized community name (no `r/` prefix, lowercase).
    pub subject: String,
    pub verified: bool,
    pub actual_members: Option<u64>,
    pub claimed_members: Option<String>,
    pub error: Option<String>,
}

/// One community mention as asserted by the LLM analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityClaim {
    pub name: String,
    /// Human-readable member count as claimed (replaced after verification).
    pub members: Option<String>,
}

/// Result of validating a batch of community claims.
#[derive(Debug, Clone)]
pub struct CommunityBatchOutcome {
    /// Claims that verified, with `members` overwritten by the real count.
    pub verified: Vec<CommunityClaim>,
    pub valid_count: usize,
    pub invalid_count: usize,
}

/// Outcome of cross-checking one trend keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendVerification {
    pub subject: String,
    pub verified: bool,
    /// Mean relative interest over the window (0-100).
    pub actual_volume: Option<f64>,
    /// First-half vs second-half growth; `None` when undeterminable.
    pub actual_growth_percent: Option<f64>,
    pub claimed_volume: Option<String>,
    pub claimed_growth: Option<String>,
    pub error: Option<String>,
}

/// One trend keyword as asserted by the LLM analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendClaim {
    pub keyword: String,
    pub volume: Option<String>,
    pub growth: Option<String>,
}

/// A trend claim paired with the verification that produced its values.
#[derive(Debug, Clone)]
pub struct VerifiedTrendClaim {
    pub claim: TrendClaim,
    pub verification: TrendVerification,
}

/// Outcome of probing one competitor URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlValidation {
    /// Normalized URL (scheme added, trailing slash stripped).
    pub subject: String,
    pub verified: bool,
    /// URL after following redirects, when a response was obtained.
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub redirect_count: usize,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

/// Counts over a validator's cache, split by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub valid: usize,
    pub invalid: usize,
    pub total: usize,
}
