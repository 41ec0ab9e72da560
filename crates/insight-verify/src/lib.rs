//! Verification services for LLM-asserted claims.
//!
//! Each validator cross-checks one kind of claim against a live
//! authoritative source: community membership against the Reddit API,
//! search-trend volume/growth against a trends API, and competitor URLs
//! against the sites themselves. Fabricated values are replaced with
//! verified ones; failures come back as typed, non-verified results rather
//! than errors.

pub mod cache;
pub mod community;
pub mod error;
mod retry;
pub mod trends;
pub mod types;
pub mod url;

pub use cache::ValidationCache;
pub use community::{
    format_member_count, normalize_community_name, CommunityInfo, CommunityLookup,
    CommunityValidator, RedditCommunityClient,
};
pub use error::VerifyError;
pub use trends::{
    compare_growth_claims, format_growth, parse_percent, GoogleTrendsClient, TrendLookup,
    TrendVerifier, VolumeBucket, DEFAULT_GROWTH_TOLERANCE_PERCENT,
};
pub use types::{
    CacheStats, CommunityBatchOutcome, CommunityClaim, CommunityValidation, TrendClaim,
    TrendVerification, UrlValidation, VerifiedTrendClaim,
};
pub use self::url::{normalize_url, UrlValidator};
