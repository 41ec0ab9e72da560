use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if any env var holds a value that fails to parse.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files — useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if any env var holds a value that fails to parse.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// This is the core parsing/validation logic, decoupled from the actual environment
/// so it can be tested with a pure `HashMap` lookup — no `set_var`/`remove_var` needed.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_i64 = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<i64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<usize>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let parse_f64 = |var: &str, default: &str| -> Result<f64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<f64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        let raw = or_default(var, default);
        match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("expected true/false, got \"{other}\""),
            }),
        }
    };

    let env = parse_environment(&or_default("INSIGHT_ENV", "development"));
    let log_level = or_default("INSIGHT_LOG_LEVEL", "info");

    let http_timeout_secs = parse_u64("INSIGHT_HTTP_TIMEOUT_SECS", "30")?;
    let http_user_agent = or_default(
        "INSIGHT_HTTP_USER_AGENT",
        "startinsight/0.1 (signal-ingestion)",
    );
    let http_max_retries = parse_u32("INSIGHT_HTTP_MAX_RETRIES", "3")?;
    let http_backoff_base_ms = parse_u64("INSIGHT_HTTP_BACKOFF_BASE_MS", "1000")?;

    let reddit_client_id = lookup("REDDIT_CLIENT_ID").ok();
    let reddit_client_secret = lookup("REDDIT_CLIENT_SECRET").ok();
    let reddit_user_agent = or_default(
        "REDDIT_USER_AGENT",
        "startinsight/0.1 (startup-signal-scan)",
    );
    let reddit_min_score = parse_i64("INSIGHT_REDDIT_MIN_SCORE", "20")?;
    let reddit_max_age_hours = parse_i64("INSIGHT_REDDIT_MAX_AGE_HOURS", "48")?;
    let reddit_posts_per_subreddit = parse_usize("INSIGHT_REDDIT_POSTS_PER_SUBREDDIT", "25")?;

    let hn_max_results = parse_usize("INSIGHT_HN_MAX_RESULTS", "30")?;
    let hn_min_points = parse_i64("INSIGHT_HN_MIN_POINTS", "50")?;

    let trends_batch_size = parse_usize("INSIGHT_TRENDS_BATCH_SIZE", "5")?;
    let trends_batch_delay_ms = parse_u64("INSIGHT_TRENDS_BATCH_DELAY_MS", "2000")?;
    let trends_min_interval_ms = parse_u64("INSIGHT_TRENDS_MIN_INTERVAL_MS", "1000")?;

    let url_max_redirects = parse_usize("INSIGHT_URL_MAX_REDIRECTS", "5")?;
    let url_max_concurrent = parse_usize("INSIGHT_URL_MAX_CONCURRENT", "10")?;

    let pipeline_enabled = parse_bool("INSIGHT_PIPELINE_ENABLED", "true")?;
    let pipeline_min_score = parse_f64("INSIGHT_PIPELINE_MIN_SCORE", "7.0")?;

    let alert_webhook_url = lookup("INSIGHT_ALERT_WEBHOOK_URL").ok();
    let error_tracker_url = lookup("INSIGHT_ERROR_TRACKER_URL").ok();

    Ok(AppConfig {
        env,
        log_level,
        http_timeout_secs,
        http_user_agent,
        http_max_retries,
        http_backoff_base_ms,
        reddit_client_id,
        reddit_client_secret,
        reddit_user_agent,
        reddit_min_score,
        reddit_max_age_hours,
        reddit_posts_per_subreddit,
        hn_max_results,
        hn_min_points,
        trends_batch_size,
        trends_batch_delay_ms,
        trends_min_interval_ms,
        url_max_redirects,
        url_max_concurrent,
        pipeline_enabled,
        pipeline_min_score,
        alert_webhook_url,
        error_tracker_url,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn parse_environment_production() {
        assert_eq!(parse_environment("production"), Environment::Production);
    }

    #[test]
    fn parse_environment_unknown_defaults_to_development() {
        assert_eq!(parse_environment("unknown"), Environment::Development);
    }

    #[test]
    fn build_app_config_succeeds_with_empty_env() {
        let map: HashMap<&str, &str> = HashMap::new();
        let cfg = build_app_config(lookup_from_map(&map)).expect("defaults should parse");
        assert_eq!(cfg.env, Environment::Development);
        assert_eq!(cfg.http_timeout_secs, 30);
        assert_eq!(cfg.http_max_retries, 3);
        assert_eq!(cfg.http_backoff_base_ms, 1000);
        assert!(cfg.reddit_client_id.is_none());
        assert_eq!(cfg.reddit_min_score, 20);
        assert_eq!(cfg.reddit_max_age_hours, 48);
        assert_eq!(cfg.hn_max_results, 30);
        assert_eq!(cfg.trends_batch_size, 5);
        assert_eq!(cfg.url_max_concurrent, 10);
        assert!(cfg.pipeline_enabled);
        assert!((cfg.pipeline_min_score - 7.0).abs() < f64::EPSILON);
        assert!(cfg.alert_webhook_url.is_none());
    }

    #[test]
    fn build_app_config_reads_overrides() {
        let mut map = HashMap::new();
        map.insert("INSIGHT_HTTP_TIMEOUT_SECS", "10");
        map.insert("INSIGHT_TRENDS_BATCH_SIZE", "3");
        map.insert("REDDIT_CLIENT_ID", "abc");
        map.insert("INSIGHT_PIPELINE_ENABLED", "false");
        let cfg = build_app_config(lookup_from_map(&map)).unwrap();
        assert_eq!(cfg.http_timeout_secs, 10);
        assert_eq!(cfg.trends_batch_size, 3);
        assert_eq!(cfg.reddit_client_id.as_deref(), Some("abc"));
        assert!(!cfg.pipeline_enabled);
    }

    #[test]
    fn build_app_config_rejects_invalid_number() {
        let mut map = HashMap::new();
        map.insert("INSIGHT_HTTP_MAX_RETRIES", "not-a-number");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "INSIGHT_HTTP_MAX_RETRIES"),
            "expected InvalidEnvVar(INSIGHT_HTTP_MAX_RETRIES), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_rejects_invalid_bool() {
        let mut map = HashMap::new();
        map.insert("INSIGHT_PIPELINE_ENABLED", "yes");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "INSIGHT_PIPELINE_ENABLED"),
            "expected InvalidEnvVar(INSIGHT_PIPELINE_ENABLED), got: {result:?}"
        );
    }

    #[test]
    fn build_app_config_rejects_invalid_min_score() {
        let mut map = HashMap::new();
        map.insert("INSIGHT_PIPELINE_MIN_SCORE", "high");
        let result = build_app_config(lookup_from_map(&map));
        assert!(
            matches!(result, Err(ConfigError::InvalidEnvVar { ref var, .. }) if var == "INSIGHT_PIPELINE_MIN_SCORE"),
            "expected InvalidEnvVar(INSIGHT_PIPELINE_MIN_SCORE), got: {result:?}"
        );
    }
}
