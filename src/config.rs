use std::str::FromStr;

/// Runtime configuration for the ingest service
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub bind_address: String,
    pub database_url: Option<String>,
    /// How many of a user's latest sessions the linker inspects
    pub recent_user_session_limit: usize,
    /// How many of the globally latest sessions the post-persist linker inspects
    pub recent_global_session_limit: usize,
    /// Fallback match length used when `startUtc` is missing
    pub default_match_duration_minutes: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            database_url: None,
            recent_user_session_limit: 20,
            recent_global_session_limit: 30,
            default_match_duration_minutes: 5,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset or unparseable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            recent_user_session_limit: parse_or(
                &lookup,
                "RECENT_USER_SESSION_LIMIT",
                defaults.recent_user_session_limit,
            ),
            recent_global_session_limit: parse_or(
                &lookup,
                "RECENT_GLOBAL_SESSION_LIMIT",
                defaults.recent_global_session_limit,
            ),
            default_match_duration_minutes: parse_or(
                &lookup,
                "MATCH_DEFAULT_DURATION_MINUTES",
                defaults.default_match_duration_minutes,
            ),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}
