use std::env;

/// Runtime configuration, loaded once at process start from the environment
/// (§6 "Environment variables"). Fields without a documented default panic
/// at startup via [`required_env`] so misconfiguration fails fast rather than
/// surfacing as a confusing downstream error.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_url: Option<String>,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub rate_limit_per_minute: u32,
    pub max_content_length_bytes: usize,
    pub quality_threshold: f64,
    pub auto_trigger_threshold: u32,
    pub worker_concurrency: usize,
    pub scheduler_tick_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        let config = Self {
            database_url: required_env("DATABASE_URL"),
            queue_url: env::var("QUEUE_URL").ok(),
            user_agent: env::var("USER_AGENT")
                .unwrap_or_else(|_| "sentryfeed/0.1 (+https://example.invalid/bot)".to_string()),
            request_timeout_seconds: parse_env_or("REQUEST_TIMEOUT", 30),
            rate_limit_per_minute: parse_env_or("RATE_LIMIT_PER_MINUTE", 20),
            max_content_length_bytes: parse_env_or("MAX_CONTENT_LENGTH", 5 * 1024 * 1024),
            quality_threshold: parse_env_or("QUALITY_THRESHOLD", 0.3),
            auto_trigger_threshold: parse_env_or("AUTO_TRIGGER_THRESHOLD", 80),
            worker_concurrency: parse_env_or("WORKER_CONCURRENCY", 4),
            scheduler_tick_seconds: parse_env_or("SCHEDULER_TICK_SECONDS", 30),
        };
        config.log_redacted();
        config
    }

    /// Logs which sensitive fields are set, never their values.
    pub fn log_redacted(&self) {
        tracing::info!(
            database_url_len = self.database_url.len(),
            queue_url = self.queue_url.is_some(),
            user_agent = %self.user_agent,
            request_timeout_seconds = self.request_timeout_seconds,
            rate_limit_per_minute = self.rate_limit_per_minute,
            quality_threshold = self.quality_threshold,
            auto_trigger_threshold = self.auto_trigger_threshold,
            worker_concurrency = self.worker_concurrency,
            scheduler_tick_seconds = self.scheduler_tick_seconds,
            "config loaded"
        );
    }
}

/// Reads a required environment variable, panicking with a clear message if absent.
pub fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_or_falls_back_to_default_when_unset() {
        env::remove_var("SENTRYFEED_TEST_UNSET_VAR");
        let value: u64 = parse_env_or("SENTRYFEED_TEST_UNSET_VAR", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_env_or_uses_parsed_value_when_set() {
        env::set_var("SENTRYFEED_TEST_SET_VAR", "7");
        let value: u64 = parse_env_or("SENTRYFEED_TEST_SET_VAR", 42);
        assert_eq!(value, 7);
        env::remove_var("SENTRYFEED_TEST_SET_VAR");
    }
}
