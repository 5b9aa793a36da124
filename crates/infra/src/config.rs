//! Process configuration.
//!
//! Built once at startup (`FirelancerConfig::from_env`), adjusted by plugins
//! via `Plugin::configure`, then passed by reference to whatever needs it.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use firelancer_job_posts::JobPostProcess;

use crate::job_queue::{BackoffStrategy, JobQueueServiceConfig, PollingConfig};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub jwt_secret: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            jwt_secret: "dev-secret".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DbConfig {
    /// `None` runs every adapter in memory.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobQueueConfig {
    pub service: JobQueueServiceConfig,
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct JobPostsConfig {
    pub process: JobPostProcess,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Hold index updates in a buffer until flushed.
    pub buffer_updates: bool,
    /// Longer terms use full-text matching, shorter ones a substring match.
    pub min_term_length: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            buffer_updates: false,
            min_term_length: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FirelancerConfig {
    pub api: ApiConfig,
    pub db: DbConfig,
    pub job_queue: JobQueueConfig,
    pub job_posts: JobPostsConfig,
    pub search: SearchConfig,
}

impl FirelancerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = FirelancerConfig::default();

        if let Some(bind) = get("FIRELANCER_BIND") {
            config.api.bind = bind;
        }
        match get("JWT_SECRET") {
            Some(secret) => config.api.jwt_secret = secret,
            None => warn!("JWT_SECRET not set; using insecure dev default"),
        }

        config.db.url = get("DATABASE_URL");

        config.job_queue.service.prefix = get("FIRELANCER_QUEUE_PREFIX");
        if let Some(list) = get("FIRELANCER_ACTIVE_QUEUES") {
            config.job_queue.service.active_queues = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(ms) = get("FIRELANCER_POLL_INTERVAL_MS") {
            let ms = parse_u64("FIRELANCER_POLL_INTERVAL_MS", &ms)?;
            config.job_queue.polling.poll_interval = Duration::from_millis(ms);
        }
        if let Some(n) = get("FIRELANCER_QUEUE_CONCURRENCY") {
            let n = parse_u64("FIRELANCER_QUEUE_CONCURRENCY", &n)?;
            config.job_queue.polling = config.job_queue.polling.clone().with_concurrency(n as usize);
        }
        if let Some(strategy) = get("FIRELANCER_RETRY_BACKOFF") {
            config.job_queue.polling.retry_policy.strategy = strategy
                .parse::<BackoffStrategy>()
                .map_err(|e| invalid("FIRELANCER_RETRY_BACKOFF", e))?;
        }
        if let Some(ms) = get("FIRELANCER_RETRY_BASE_DELAY_MS") {
            let ms = parse_u64("FIRELANCER_RETRY_BASE_DELAY_MS", &ms)?;
            config.job_queue.polling.retry_policy.base_delay = Duration::from_millis(ms);
        }

        if let Some(flag) = get("FIRELANCER_SKIP_MODERATION") {
            if parse_bool("FIRELANCER_SKIP_MODERATION", &flag)? {
                config.job_posts.process = JobPostProcess::without_moderation();
            }
        }

        if let Some(flag) = get("FIRELANCER_SEARCH_BUFFER") {
            config.search.buffer_updates = parse_bool("FIRELANCER_SEARCH_BUFFER", &flag)?;
        }

        Ok(config)
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| invalid(key, format!("expected an integer, got {value:?}")))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, format!("expected a boolean, got {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use firelancer_job_posts::JobPostState;

    fn load(vars: &[(&str, &str)]) -> Result<FirelancerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        FirelancerConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_run_everything_in_memory() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api.bind, "0.0.0.0:3000");
        assert!(config.db.url.is_none());
        assert!(config.job_queue.service.active_queues.is_empty());
        assert!(!config.search.buffer_updates);
        assert_eq!(config.search.min_term_length, 2);
        assert!(
            config
                .job_posts
                .process
                .can_transition(JobPostState::Draft, JobPostState::Requested)
        );
    }

    #[test]
    fn env_values_override_defaults() {
        let config = load(&[
            ("FIRELANCER_QUEUE_PREFIX", "staging-"),
            ("FIRELANCER_ACTIVE_QUEUES", "update-search-index, apply-collection-filters,"),
            ("FIRELANCER_QUEUE_CONCURRENCY", "4"),
            ("FIRELANCER_RETRY_BACKOFF", "linear"),
            ("FIRELANCER_SKIP_MODERATION", "true"),
            ("FIRELANCER_SEARCH_BUFFER", "yes"),
            ("DATABASE_URL", "postgres://localhost/firelancer"),
        ])
        .unwrap();

        assert_eq!(config.job_queue.service.prefix.as_deref(), Some("staging-"));
        assert_eq!(
            config.job_queue.service.active_queues,
            vec!["update-search-index", "apply-collection-filters"]
        );
        assert_eq!(config.job_queue.polling.concurrency, 4);
        assert_eq!(config.job_queue.polling.retry_policy.strategy, BackoffStrategy::Linear);
        assert_eq!(config.job_posts.process, JobPostProcess::without_moderation());
        assert!(config.search.buffer_updates);
        assert!(config.db.url.is_some());
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = load(&[("FIRELANCER_SEARCH_BUFFER", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "FIRELANCER_SEARCH_BUFFER", .. }));
        assert!(load(&[("FIRELANCER_POLL_INTERVAL_MS", "soon")]).is_err());
    }
}
