// Queue configuration, resolved once at boot

use crate::application::registry::JobRegistry;
use crate::domain::catalog::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, STANDARD_QUEUES};
use crate::domain::RetryPolicy;
use crate::error::{AppError, Result};
use std::collections::BTreeMap;
use std::fmt;

pub const ENV_QUEUE_URL: &str = "CONDUCTOR_QUEUE_URL";
pub const ENV_DISABLE_QUEUES: &str = "CONDUCTOR_DISABLE_QUEUES";
pub const ENV_ALLOW_DEGRADED: &str = "CONDUCTOR_ALLOW_DEGRADED";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "CONDUCTOR_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "CONDUCTOR_RETRY_BASE_DELAY_MS";
pub const ENV_CONCURRENCY_PREFIX: &str = "CONDUCTOR_CONCURRENCY_";
pub const ENV_REFERENCE_SERVICES: &str = "CONDUCTOR_REFERENCE_SERVICES";

/// Why jobs will not be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// `CONDUCTOR_DISABLE_QUEUES=true`
    Disabled,
    /// No durable endpoint configured
    NotConfigured,
    /// Endpoint configured but unreachable, degraded mode allowed
    Unreachable,
}

impl fmt::Display for NoopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoopReason::Disabled => write!(f, "queues disabled by configuration"),
            NoopReason::NotConfigured => write!(f, "no durable queue backend configured"),
            NoopReason::Unreachable => write!(f, "durable queue backend unreachable"),
        }
    }
}

/// Which queue backend the process runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelection {
    Durable { url: String, allow_degraded: bool },
    Noop(NoopReason),
}

/// Queue settings from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    pub queue_url: Option<String>,
    pub disable_queues: bool,
    pub allow_degraded: bool,
    pub retry_max_attempts: i32,
    pub retry_base_delay_ms: i64,
    /// queue name -> concurrency
    pub concurrency_overrides: BTreeMap<String, usize>,
    /// Run export, notification, scoring and recommendation jobs against the
    /// bookkeeping-only reference services
    pub reference_services: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            queue_url: None,
            disable_queues: false,
            allow_degraded: false,
            retry_max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            concurrency_overrides: BTreeMap::new(),
            reference_services: false,
        }
    }
}

impl QueueSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Self {
            queue_url: get(ENV_QUEUE_URL),
            ..Self::default()
        };

        if let Some(v) = get(ENV_DISABLE_QUEUES) {
            settings.disable_queues = parse_bool(ENV_DISABLE_QUEUES, &v)?;
        }
        if let Some(v) = get(ENV_ALLOW_DEGRADED) {
            settings.allow_degraded = parse_bool(ENV_ALLOW_DEGRADED, &v)?;
        }
        if let Some(v) = get(ENV_REFERENCE_SERVICES) {
            settings.reference_services = parse_bool(ENV_REFERENCE_SERVICES, &v)?;
        }
        if let Some(v) = get(ENV_RETRY_MAX_ATTEMPTS) {
            let n: i32 = parse_num(ENV_RETRY_MAX_ATTEMPTS, &v)?;
            if n < 1 {
                return Err(AppError::Config(format!(
                    "{} must be >= 1 (got {})",
                    ENV_RETRY_MAX_ATTEMPTS, n
                )));
            }
            settings.retry_max_attempts = n;
        }
        if let Some(v) = get(ENV_RETRY_BASE_DELAY_MS) {
            let n: i64 = parse_num(ENV_RETRY_BASE_DELAY_MS, &v)?;
            if n < 0 {
                return Err(AppError::Config(format!(
                    "{} must not be negative (got {})",
                    ENV_RETRY_BASE_DELAY_MS, n
                )));
            }
            settings.retry_base_delay_ms = n;
        }
        for (queue, _) in STANDARD_QUEUES {
            let key = format!("{}{}", ENV_CONCURRENCY_PREFIX, queue.to_uppercase());
            if let Some(v) = get(&key) {
                let n: usize = parse_num(&key, &v)?;
                settings.concurrency_overrides.insert(queue.to_string(), n);
            }
        }

        Ok(settings)
    }

    /// Backend choice before any connection attempt
    pub fn backend_selection(&self) -> BackendSelection {
        if self.disable_queues {
            return BackendSelection::Noop(NoopReason::Disabled);
        }
        match &self.queue_url {
            Some(url) => BackendSelection::Durable {
                url: url.clone(),
                allow_degraded: self.allow_degraded,
            },
            None => BackendSelection::Noop(NoopReason::NotConfigured),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.retry_max_attempts, self.retry_base_delay_ms)
    }

    /// Standard catalog with this configuration applied
    pub fn registry(&self) -> Result<JobRegistry> {
        let mut builder = JobRegistry::standard_builder().retry_policy(self.retry_policy());
        for (queue, concurrency) in &self.concurrency_overrides {
            builder = builder.concurrency(queue.clone(), *concurrency);
        }
        builder.build()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::Config(format!(
            "{} must be a boolean (got '{}')",
            key, other
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| AppError::Config(format!("{} must be a number (got '{}')", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<QueueSettings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        QueueSettings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_url_select_noop() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, QueueSettings::default());
        assert_eq!(
            s.backend_selection(),
            BackendSelection::Noop(NoopReason::NotConfigured)
        );
    }

    #[test]
    fn test_url_selects_durable() {
        let s = settings(&[(ENV_QUEUE_URL, "sqlite:///tmp/q.db")]).unwrap();
        assert_eq!(
            s.backend_selection(),
            BackendSelection::Durable {
                url: "sqlite:///tmp/q.db".to_string(),
                allow_degraded: false
            }
        );
    }

    #[test]
    fn test_disable_flag_wins_over_url() {
        let s = settings(&[
            (ENV_QUEUE_URL, "sqlite:///tmp/q.db"),
            (ENV_DISABLE_QUEUES, "true"),
        ])
        .unwrap();
        assert_eq!(s.backend_selection(), BackendSelection::Noop(NoopReason::Disabled));
    }

    #[test]
    fn test_blank_url_is_not_configured() {
        let s = settings(&[(ENV_QUEUE_URL, "   ")]).unwrap();
        assert_eq!(s.queue_url, None);
    }

    #[test]
    fn test_retry_and_concurrency_overrides() {
        let s = settings(&[
            (ENV_RETRY_MAX_ATTEMPTS, "5"),
            (ENV_RETRY_BASE_DELAY_MS, "250"),
            ("CONDUCTOR_CONCURRENCY_NOTIFICATION", "10"),
        ])
        .unwrap();

        let registry = s.registry().unwrap();
        assert_eq!(registry.retry_policy().max_attempts, 5);
        assert_eq!(registry.retry_policy().base_delay_ms(), 250);
        assert_eq!(registry.queue("notification").unwrap().concurrency, 10);
        assert_eq!(registry.queue("export").unwrap().concurrency, 2);
    }

    #[test]
    fn test_reference_services_are_opt_in() {
        assert!(!settings(&[]).unwrap().reference_services);
        assert!(settings(&[(ENV_REFERENCE_SERVICES, "true")])
            .unwrap()
            .reference_services);
        assert!(matches!(
            settings(&[(ENV_REFERENCE_SERVICES, "sometimes")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            settings(&[(ENV_DISABLE_QUEUES, "maybe")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            settings(&[(ENV_RETRY_MAX_ATTEMPTS, "0")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            settings(&[("CONDUCTOR_CONCURRENCY_EXPORT", "lots")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected_by_registry() {
        let s = settings(&[("CONDUCTOR_CONCURRENCY_SCORING", "0")]).unwrap();
        assert!(matches!(s.registry(), Err(AppError::Config(_))));
    }
}
