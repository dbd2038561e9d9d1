use anyhow::{bail, Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::consumer::ConsumerConfig;
use crate::messaging::TopicNames;
use crate::utils::{RetryConfig, MIN_MULTIPLIER};

// ============================================================================
// Application Configuration
// ============================================================================
//
// Every setting comes from the environment (optionally seeded from a `.env`
// file) and has a default, so a bare `cargo run` against a local Redpanda
// works out of the box.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bootstrap_servers: String,
    pub topics: TopicNames,
    pub consumer_group: String,
    /// When false the service runs with a no-op publisher
    pub publishing_enabled: bool,
    /// Reject (rather than log) events that fail validation
    pub strict_validation: bool,
    pub publish: PublishConfig,
    pub consumer: ConsumerConfig,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl PublishConfig {
    pub fn retry(&self) -> RetryConfig {
        RetryConfig::publishing(self.max_retries, self.initial_delay, self.multiplier)
    }
}

impl AppConfig {
    /// Load from the process environment after reading `.env`, if present
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let publish = PublishConfig {
            max_retries: parse(&lookup, "EVENT_PUBLISH_MAX_RETRIES", 3)?,
            initial_delay: Duration::from_millis(parse(&lookup, "EVENT_RETRY_INITIAL_DELAY_MS", 1000)?),
            multiplier: parse(&lookup, "EVENT_RETRY_MULTIPLIER", 2.0)?,
        };
        if publish.multiplier < MIN_MULTIPLIER {
            bail!(
                "EVENT_RETRY_MULTIPLIER must be at least {}, got {}",
                MIN_MULTIPLIER,
                publish.multiplier
            );
        }

        let max_in_flight: usize = parse(&lookup, "CONSUMER_MAX_IN_FLIGHT", 10)?;
        if max_in_flight == 0 {
            bail!("CONSUMER_MAX_IN_FLIGHT must be positive");
        }
        let consumer = ConsumerConfig {
            max_redeliveries: parse(&lookup, "CONSUMER_MAX_REDELIVERIES", 5)?,
            max_in_flight,
            ..ConsumerConfig::default()
        };

        Ok(Self {
            bootstrap_servers: text("KAFKA_BOOTSTRAP_SERVERS", "127.0.0.1:9092"),
            topics: TopicNames {
                patient_events: text("KAFKA_TOPIC_PATIENT_EVENTS", "patient-events"),
                dead_letter: text("KAFKA_TOPIC_PATIENT_EVENTS_DLQ", "patient-events-dlq"),
                audit: text("KAFKA_TOPIC_AUDIT_EVENTS", "audit-events"),
            },
            consumer_group: text("KAFKA_CONSUMER_GROUP", "patients-service"),
            publishing_enabled: parse(&lookup, "EVENT_PUBLISHING_ENABLED", true)?,
            strict_validation: parse(&lookup, "EVENT_STRICT_VALIDATION", true)?,
            publish,
            consumer,
            metrics_port: parse(&lookup, "METRICS_PORT", 9090)?,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bootstrap_servers, "127.0.0.1:9092");
        assert_eq!(config.topics.patient_events, "patient-events");
        assert_eq!(config.topics.dead_letter, "patient-events-dlq");
        assert_eq!(config.topics.audit, "audit-events");
        assert_eq!(config.consumer_group, "patients-service");
        assert!(config.publishing_enabled);
        assert!(config.strict_validation);
        assert_eq!(
            config.publish,
            PublishConfig {
                max_retries: 3,
                initial_delay: Duration::from_millis(1000),
                multiplier: 2.0,
            }
        );
        assert_eq!(config.consumer.max_redeliveries, 5);
        assert_eq!(config.consumer.max_in_flight, 10);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("KAFKA_BOOTSTRAP_SERVERS", "redpanda:29092"),
            ("EVENT_PUBLISHING_ENABLED", "false"),
            ("EVENT_PUBLISH_MAX_RETRIES", "5"),
            ("EVENT_RETRY_MULTIPLIER", "3.5"),
            ("CONSUMER_MAX_IN_FLIGHT", " 4 "),
        ])
        .unwrap();

        assert_eq!(config.bootstrap_servers, "redpanda:29092");
        assert!(!config.publishing_enabled);
        assert_eq!(config.publish.max_retries, 5);
        assert_eq!(config.publish.multiplier, 3.5);
        assert_eq!(config.consumer.max_in_flight, 4);
        assert_eq!(config.publish.retry().max_attempts, 6);
    }

    #[test]
    fn test_multiplier_below_two_is_rejected() {
        let err = load(&[("EVENT_RETRY_MULTIPLIER", "1.5")]).unwrap_err();
        assert!(err.to_string().contains("EVENT_RETRY_MULTIPLIER"));
    }

    #[test]
    fn test_unparseable_value_names_the_key() {
        let err = load(&[("METRICS_PORT", "ninety")]).unwrap_err();
        assert!(err.to_string().contains("METRICS_PORT"));

        assert!(load(&[("CONSUMER_MAX_IN_FLIGHT", "0")]).is_err());
    }
}
