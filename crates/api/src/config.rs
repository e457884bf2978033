//! Application configuration loaded from environment variables.

use std::time::Duration;

use notifications::{DeliveryMode, NotificationConfig};
use ordering::OrchestratorConfig;

/// Log output format selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Mail sender selected with `MAIL_SENDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailSenderKind {
    /// Logs mails and keeps them in memory.
    #[default]
    Dummy,
    /// Publishes mails to the outbox exchange for a relay.
    Outbox,
}

/// Server and worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL url; in-memory stores when absent
/// - `ORDER_TIMEOUT_SECS`, `EVENT_TIMEOUT_SECS`: per-operation deadlines (10)
/// - `PUBLISH_MAX_ATTEMPTS`: immediate publish attempts (3)
/// - `SHUTDOWN_GRACE_SECS`: time workers get to drain on shutdown (5)
/// - `MAIL_DELIVERY`: `simulated` or `required`
/// - `MAIL_SENDER`: `dummy` or `outbox`
/// - `LEGACY_QUEUES`: also consume the per-family queues (false)
/// - `MAX_REDELIVERIES`: redeliveries before dead-lettering (5)
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub order_timeout: Duration,
    pub event_timeout: Duration,
    pub publish_max_attempts: u32,
    pub shutdown_grace: Duration,
    pub mail_delivery: DeliveryMode,
    pub mail_sender: MailSenderKind,
    pub legacy_queues: bool,
    pub max_redeliveries: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            order_timeout: secs("ORDER_TIMEOUT_SECS", defaults.order_timeout),
            event_timeout: secs("EVENT_TIMEOUT_SECS", defaults.event_timeout),
            publish_max_attempts: parse_or(
                lookup("PUBLISH_MAX_ATTEMPTS"),
                defaults.publish_max_attempts,
            ),
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
            mail_delivery: parse_or(lookup("MAIL_DELIVERY"), defaults.mail_delivery),
            mail_sender: match lookup("MAIL_SENDER").as_deref().map(str::trim) {
                Some("outbox") => MailSenderKind::Outbox,
                _ => MailSenderKind::Dummy,
            },
            legacy_queues: parse_or(lookup("LEGACY_QUEUES"), defaults.legacy_queues),
            max_redeliveries: parse_or(lookup("MAX_REDELIVERIES"), defaults.max_redeliveries),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the order orchestrator.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            order_timeout: self.order_timeout,
            publish_max_attempts: self.publish_max_attempts,
            ..OrchestratorConfig::default()
        }
    }

    /// Settings for the notification service.
    pub fn notifications(&self) -> NotificationConfig {
        NotificationConfig {
            delivery: self.mail_delivery,
            event_timeout: self.event_timeout,
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            order_timeout: Duration::from_secs(10),
            event_timeout: Duration::from_secs(10),
            publish_max_attempts: 3,
            shutdown_grace: Duration::from_secs(5),
            mail_delivery: DeliveryMode::Simulated,
            mail_sender: MailSenderKind::Dummy,
            legacy_queues: false,
            max_redeliveries: 5,
        }
    }
}
