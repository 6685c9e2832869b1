use serde::Deserialize;
use std::env;

pub use config::ConfigError;

// Root configuration container
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub booking: BookingConfig,
    pub sweeper: SweeperConfig,
    pub notification: NotificationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `text` or `json`
    pub log_format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory store.
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub quote_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// How long a soft hold lives before it expires.
    pub hold_minutes: i64,
    pub reservation_prefix: String,
    pub currency: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_minutes: 180,
            reservation_prefix: "TRV".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

impl BookingConfig {
    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hold_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub batch_size: i64,
    pub reminder_window_minutes: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 300,
            batch_size: 100,
            reminder_window_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Without a webhook, lifecycle events are only logged.
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Config {
    /// Defaults, then `BOOKING__SECTION__KEY` variables, then the conventional
    /// bare variables (`DATABASE_URL`, `REDIS_URL`, `PORT`, `RUST_LOG`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(
                config::Environment::with_prefix("BOOKING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", env::var("REDIS_URL").ok())?
            .set_override_option("app.port", env::var("PORT").ok())?
            .set_override_option("app.rust_log", env::var("RUST_LOG").ok())?
            .set_override_option("app.log_format", env::var("LOG_FORMAT").ok())?
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let booking = BookingConfig::default();
        let sweeper = SweeperConfig::default();

        config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000_i64)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "travel_booking=debug,tower_http=debug")?
            .set_default("app.log_format", "text")?
            .set_default("database.pool_size", 20_i64)?
            .set_default("redis.quote_ttl_seconds", 600_i64)?
            .set_default("booking.hold_minutes", booking.hold_minutes)?
            .set_default("booking.reservation_prefix", booking.reservation_prefix)?
            .set_default("booking.currency", booking.currency)?
            .set_default("sweeper.enabled", sweeper.enabled)?
            .set_default("sweeper.interval_seconds", sweeper.interval_seconds as i64)?
            .set_default("sweeper.batch_size", sweeper.batch_size)?
            .set_default("sweeper.reminder_window_minutes", sweeper.reminder_window_minutes)?
            .set_default("notification.timeout_seconds", 10_i64)?
            .set_default("circuit_breaker.failure_threshold", 5_i64)?
            .set_default("circuit_breaker.timeout_seconds", 60_i64)
    }

    pub fn is_json_logging(&self) -> bool {
        self.app.log_format.eq_ignore_ascii_case("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize_without_environment() {
        let config: Config = Config::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.app.port, 8000);
        assert_eq!(config.booking.hold_minutes, 180);
        assert_eq!(config.booking.reservation_prefix, "TRV");
        assert_eq!(config.sweeper.batch_size, 100);
        assert!(config.database.url.is_none());
        assert!(config.notification.webhook_url.is_none());
        assert!(!config.is_json_logging());
    }

    #[test]
    fn hold_duration_is_three_hours_by_default() {
        assert_eq!(BookingConfig::default().hold_duration(), chrono::Duration::hours(3));
    }
}
