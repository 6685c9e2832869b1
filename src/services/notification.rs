//! Notification gateway client.
//!
//! The booking engine hands lifecycle events to a [`NotificationGateway`]
//! after the transaction has committed. Delivery is fire-and-forget: a slow
//! or dead channel is logged and never reaches the caller.
//!
//! 1.  **CircuitBreaker**: stops hammering the webhook once it keeps failing
//!     and probes it again after a cool-down.
//! 2.  **HttpNotificationGateway**: POSTs `{type, booking, reason}` to the
//!     configured webhook through the breaker.
//! 3.  **LogNotificationGateway**: used when no webhook is configured.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::{CircuitBreakerConfig, NotificationConfig};
use crate::models::Booking;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    Confirmation,
    Cancellation,
    Modification,
    PaymentReceived,
    Reminder,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub booking: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, booking: Booking) -> Self {
        Self { kind, booking, reason: None }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("circuit breaker is open - notification channel temporarily unavailable")]
    CircuitOpen,

    #[error("notification transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification webhook rejected the event with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError>;
}

/// Sends the event on a background task. Errors are logged and dropped.
pub fn dispatch(gateway: Arc<dyn NotificationGateway>, event: NotificationEvent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let booking_code = event.booking.reservation_code.clone();
        if let Err(e) = gateway.notify(&event).await {
            warn!("Notification {:?} for booking {} failed: {}", event.kind, booking_code, e);
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Too many consecutive failures; requests are refused until the timeout passes.
    Open,
    /// Cool-down elapsed; the next request is a probe.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    failure_threshold: u32,
    timeout_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            failure_threshold: failure_threshold.max(1),
            timeout_duration: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, config.timeout_seconds)
    }

    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock().unwrap_or_else(|p| p.into_inner());
                let cooled_down = opened_at.map_or(true, |at| at.elapsed() >= self.timeout_duration);
                if cooled_down {
                    *self.state.write().unwrap_or_else(|p| p.into_inner()) = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
        if *state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());

        let trip = match *state {
            CircuitState::Closed => failures >= self.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };
        if trip {
            if *state == CircuitState::HalfOpen {
                warn!("Circuit breaker probe failed - returning to Open state");
            } else {
                error!("Circuit breaker OPENED - {} failures reached threshold {}", failures, self.failure_threshold);
            }
            *state = CircuitState::Open;
            *self.opened_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }
}

pub struct HttpNotificationGateway {
    webhook_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpNotificationGateway {
    pub fn new(
        webhook_url: impl Into<String>,
        timeout: Duration,
        circuit_breaker: CircuitBreaker,
    ) -> Result<Self, NotificationError> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            http_client: reqwest::Client::builder().timeout(timeout).build()?,
            circuit_breaker: Arc::new(circuit_breaker),
        })
    }

    /// `None` when no webhook is configured.
    pub fn from_config(
        config: &NotificationConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Option<Self>, NotificationError> {
        match &config.webhook_url {
            Some(url) => Self::new(
                url.clone(),
                Duration::from_secs(config.timeout_seconds),
                CircuitBreaker::from_config(breaker),
            )
            .map(Some),
            None => Ok(None),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn post(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        let response = self.http_client.post(&self.webhook_url).json(event).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotificationError::Rejected(status.as_u16()))
        }
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - dropping {:?} notification", event.kind);
            return Err(NotificationError::CircuitOpen);
        }

        match self.post(event).await {
            Ok(()) => {
                self.circuit_breaker.record_success();
                info!("📨 {:?} notification sent for {}", event.kind, event.booking.reservation_code);
                Ok(())
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(e)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationGateway;

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn notify(&self, event: &NotificationEvent) -> Result<(), NotificationError> {
        info!(
            "📨 {:?} for booking {} ({}){}",
            event.kind,
            event.booking.reservation_code,
            event.booking.status,
            event.reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_at_threshold_and_recovers() {
        let breaker = CircuitBreaker::new(2, 0);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // zero cool-down: the next call is a probe
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, 3_600);
        breaker.record_failure();
        assert!(!breaker.can_execute());

        *breaker.state.write().unwrap() = CircuitState::HalfOpen;
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let kind = serde_json::to_value(NotificationKind::PaymentReceived).unwrap();
        assert_eq!(kind, serde_json::json!("PAYMENT_RECEIVED"));
    }
}
