use chrono::Duration as ChronoDuration;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SweeperConfig;
use crate::models::RequestContext;
use crate::services::booking::BookingService;
use crate::services::notification::{self, NotificationEvent, NotificationGateway, NotificationKind};
use crate::store::BookingStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Overdue SOFT holds found by the scan.
    pub scanned: usize,
    pub cancelled: usize,
    /// Already handled by someone else (user, another sweeper, lazy expiry).
    pub skipped: usize,
    pub failed: usize,
    pub reminders: usize,
}

/// Cancels overdue soft holds through the regular cancellation path and sends
/// one reminder per hold that is about to run out.
///
/// Safe to run concurrently with itself and with user traffic: each booking
/// is re-checked under its row lock before anything is released.
pub struct ExpirationSweeper {
    store: Arc<dyn BookingStore>,
    bookings: Arc<BookingService>,
    notifier: Arc<dyn NotificationGateway>,
    config: SweeperConfig,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn BookingStore>,
        bookings: Arc<BookingService>,
        notifier: Arc<dyn NotificationGateway>,
        config: SweeperConfig,
    ) -> Self {
        Self { store, bookings, notifier, config }
    }

    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        self.expire_overdue_holds(&mut report).await;
        self.send_reminders(&mut report).await;

        if report.scanned > 0 || report.reminders > 0 {
            info!(
                "🧹 Sweep done: {} scanned, {} cancelled, {} skipped, {} failed, {} reminders",
                report.scanned, report.cancelled, report.skipped, report.failed, report.reminders
            );
        } else {
            debug!("🧹 Sweep done: nothing to do");
        }
        report
    }

    async fn expire_overdue_holds(&self, report: &mut SweepReport) {
        let ctx = RequestContext::system("sweeper");
        let now = self.bookings.now();
        let batch_size = self.config.batch_size.max(1);
        let mut cursor: Option<Uuid> = None;

        loop {
            let batch = match self.store.expired_soft_bookings(now, cursor, batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!("Failed to scan for expired holds: {}", e);
                    return;
                }
            };
            let Some(last) = batch.last().copied() else {
                return;
            };
            report.scanned += batch.len();

            for booking_id in &batch {
                match self.bookings.expire_hold(*booking_id, &ctx).await {
                    Ok(Some(_)) => report.cancelled += 1,
                    Ok(None) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        error!("Failed to expire booking {}: {}", booking_id, e);
                    }
                }
            }

            if (batch.len() as i64) < batch_size {
                return;
            }
            cursor = Some(last);
        }
    }

    async fn send_reminders(&self, report: &mut SweepReport) {
        if self.config.reminder_window_minutes <= 0 {
            return;
        }
        let now = self.bookings.now();
        let until = now + ChronoDuration::minutes(self.config.reminder_window_minutes);

        let due = match self.store.bookings_due_for_reminder(now, until, self.config.batch_size.max(1)).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to scan for reminder candidates: {}", e);
                return;
            }
        };

        for booking in due {
            match self.store.mark_reminder_sent(booking.id, now).await {
                Ok(true) => {
                    report.reminders += 1;
                    let event = NotificationEvent::new(NotificationKind::Reminder, booking);
                    notification::dispatch(self.notifier.clone(), event);
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to mark reminder for booking {}: {}", booking.id, e),
            }
        }
    }

    /// Runs [`Self::run_once`] on a fixed interval until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.interval_seconds.max(1));
        info!("🧹 Expiration sweeper started, every {:?}", period);

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
