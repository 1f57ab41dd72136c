//! Daily driver for the reminder sweep

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tokio::task::JoinHandle;

use crate::config::ReminderConfig;

use super::reminders::ReminderService;

pub struct ReminderScheduler {
    service: ReminderService,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(service: ReminderService, config: ReminderConfig) -> Self {
        Self { service, config }
    }

    /// Spawn the scheduler loop. Returns `None` when reminders are disabled.
    pub fn spawn(self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Reminder scheduler disabled");
            return None;
        }
        Some(tokio::spawn(self.run()))
    }

    async fn run(self) {
        if self.config.run_on_startup {
            tracing::info!("Running startup reminder sweep");
            self.service.run_sweep().await;
        }

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.config.run_at_hour);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::info!(next_run = %next, "Next reminder sweep scheduled");

            tokio::time::sleep(wait).await;
            self.service.run_sweep().await;
        }
    }
}

/// First `hour:00 UTC` strictly after `now`
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(time).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
