//! Per-user settings, including email notification preferences

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// The subset of user settings the reminder sweep consults.
///
/// A missing settings row behaves exactly like `Default` (everything enabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NotificationPreferences {
    pub email_reminders_enabled: bool,
    pub email_upcoming_reminders: bool,
    pub email_overdue_reminders: bool,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_reminders_enabled: true,
            email_upcoming_reminders: true,
            email_overdue_reminders: true,
        }
    }
}

impl NotificationPreferences {
    pub fn wants_upcoming(&self) -> bool {
        self.email_reminders_enabled && self.email_upcoming_reminders
    }

    pub fn wants_overdue(&self) -> bool {
        self.email_reminders_enabled && self.email_overdue_reminders
    }
}

/// Full settings row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSettings {
    pub user_id: i32,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub notifications: NotificationPreferences,
    pub default_lending_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial settings update; absent fields are left untouched
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserSettings {
    pub email_reminders_enabled: Option<bool>,
    pub email_upcoming_reminders: Option<bool>,
    pub email_overdue_reminders: Option<bool>,
    #[validate(range(min = 1, max = 365, message = "Lending period must be 1-365 days"))]
    pub default_lending_days: Option<i32>,
}
