//! User settings repository

use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::settings::{NotificationPreferences, UpdateUserSettings, UserSettings},
};

#[derive(Clone)]
pub struct SettingsRepository {
    pool: Pool<Postgres>,
}

impl SettingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Notification preferences; an owner without a settings row gets the defaults
    pub async fn get_preferences(&self, user_id: i32) -> AppResult<NotificationPreferences> {
        let prefs = sqlx::query_as::<_, NotificationPreferences>(
            r#"
            SELECT email_reminders_enabled, email_upcoming_reminders, email_overdue_reminders
            FROM user_settings
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(prefs.unwrap_or_default())
    }

    /// Settings row, created with defaults on first access
    pub async fn get_or_create(&self, user_id: i32) -> AppResult<UserSettings> {
        sqlx::query("INSERT INTO user_settings (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        let settings = sqlx::query_as::<_, UserSettings>("SELECT * FROM user_settings WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(settings)
    }

    /// Apply a partial update, leaving absent fields untouched
    pub async fn update(&self, user_id: i32, update: &UpdateUserSettings) -> AppResult<UserSettings> {
        self.get_or_create(user_id).await?;

        let settings = sqlx::query_as::<_, UserSettings>(
            r#"
            UPDATE user_settings SET
                email_reminders_enabled = COALESCE($2, email_reminders_enabled),
                email_upcoming_reminders = COALESCE($3, email_upcoming_reminders),
                email_overdue_reminders = COALESCE($4, email_overdue_reminders),
                default_lending_days = COALESCE($5, default_lending_days),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(update.email_reminders_enabled)
        .bind(update.email_upcoming_reminders)
        .bind(update.email_overdue_reminders)
        .bind(update.default_lending_days)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }
}
