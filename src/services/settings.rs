//! Per-user settings service

use validator::Validate;

use crate::{
    error::AppResult,
    models::settings::{UpdateUserSettings, UserSettings},
    repository::Repository,
};

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
}

impl SettingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Current settings, created with defaults on first access
    pub async fn get_settings(&self, user_id: i32) -> AppResult<UserSettings> {
        self.repository.settings.get_or_create(user_id).await
    }

    /// Apply a partial update
    pub async fn update_settings(&self, user_id: i32, update: UpdateUserSettings) -> AppResult<UserSettings> {
        update.validate()?;
        let settings = self.repository.settings.update(user_id, &update).await?;
        tracing::info!(user_id, "Notification settings updated");
        Ok(settings)
    }
}
