//! Business logic services

pub mod books;
pub mod email;
pub mod loans;
pub mod notifier;
pub mod reminders;
pub mod scheduler;
pub mod settings;
pub mod templates;

use std::sync::Arc;

use crate::{
    config::{EmailConfig, ReminderConfig},
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub books: books::BooksService,
    pub loans: loans::LoansService,
    pub settings: settings::SettingsService,
    pub reminders: reminders::ReminderService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, email_config: EmailConfig, reminder_config: &ReminderConfig) -> Self {
        let reminders = reminders::ReminderService::new(
            Arc::new(repository.clone()),
            Arc::new(email::EmailService::new(email_config)),
            reminders::ReminderPolicy::from(reminder_config),
        );

        Self {
            books: books::BooksService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone()),
            settings: settings::SettingsService::new(repository),
            reminders,
        }
    }
}
