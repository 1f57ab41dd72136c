//! Data models for BookLend

pub mod book;
pub mod loan;
pub mod reminder;
pub mod settings;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use loan::{Loan, LoanDetails, ReminderCandidate};
pub use reminder::{LoanNotice, OverdueItem, ReminderKind, SweepReport};
pub use settings::{NotificationPreferences, UserSettings};
pub use user::{Role, UserClaims};
