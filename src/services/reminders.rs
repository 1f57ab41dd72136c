//! Reminder sweep: finds loans that need a reminder and emails their owners.
//!
//! A sweep has two independent phases:
//!
//! - **Upcoming**: active loans due exactly `upcoming_days` calendar days from now get a
//!   single-loan reminder each.
//! - **Overdue**: active loans whose due date is before today are grouped per owner and
//!   sent as one digest per owner.
//!
//! Both phases share the loan's `last_reminder_sent_at` as cooldown marker. It is only
//! written after the notifier reported success, so a failed send is retried on a later
//! sweep once the cooldown allows it, and a repeated sweep never sends twice.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    config::ReminderConfig,
    error::AppResult,
    models::{
        reminder::days_until_due, Loan, LoanNotice, NotificationPreferences, OverdueItem,
        ReminderCandidate, ReminderKind, SweepReport,
    },
};

use super::notifier::Notifier;

/// Read/write access to loans the sweep depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Active loans whose due date (UTC calendar day) is `date`
    async fn list_active_loans_due_on(&self, date: NaiveDate) -> AppResult<Vec<ReminderCandidate>>;

    /// Active loans whose due date is strictly before `as_of`, ordered by owner then due date
    async fn list_active_overdue_loans(&self, as_of: NaiveDate) -> AppResult<Vec<ReminderCandidate>>;

    /// Owner preferences, defaulted when the owner never saved any
    async fn get_owner_preferences(&self, owner_id: i32) -> AppResult<NotificationPreferences>;

    /// Set `last_reminder_sent_at = at` if the loan is still active and was not reminded
    /// after `not_after`. Returns whether the loan was updated.
    async fn mark_reminder_sent(
        &self,
        loan_id: i32,
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Same as `mark_reminder_sent` for several loans, all or nothing.
    /// Returns `loan_ids.len()` when every loan was updated, 0 otherwise.
    async fn mark_reminders_sent_batch(
        &self,
        loan_ids: &[i32],
        at: DateTime<Utc>,
        not_after: DateTime<Utc>,
    ) -> AppResult<u64>;
}

/// Timing rules of the sweep
#[derive(Debug, Clone, Copy)]
pub struct ReminderPolicy {
    pub upcoming_days: i64,
    pub cooldown: Duration,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            upcoming_days: 3,
            cooldown: Duration::hours(24),
        }
    }
}

impl From<&ReminderConfig> for ReminderPolicy {
    fn from(config: &ReminderConfig) -> Self {
        Self {
            upcoming_days: config.upcoming_days,
            cooldown: Duration::hours(config.cooldown_hours),
        }
    }
}

impl ReminderPolicy {
    /// Latest reminder time that still lets a loan be reminded again at `now`
    fn cooldown_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.cooldown
    }

    fn cooled_down(&self, loan: &Loan, now: DateTime<Utc>) -> bool {
        loan.last_reminder_sent_at
            .map(|sent| sent < self.cooldown_cutoff(now))
            .unwrap_or(true)
    }
}

/// Time recorded as a reminder for loans lent at `lent_at`. A loan created after
/// the sweep started gets its creation time, keeping `last_reminder_sent_at >= lent_at`.
fn mark_time(now: DateTime<Utc>, lent_at: impl IntoIterator<Item = DateTime<Utc>>) -> DateTime<Utc> {
    lent_at.into_iter().fold(now, |latest, lent| latest.max(lent))
}

/// Owner preferences looked up at most once per sweep.
/// `None` records a failed lookup so the owner is skipped for the rest of the sweep.
#[derive(Default)]
struct PreferenceCache(HashMap<i32, Option<NotificationPreferences>>);

impl PreferenceCache {
    async fn get(&mut self, store: &dyn LendingStore, owner_id: i32) -> Option<NotificationPreferences> {
        if let Some(cached) = self.0.get(&owner_id) {
            return *cached;
        }
        let prefs = match store.get_owner_preferences(owner_id).await {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                tracing::error!(owner_id, error = %e, "Failed to load notification preferences");
                None
            }
        };
        self.0.insert(owner_id, prefs);
        prefs
    }
}

/// Overdue loans of one owner, sent and committed together
struct OwnerDigest {
    email: String,
    items: Vec<OverdueItem>,
    latest_lent_at: Option<DateTime<Utc>>,
}

impl OwnerDigest {
    fn loan_ids(&self) -> Vec<i32> {
        self.items.iter().map(|item| item.loan_id).collect()
    }
}

#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn LendingStore>,
    notifier: Arc<dyn Notifier>,
    policy: ReminderPolicy,
    sweep_lock: Arc<Mutex<()>>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn LendingStore>, notifier: Arc<dyn Notifier>, policy: ReminderPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
            sweep_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run one sweep against the current time
    pub async fn run_sweep(&self) -> SweepReport {
        self.run_sweep_at(Utc::now()).await
    }

    /// Run one sweep as of `now`. Concurrent calls are serialized.
    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        tracing::info!(%now, "Starting reminder sweep");

        let mut preferences = PreferenceCache::default();
        let upcoming_sent = self.send_upcoming_reminders(now, &mut preferences).await;
        let (overdue_digests_sent, overdue_loans_covered) =
            self.send_overdue_digests(now, &mut preferences).await;

        let report = SweepReport {
            upcoming_sent,
            overdue_digests_sent,
            overdue_loans_covered,
        };
        tracing::info!(
            upcoming_sent,
            overdue_digests_sent,
            overdue_loans_covered,
            "Reminder sweep completed"
        );
        report
    }

    async fn send_upcoming_reminders(
        &self,
        now: DateTime<Utc>,
        preferences: &mut PreferenceCache,
    ) -> u32 {
        let target = (now + Duration::days(self.policy.upcoming_days)).date_naive();
        let candidates = match self.store.list_active_loans_due_on(target).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query loans due soon");
                return 0;
            }
        };

        let mut sent = 0;
        for candidate in candidates {
            let loan = &candidate.loan;
            let Some(due_at) = loan.due_at else { continue };
            if !loan.is_active() || due_at.date_naive() != target || !self.policy.cooled_down(loan, now) {
                continue;
            }

            let wants = preferences
                .get(self.store.as_ref(), loan.owner_id)
                .await
                .map(|prefs| prefs.wants_upcoming())
                .unwrap_or(false);
            if !wants {
                continue;
            }

            let notice = LoanNotice {
                loan_id: loan.id,
                book_title: candidate.book_title.clone(),
                book_author: candidate.book_author.clone(),
                borrower_name: loan.borrower_name.clone(),
                due_at,
                days: days_until_due(due_at, now),
            };

            if let Err(e) = self
                .notifier
                .send_single(&candidate.owner_email, ReminderKind::Upcoming, &notice)
                .await
            {
                tracing::warn!(loan_id = loan.id, error = %e, "Failed to send upcoming due reminder");
                continue;
            }

            match self
                .store
                .mark_reminder_sent(loan.id, mark_time(now, [loan.lent_at]), self.policy.cooldown_cutoff(now))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(loan_id = loan.id, "Loan changed during sweep, reminder not recorded")
                }
                Err(e) => {
                    tracing::error!(loan_id = loan.id, error = %e, "Failed to record reminder")
                }
            }
            sent += 1;
        }

        tracing::info!("Sent {} upcoming due reminder(s)", sent);
        sent
    }

    async fn send_overdue_digests(
        &self,
        now: DateTime<Utc>,
        preferences: &mut PreferenceCache,
    ) -> (u32, u32) {
        let today = now.date_naive();
        let candidates = match self.store.list_active_overdue_loans(today).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query overdue loans");
                return (0, 0);
            }
        };

        let mut digests: BTreeMap<i32, OwnerDigest> = BTreeMap::new();
        for candidate in &candidates {
            let loan = &candidate.loan;
            let Some(due_at) = loan.due_at else { continue };
            if !loan.is_active() || due_at.date_naive() >= today || !self.policy.cooled_down(loan, now) {
                continue;
            }

            let wants = preferences
                .get(self.store.as_ref(), loan.owner_id)
                .await
                .map(|prefs| prefs.wants_overdue())
                .unwrap_or(false);
            if !wants {
                continue;
            }

            let digest = digests.entry(loan.owner_id).or_insert_with(|| OwnerDigest {
                email: candidate.owner_email.clone(),
                items: Vec::new(),
                latest_lent_at: None,
            });
            digest.items.push(OverdueItem::from_candidate(candidate, due_at, now));
            digest.latest_lent_at = digest.latest_lent_at.max(Some(loan.lent_at));
        }

        let mut emails = 0;
        let mut loans = 0;
        for (owner_id, mut digest) in digests {
            digest.items.sort_by_key(|item| item.due_at);

            if let Err(e) = self.notifier.send_digest(&digest.email, &digest.items).await {
                tracing::warn!(owner_id, error = %e, "Failed to send overdue digest");
                continue;
            }

            let loan_ids = digest.loan_ids();
            let marked_at = mark_time(now, digest.latest_lent_at);
            match self
                .store
                .mark_reminders_sent_batch(&loan_ids, marked_at, self.policy.cooldown_cutoff(now))
                .await
            {
                Ok(marked) if marked == loan_ids.len() as u64 => {}
                Ok(marked) => tracing::warn!(
                    owner_id,
                    ?loan_ids,
                    marked,
                    "Digest loans changed during sweep, overdue reminders not recorded"
                ),
                Err(e) => {
                    tracing::error!(owner_id, ?loan_ids, error = %e, "Failed to record overdue reminders")
                }
            }

            emails += 1;
            loans += digest.items.len() as u32;
        }

        tracing::info!("Sent {} overdue digest email(s) covering {} book(s)", emails, loans);
        (emails, loans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::EmailConfig,
        error::AppError,
        services::{email::EmailService, notifier::{MockNotifier, NotifyError}},
    };
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;

    /// In-memory store with the same selection and compare-and-set rules as the SQL one
    #[derive(Default)]
    struct MemoryStore {
        loans: StdMutex<Vec<ReminderCandidate>>,
        preferences: HashMap<i32, NotificationPreferences>,
        fail_batch_marks: bool,
        /// Loan marked by another writer right after the overdue query
        marked_elsewhere: Option<(i32, DateTime<Utc>)>,
    }

    impl MemoryStore {
        fn with(candidates: Vec<ReminderCandidate>) -> Self {
            Self {
                loans: StdMutex::new(candidates),
                ..Default::default()
            }
        }

        fn last_reminder(&self, loan_id: i32) -> Option<DateTime<Utc>> {
            self.loans
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.loan.id == loan_id)
                .and_then(|c| c.loan.last_reminder_sent_at)
        }

        fn select(&self, matches: impl Fn(NaiveDate) -> bool) -> Vec<ReminderCandidate> {
            let mut selected: Vec<_> = self
                .loans
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.loan.is_active())
                .filter(|c| c.loan.due_at.map(|d| matches(d.date_naive())).unwrap_or(false))
                .cloned()
                .collect();
            selected.sort_by_key(|c| (c.loan.owner_id, c.loan.due_at));
            selected
        }

        fn eligible(loan: &Loan, not_after: DateTime<Utc>) -> bool {
            loan.is_active() && loan.last_reminder_sent_at.map(|sent| sent < not_after).unwrap_or(true)
        }

        fn try_mark(loan: &mut Loan, at: DateTime<Utc>, not_after: DateTime<Utc>) -> bool {
            let eligible = Self::eligible(loan, not_after);
            if eligible {
                loan.last_reminder_sent_at = Some(at.max(loan.lent_at));
            }
            eligible
        }
    }

    #[async_trait]
    impl LendingStore for MemoryStore {
        async fn list_active_loans_due_on(&self, date: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
            Ok(self.select(|due| due == date))
        }

        async fn list_active_overdue_loans(&self, as_of: NaiveDate) -> AppResult<Vec<ReminderCandidate>> {
            let selected = self.select(|due| due < as_of);
            if let Some((loan_id, at)) = self.marked_elsewhere {
                let mut loans = self.loans.lock().unwrap();
                if let Some(c) = loans.iter_mut().find(|c| c.loan.id == loan_id) {
                    c.loan.last_reminder_sent_at = Some(at);
                }
            }
            Ok(selected)
        }

        async fn get_owner_preferences(&self, owner_id: i32) -> AppResult<NotificationPreferences> {
            Ok(self.preferences.get(&owner_id).copied().unwrap_or_default())
        }

        async fn mark_reminder_sent(
            &self,
            loan_id: i32,
            at: DateTime<Utc>,
            not_after: DateTime<Utc>,
        ) -> AppResult<bool> {
            let mut loans = self.loans.lock().unwrap();
            Ok(loans
                .iter_mut()
                .find(|c| c.loan.id == loan_id)
                .map(|c| Self::try_mark(&mut c.loan, at, not_after))
                .unwrap_or(false))
        }

        async fn mark_reminders_sent_batch(
            &self,
            loan_ids: &[i32],
            at: DateTime<Utc>,
            not_after: DateTime<Utc>,
        ) -> AppResult<u64> {
            if self.fail_batch_marks {
                return Err(AppError::Internal("connection reset".to_string()));
            }
            let mut loans = self.loans.lock().unwrap();
            let batch: Vec<_> = loans.iter_mut().filter(|c| loan_ids.contains(&c.loan.id)).collect();
            if batch.len() != loan_ids.len() || !batch.iter().all(|c| Self::eligible(&c.loan, not_after)) {
                return Ok(0);
            }
            for candidate in batch {
                Self::try_mark(&mut candidate.loan, at, not_after);
            }
            Ok(loan_ids.len() as u64)
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap()
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    fn candidate(id: i32, owner_id: i32, due_at: Option<DateTime<Utc>>) -> ReminderCandidate {
        ReminderCandidate {
            loan: Loan {
                id,
                book_id: id,
                owner_id,
                borrower_name: format!("Borrower {}", id),
                lent_at: day(1),
                due_at,
                returned_at: None,
                last_reminder_sent_at: None,
            },
            owner_email: format!("owner{}@example.com", owner_id),
            book_title: format!("Book {}", id),
            book_author: None,
        }
    }

    fn engine(store: Arc<MemoryStore>, notifier: MockNotifier) -> ReminderService {
        ReminderService::new(store, Arc::new(notifier), ReminderPolicy::default())
    }

    #[tokio::test]
    async fn test_upcoming_reminder_sent_once_and_recorded() {
        let store = Arc::new(MemoryStore::with(vec![candidate(1, 10, Some(day(18)))]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_single()
            .withf(|to, kind, notice| {
                to == "owner10@example.com" && *kind == ReminderKind::Upcoming && notice.days == 3
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.upcoming_sent, 1);
        assert_eq!(report.overdue_digests_sent, 0);
        assert_eq!(store.last_reminder(1), Some(now()));
    }

    #[tokio::test]
    async fn test_upcoming_matches_exact_calendar_day_only() {
        let store = Arc::new(MemoryStore::with(vec![
            candidate(1, 10, Some(day(17))),
            candidate(2, 10, Some(Utc.with_ymd_and_hms(2024, 3, 18, 23, 30, 0).unwrap())),
            candidate(3, 10, Some(day(19))),
            candidate(4, 10, None),
        ]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_single()
            .withf(|_, _, notice| notice.loan_id == 2)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.upcoming_sent, 1);
        assert_eq!(store.last_reminder(1), None);
        assert_eq!(store.last_reminder(4), None);
    }

    #[tokio::test]
    async fn test_recent_reminder_blocks_resend() {
        let mut reminded = candidate(1, 10, Some(day(18)));
        reminded.loan.last_reminder_sent_at = Some(now() - Duration::hours(1));
        let store = Arc::new(MemoryStore::with(vec![reminded]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_single().times(0);

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.last_reminder(1), Some(now() - Duration::hours(1)));
    }

    #[tokio::test]
    async fn test_elapsed_cooldown_allows_resend() {
        let mut reminded = candidate(1, 10, Some(day(10)));
        reminded.loan.last_reminder_sent_at = Some(now() - Duration::hours(25));
        let store = Arc::new(MemoryStore::with(vec![reminded]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(store.last_reminder(1), Some(now()));
    }

    #[tokio::test]
    async fn test_back_to_back_sweeps_send_nothing_new() {
        let store = Arc::new(MemoryStore::with(vec![
            candidate(1, 10, Some(day(18))),
            candidate(2, 10, Some(day(12))),
        ]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_single().times(1).returning(|_, _, _| Ok(()));
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));
        let engine = engine(store, notifier);

        let first = engine.run_sweep_at(now()).await;
        let second = engine.run_sweep_at(now()).await;

        assert_eq!(first.upcoming_sent, 1);
        assert_eq!(first.overdue_digests_sent, 1);
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn test_overdue_loans_grouped_per_owner() {
        let store = Arc::new(MemoryStore::with(vec![
            candidate(1, 10, Some(day(12))),
            candidate(2, 10, Some(day(2))),
            candidate(3, 10, Some(day(7))),
            candidate(4, 20, Some(day(14))),
        ]));
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let recorded = sent.clone();
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(2).returning(move |to, items| {
            let ids: Vec<i32> = items.iter().map(|item| item.loan_id).collect();
            recorded.lock().unwrap().push((to.to_string(), ids));
            Ok(())
        });

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 2);
        assert_eq!(report.overdue_loans_covered, 4);
        let mut sent = sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(
            sent,
            vec![
                ("owner10@example.com".to_string(), vec![2, 3, 1]),
                ("owner20@example.com".to_string(), vec![4]),
            ]
        );
        for id in 1..=4 {
            assert_eq!(store.last_reminder(id), Some(now()));
        }
    }

    #[tokio::test]
    async fn test_failed_digest_leaves_only_that_owner_unmarked() {
        let store = Arc::new(MemoryStore::with(vec![
            candidate(1, 10, Some(day(12))),
            candidate(2, 10, Some(day(11))),
            candidate(3, 20, Some(day(13))),
        ]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(2).returning(|to, _| {
            if to == "owner10@example.com" {
                Err(NotifyError::Transport("mailbox unavailable".to_string()))
            } else {
                Ok(())
            }
        });

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(report.overdue_loans_covered, 1);
        assert_eq!(store.last_reminder(1), None);
        assert_eq!(store.last_reminder(2), None);
        assert_eq!(store.last_reminder(3), Some(now()));
    }

    #[tokio::test]
    async fn test_failed_upcoming_send_is_retried_next_sweep() {
        let store = Arc::new(MemoryStore::with(vec![candidate(1, 10, Some(day(18)))]));
        let mut notifier = MockNotifier::new();
        let mut seq = mockall::Sequence::new();
        notifier
            .expect_send_single()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(NotifyError::Transport("timeout".to_string())));
        notifier
            .expect_send_single()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
        let engine = engine(store.clone(), notifier);

        let first = engine.run_sweep_at(now()).await;
        assert_eq!(first.upcoming_sent, 0);
        assert_eq!(store.last_reminder(1), None);

        let later = now() + Duration::hours(2);
        let second = engine.run_sweep_at(later).await;
        assert_eq!(second.upcoming_sent, 1);
        assert_eq!(store.last_reminder(1), Some(later));
    }

    #[tokio::test]
    async fn test_overdue_preference_suppresses_digest() {
        let mut store = MemoryStore::with(vec![
            candidate(1, 10, Some(day(1))),
            candidate(2, 10, Some(day(18))),
        ]);
        store.preferences.insert(
            10,
            NotificationPreferences {
                email_overdue_reminders: false,
                ..Default::default()
            },
        );
        let store = Arc::new(store);
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(0);
        notifier.expect_send_single().times(1).returning(|_, _, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.upcoming_sent, 1);
        assert_eq!(report.overdue_digests_sent, 0);
        assert_eq!(store.last_reminder(1), None);
    }

    #[tokio::test]
    async fn test_master_switch_suppresses_both_phases() {
        let mut store = MemoryStore::with(vec![
            candidate(1, 10, Some(day(1))),
            candidate(2, 10, Some(day(18))),
        ]);
        store.preferences.insert(
            10,
            NotificationPreferences {
                email_reminders_enabled: false,
                ..Default::default()
            },
        );
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(0);
        notifier.expect_send_single().times(0);

        let report = engine(Arc::new(store), notifier).run_sweep_at(now()).await;

        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_digest_reports_whole_days_overdue() {
        let store = Arc::new(MemoryStore::with(vec![candidate(1, 10, Some(day(10)))]));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_digest()
            .withf(|_, items| items.len() == 1 && items[0].days_overdue == 5)
            .times(1)
            .returning(|_, _| Ok(()));

        let report = engine(store, notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_loans_covered, 1);
    }

    #[tokio::test]
    async fn test_returned_loans_are_ignored() {
        let mut overdue = candidate(1, 10, Some(day(10)));
        overdue.loan.returned_at = Some(day(12));
        let mut upcoming = candidate(2, 10, Some(day(18)));
        upcoming.loan.returned_at = Some(day(14));
        let store = Arc::new(MemoryStore::with(vec![overdue, upcoming]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(0);
        notifier.expect_send_single().times(0);

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.last_reminder(1), None);
        assert_eq!(store.last_reminder(2), None);
    }

    #[tokio::test]
    async fn test_upcoming_and_overdue_share_cooldown() {
        // Reminded as upcoming earlier today, overdue now: must wait for the cooldown
        let mut loan = candidate(1, 10, Some(day(14)));
        loan.loan.last_reminder_sent_at = Some(now() - Duration::hours(3));
        let store = Arc::new(MemoryStore::with(vec![loan]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));
        let engine = engine(store.clone(), notifier);

        assert_eq!(engine.run_sweep_at(now()).await, SweepReport::default());

        let next_day = now() + Duration::hours(22);
        let report = engine.run_sweep_at(next_day).await;
        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(store.last_reminder(1), Some(next_day));
    }

    #[tokio::test]
    async fn test_unconfigured_email_marks_nothing() {
        let store = Arc::new(MemoryStore::with(vec![
            candidate(1, 10, Some(day(18))),
            candidate(2, 10, Some(day(10))),
        ]));
        let notifier = Arc::new(EmailService::new(EmailConfig::default()));
        let engine = ReminderService::new(store.clone(), notifier, ReminderPolicy::default());

        let report = engine.run_sweep_at(now()).await;

        assert_eq!(report, SweepReport::default());
        assert_eq!(store.last_reminder(1), None);
        assert_eq!(store.last_reminder(2), None);
    }

    #[tokio::test]
    async fn test_failed_batch_mark_keeps_loans_eligible() {
        let mut store = MemoryStore::with(vec![candidate(1, 10, Some(day(10)))]);
        store.fail_batch_marks = true;
        let store = Arc::new(store);
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(store.last_reminder(1), None);
    }

    #[tokio::test]
    async fn test_store_failure_in_one_phase_does_not_abort_the_other() {
        let mut store = MockLendingStore::new();
        store
            .expect_list_active_loans_due_on()
            .returning(|_| Err(AppError::Internal("relation does not exist".to_string())));
        store
            .expect_list_active_overdue_loans()
            .returning(|_| Ok(vec![candidate(1, 10, Some(day(10)))]));
        store
            .expect_get_owner_preferences()
            .returning(|_| Ok(NotificationPreferences::default()));
        store
            .expect_mark_reminders_sent_batch()
            .withf(|ids, at, _| ids == [1] && *at == now())
            .times(1)
            .returning(|ids, _, _| Ok(ids.len() as u64));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let engine = ReminderService::new(Arc::new(store), Arc::new(notifier), ReminderPolicy::default());
        let report = engine.run_sweep_at(now()).await;

        assert_eq!(report.upcoming_sent, 0);
        assert_eq!(report.overdue_digests_sent, 1);
    }

    #[tokio::test]
    async fn test_preference_lookup_failure_skips_owner() {
        let mut store = MockLendingStore::new();
        store.expect_list_active_loans_due_on().returning(|_| Ok(vec![]));
        store.expect_list_active_overdue_loans().returning(|_| {
            Ok(vec![
                candidate(1, 10, Some(day(10))),
                candidate(2, 10, Some(day(11))),
                candidate(3, 20, Some(day(11))),
            ])
        });
        store
            .expect_get_owner_preferences()
            .with(mockall::predicate::eq(10))
            .times(1)
            .returning(|_| Err(AppError::Database(sqlx::Error::PoolTimedOut)));
        store
            .expect_get_owner_preferences()
            .with(mockall::predicate::eq(20))
            .times(1)
            .returning(|_| Ok(NotificationPreferences::default()));
        store
            .expect_mark_reminders_sent_batch()
            .times(1)
            .returning(|ids, _, _| Ok(ids.len() as u64));
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_digest()
            .withf(|to, _| to == "owner20@example.com")
            .times(1)
            .returning(|_, _| Ok(()));

        let engine = ReminderService::new(Arc::new(store), Arc::new(notifier), ReminderPolicy::default());
        let report = engine.run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(report.overdue_loans_covered, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_do_not_double_send() {
        let store = Arc::new(MemoryStore::with(vec![candidate(1, 10, Some(day(10)))]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));
        let engine = engine(store, notifier);

        let (a, b) = tokio::join!(engine.run_sweep_at(now()), engine.run_sweep_at(now()));

        assert_eq!(a.overdue_digests_sent + b.overdue_digests_sent, 1);
    }

    #[tokio::test]
    async fn test_digest_not_recorded_when_a_loan_was_marked_elsewhere() {
        let elsewhere = now() - Duration::minutes(1);
        let mut store = MemoryStore::with(vec![
            candidate(1, 10, Some(day(10))),
            candidate(2, 10, Some(day(11))),
        ]);
        store.marked_elsewhere = Some((2, elsewhere));
        let store = Arc::new(store);
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(store.last_reminder(1), None);
        assert_eq!(store.last_reminder(2), Some(elsewhere));
    }

    #[tokio::test]
    async fn test_short_batch_count_is_tolerated() {
        let mut store = MockLendingStore::new();
        store.expect_list_active_loans_due_on().returning(|_| Ok(vec![]));
        store.expect_list_active_overdue_loans().returning(|_| {
            Ok(vec![candidate(1, 10, Some(day(10))), candidate(2, 10, Some(day(11)))])
        });
        store
            .expect_get_owner_preferences()
            .returning(|_| Ok(NotificationPreferences::default()));
        store
            .expect_mark_reminders_sent_batch()
            .withf(|ids, _, _| ids == [1, 2])
            .times(1)
            .returning(|_, _, _| Ok(0));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let engine = ReminderService::new(Arc::new(store), Arc::new(notifier), ReminderPolicy::default());
        let report = engine.run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(report.overdue_loans_covered, 2);
    }

    #[tokio::test]
    async fn test_upcoming_send_counted_when_mark_is_rejected_or_fails() {
        let mut store = MockLendingStore::new();
        store.expect_list_active_loans_due_on().returning(|_| {
            Ok(vec![candidate(1, 10, Some(day(18))), candidate(2, 10, Some(day(18)))])
        });
        store.expect_list_active_overdue_loans().returning(|_| Ok(vec![]));
        store
            .expect_get_owner_preferences()
            .returning(|_| Ok(NotificationPreferences::default()));
        store
            .expect_mark_reminder_sent()
            .with(mockall::predicate::eq(1), mockall::predicate::always(), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Ok(false));
        store
            .expect_mark_reminder_sent()
            .with(mockall::predicate::eq(2), mockall::predicate::always(), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Err(AppError::Database(sqlx::Error::PoolTimedOut)));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_single().times(2).returning(|_, _, _| Ok(()));

        let engine = ReminderService::new(Arc::new(store), Arc::new(notifier), ReminderPolicy::default());
        let report = engine.run_sweep_at(now()).await;

        assert_eq!(report.upcoming_sent, 2);
    }

    #[tokio::test]
    async fn test_loan_lent_after_sweep_start_is_marked_at_lend_time() {
        let lent_late = now() + Duration::seconds(30);
        let mut late = candidate(2, 10, Some(day(11)));
        late.loan.lent_at = lent_late;
        let store = Arc::new(MemoryStore::with(vec![candidate(1, 10, Some(day(10))), late]));
        let mut notifier = MockNotifier::new();
        notifier.expect_send_digest().times(1).returning(|_, _| Ok(()));

        let report = engine(store.clone(), notifier).run_sweep_at(now()).await;

        assert_eq!(report.overdue_digests_sent, 1);
        assert_eq!(store.last_reminder(1), Some(lent_late));
        assert_eq!(store.last_reminder(2), Some(lent_late));
    }

    #[test]
    fn test_mark_time_never_precedes_lend_time() {
        assert_eq!(mark_time(now(), [day(1)]), now());
        assert_eq!(mark_time(now(), None), now());
        let later = now() + Duration::minutes(2);
        assert_eq!(mark_time(now(), [day(1), later]), later);
    }
}
