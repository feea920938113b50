use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::{Applied, Job, JobDraft, WAITING_RESPONSE};
use crate::sheet::{JobStore, StoreError};
use crate::text::{derive_id, wrap_for_sheet, DEFAULT_WRAP_WIDTH};

pub const DEFAULT_POLL_ATTEMPTS: u32 = 4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(600);
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_secs(4);

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no job with id '{0}'")]
    UnknownJob(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What re-reading the sheet after a write told us.
#[derive(Debug)]
pub enum PollOutcome {
    /// The new row showed up.
    Confirmed,
    /// Every attempt came back without it. The write may still land later.
    Unconfirmed,
    /// A read failed, so nothing is known.
    Failed(StoreError),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Transient banner shown after a mutation.
#[derive(Debug, Clone)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    raised_at: Instant,
}

/// Stops the poll loop running on the tracker it came from. The next create
/// starts with a fresh flag.
#[derive(Clone)]
pub struct Canceller(Arc<watch::Sender<bool>>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Re-reads the store until a job with `id` appears, `config.attempts` times
/// at most. Each read replaces `jobs` wholesale. Only the read is retried,
/// never the write.
pub async fn poll_for_presence<S: JobStore + ?Sized>(
    store: &S,
    id: &str,
    config: PollConfig,
    jobs: &mut Vec<Job>,
    cancel: &mut watch::Receiver<bool>,
) -> PollOutcome {
    for attempt in 1..=config.attempts {
        if *cancel.borrow() {
            return PollOutcome::Cancelled;
        }

        match store.try_fetch_all().await {
            Ok(fetched) => {
                *jobs = fetched;
                if jobs.iter().any(|j| j.id == id) {
                    debug!("'{}' visible after {} attempt(s)", id, attempt);
                    return PollOutcome::Confirmed;
                }
            }
            Err(e) => return PollOutcome::Failed(e),
        }

        if attempt < config.attempts && sleep_or_cancel(config.interval, cancel).await {
            return PollOutcome::Cancelled;
        }
    }

    debug!("'{}' not visible after {} attempts", id, config.attempts);
    PollOutcome::Unconfirmed
}

/// Returns true if cancelled before the interval elapsed.
async fn sleep_or_cancel(interval: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow_and_update() => return true,
                Ok(()) => continue,
                Err(_) => {
                    // Sender gone; nobody can cancel any more
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

/// Keeps the local job list in line with what the user did, on top of a store
/// that never says whether a write worked.
///
/// Every mutation is applied locally first. Creates are then confirmed by
/// polling; edits, status changes and deletes just re-read the whole sheet.
/// Nothing is rolled back when the remote side fails.
pub struct Tracker<S> {
    store: S,
    jobs: Vec<Job>,
    poll: PollConfig,
    notice_ttl: Duration,
    notice: Option<Notice>,
    today: Box<dyn Fn() -> NaiveDate + Send + Sync>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl<S: JobStore> Tracker<S> {
    pub fn new(store: S) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            store,
            jobs: Vec::new(),
            poll: PollConfig::default(),
            notice_ttl: DEFAULT_NOTICE_TTL,
            notice: None,
            today: Box::new(|| Utc::now().date_naive()),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_notice_ttl(mut self, ttl: Duration) -> Self {
        self.notice_ttl = ttl;
        self
    }

    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Box::new(today);
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn canceller(&self) -> Canceller {
        Canceller(Arc::clone(&self.cancel_tx))
    }

    /// Current notice, if it has not timed out yet.
    pub fn notice(&self) -> Option<&Notice> {
        self.notice
            .as_ref()
            .filter(|n| n.raised_at.elapsed() < self.notice_ttl)
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn raise(&mut self, level: NoticeLevel, message: String) {
        match level {
            NoticeLevel::Error => warn!("{}", message),
            _ => info!("{}", message),
        }
        self.notice = Some(Notice {
            level,
            message,
            raised_at: Instant::now(),
        });
    }

    fn today(&self) -> String {
        (self.today)().format("%Y-%m-%d").to_string()
    }

    fn require(&self, id: &str) -> Result<Job, TrackerError> {
        self.get(id)
            .cloned()
            .ok_or_else(|| TrackerError::UnknownJob(id.to_string()))
    }

    /// Replaces the local list with whatever the sheet holds. A failed read
    /// leaves the list empty.
    pub async fn load(&mut self) -> Result<usize, StoreError> {
        match self.store.try_fetch_all().await {
            Ok(jobs) => {
                self.jobs = jobs;
                Ok(self.jobs.len())
            }
            Err(e) => {
                self.jobs.clear();
                self.raise(NoticeLevel::Error, format!("Could not load jobs: {}", e));
                Err(e)
            }
        }
    }

    /// Best-effort read for callers that can carry on without the list. A
    /// failed read leaves it empty and raises no notice.
    pub async fn load_quietly(&mut self) -> usize {
        self.jobs = self.store.fetch_all().await;
        self.jobs.len()
    }

    /// Re-read after a mutation. Failures are already reported by `load`.
    async fn resync(&mut self) -> bool {
        match self.load().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Resync failed: {}", e);
                false
            }
        }
    }

    pub async fn create(&mut self, draft: JobDraft) -> Result<PollOutcome, TrackerError> {
        let id = derive_id(&draft.company, &draft.position);
        if self.get(&id).is_some() {
            warn!("A job with id '{}' already exists; both rows will share it", id);
        }

        let job = Job {
            id: id.clone(),
            company: draft.company,
            position: draft.position,
            posting_link: draft.posting_link,
            applied: Applied::No,
            date_applied: String::new(),
            response: WAITING_RESPONSE.to_string(),
            predicted_pay: draft.predicted_pay,
            salary_benefits: wrap_for_sheet(&draft.salary_benefits, DEFAULT_WRAP_WIDTH),
            employment_type: draft.employment_type,
            notes: draft.notes,
            date_posted: self.today(),
        };
        let label = format!("{} at {}", job.position, job.company);

        self.jobs.insert(0, job.clone());
        // A cancel left over from an earlier create must not skip this one
        self.cancel_tx.send_replace(false);

        if let Err(e) = self.store.write(&job, None).await {
            self.raise(NoticeLevel::Error, format!("Could not post {}: {}", label, e));
            return Err(e.into());
        }

        let mut cancel = self.cancel_rx.clone();
        cancel.borrow_and_update();
        let outcome = poll_for_presence(&self.store, &id, self.poll, &mut self.jobs, &mut cancel).await;

        match &outcome {
            PollOutcome::Confirmed => {
                self.raise(NoticeLevel::Success, format!("Posted {}", label));
            }
            PollOutcome::Unconfirmed => {
                self.raise(
                    NoticeLevel::Info,
                    format!("Sent {}, but could not confirm it reached the sheet", label),
                );
            }
            PollOutcome::Failed(e) => {
                self.raise(NoticeLevel::Error, format!("Sent {}, but re-reading failed: {}", label, e));
            }
            PollOutcome::Cancelled => {
                debug!("Confirmation for '{}' cancelled", id);
                self.raise(
                    NoticeLevel::Info,
                    format!("Sent {}, but stopped before it could be confirmed", label),
                );
            }
        }

        Ok(outcome)
    }

    /// Applies form edits. Status fields (applied, date applied, response and
    /// date posted) always come from the current version.
    pub async fn edit(&mut self, id: &str, draft: JobDraft) -> Result<Job, TrackerError> {
        let previous = self.require(id)?;
        let updated = Job {
            id: derive_id(&draft.company, &draft.position),
            company: draft.company,
            position: draft.position,
            posting_link: draft.posting_link,
            predicted_pay: draft.predicted_pay,
            salary_benefits: wrap_for_sheet(&draft.salary_benefits, DEFAULT_WRAP_WIDTH),
            employment_type: draft.employment_type,
            notes: draft.notes,
            ..previous.clone()
        };

        self.apply_update(previous, updated.clone()).await?;
        Ok(updated)
    }

    /// Returns false without touching anything when the job is already applied.
    pub async fn mark_applied(&mut self, id: &str) -> Result<bool, TrackerError> {
        let previous = self.require(id)?;
        if previous.is_applied() {
            return Ok(false);
        }

        let updated = Job {
            applied: Applied::Yes,
            date_applied: self.today(),
            response: WAITING_RESPONSE.to_string(),
            ..previous.clone()
        };

        self.apply_update(previous, updated).await?;
        Ok(true)
    }

    pub async fn update_notes(&mut self, id: &str, notes: &str) -> Result<(), TrackerError> {
        let previous = self.require(id)?;
        let updated = Job {
            notes: notes.to_string(),
            ..previous.clone()
        };
        self.apply_update(previous, updated).await
    }

    pub async fn record_response(&mut self, id: &str, response: &str) -> Result<(), TrackerError> {
        let previous = self.require(id)?;
        let response = response.trim();
        let updated = Job {
            response: if response.is_empty() {
                WAITING_RESPONSE.to_string()
            } else {
                response.to_string()
            },
            ..previous.clone()
        };
        self.apply_update(previous, updated).await
    }

    async fn apply_update(&mut self, previous: Job, updated: Job) -> Result<(), TrackerError> {
        for slot in self.jobs.iter_mut().filter(|j| j.id == previous.id) {
            *slot = updated.clone();
        }

        if let Err(e) = self.store.write(&updated, Some(&previous)).await {
            self.raise(
                NoticeLevel::Error,
                format!("Could not save {} at {}: {}", updated.position, updated.company, e),
            );
            return Err(e.into());
        }

        if self.resync().await {
            self.raise(
                NoticeLevel::Success,
                format!("Updated {} at {}", updated.position, updated.company),
            );
        }
        Ok(())
    }

    /// Removes a job after `confirm` agrees. Returns false if it declined.
    ///
    /// The local removal stands even when the remote delete or the re-read
    /// afterwards fails.
    pub async fn delete<F>(&mut self, id: &str, confirm: F) -> Result<bool, TrackerError>
    where
        F: FnOnce(&Job) -> bool,
    {
        let job = self.require(id)?;
        if !confirm(&job) {
            return Ok(false);
        }

        self.jobs.retain(|j| j.id != id);

        if let Err(e) = self.store.delete(&job).await {
            self.raise(
                NoticeLevel::Error,
                format!("Could not delete {} at {}: {}", job.position, job.company, e),
            );
            return Err(e.into());
        }

        if self.resync().await {
            self.raise(
                NoticeLevel::Success,
                format!("Deleted {} at {}", job.position, job.company),
            );
        }
        Ok(true)
    }
}

impl<S> Drop for Tracker<S> {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmploymentType;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory sheet. New rows can be held back for a number of reads to
    /// imitate the sheet catching up, or dropped entirely.
    #[derive(Default)]
    struct MockStore {
        rows: Mutex<Vec<(Job, usize)>>,
        writes: Mutex<Vec<(Job, Option<Job>)>>,
        deletes: Mutex<Vec<Job>>,
        fetches: AtomicUsize,
        fail_fetch: AtomicBool,
        fail_writes: bool,
        drop_writes: bool,
        lag: usize,
    }

    impl MockStore {
        fn with_jobs(jobs: Vec<Job>) -> Self {
            let store = Self::default();
            *store.rows.lock().unwrap() = jobs.into_iter().map(|j| (j, 0)).collect();
            store
        }

        fn lagging(lag: usize) -> Self {
            Self { lag, ..Self::default() }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }

        fn writes(&self) -> Vec<(Job, Option<Job>)> {
            self.writes.lock().unwrap().clone()
        }

        fn deletes(&self) -> Vec<Job> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobStore for MockStore {
        async fn try_fetch_all(&self) -> Result<Vec<Job>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(StoreError::UnexpectedShape);
            }
            let mut rows = self.rows.lock().unwrap();
            let visible = rows
                .iter()
                .filter(|(_, hidden)| *hidden == 0)
                .map(|(job, _)| job.clone())
                .collect();
            for (_, hidden) in rows.iter_mut() {
                *hidden = hidden.saturating_sub(1);
            }
            Ok(visible)
        }

        async fn write(&self, job: &Job, previous: Option<&Job>) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::UnexpectedShape);
            }
            self.writes.lock().unwrap().push((job.clone(), previous.cloned()));
            if self.drop_writes {
                return Ok(());
            }
            let mut rows = self.rows.lock().unwrap();
            match previous {
                Some(prev) => {
                    if let Some((row, _)) = rows
                        .iter_mut()
                        .find(|(r, _)| r.company == prev.company && r.position == prev.position)
                    {
                        *row = job.clone();
                    }
                }
                None => rows.push((job.clone(), self.lag)),
            }
            Ok(())
        }

        async fn delete(&self, job: &Job) -> Result<(), StoreError> {
            if self.fail_writes {
                return Err(StoreError::UnexpectedShape);
            }
            self.deletes.lock().unwrap().push(job.clone());
            self.rows
                .lock()
                .unwrap()
                .retain(|(r, _)| !(r.company == job.company && r.position == job.position));
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    fn tracker(store: MockStore) -> Tracker<MockStore> {
        Tracker::new(store).with_clock(today)
    }

    fn draft(company: &str, position: &str) -> JobDraft {
        JobDraft {
            company: company.to_string(),
            position: position.to_string(),
            posting_link: "https://example.com".to_string(),
            predicted_pay: "$30/hr".to_string(),
            salary_benefits: "dental".to_string(),
            notes: "looks fun".to_string(),
            employment_type: EmploymentType::Contract,
        }
    }

    fn existing(company: &str, position: &str, applied: Applied) -> Job {
        Job {
            id: derive_id(company, position),
            company: company.to_string(),
            position: position.to_string(),
            posting_link: "https://old.example.com".to_string(),
            applied,
            date_applied: if applied == Applied::Yes { "2024-01-02".to_string() } else { String::new() },
            response: "Got confirmation".to_string(),
            predicted_pay: "$20/hr".to_string(),
            salary_benefits: "none".to_string(),
            employment_type: EmploymentType::PartTime,
            notes: "old notes".to_string(),
            date_posted: "2024-01-01".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_confirmed_on_first_read() {
        let mut tracker = tracker(MockStore::default());

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Confirmed));
        assert_eq!(tracker.store().fetch_count(), 1);
        let matching: Vec<&Job> = tracker.jobs().iter().filter(|j| j.id == "acme-tester").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_writes_job_with_defaults() {
        let mut tracker = tracker(MockStore::default());
        tracker.create(draft("Acme", "Tester")).await.unwrap();

        let writes = tracker.store().writes();
        assert_eq!(writes.len(), 1);
        let (job, previous) = &writes[0];
        assert!(previous.is_none());
        assert_eq!(job.id, "acme-tester");
        assert_eq!(job.applied, Applied::No);
        assert_eq!(job.date_applied, "");
        assert_eq!(job.response, WAITING_RESPONSE);
        assert_eq!(job.date_posted, "2024-03-09");
        assert_eq!(job.employment_type, EmploymentType::Contract);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failed_write_keeps_optimistic_entry() {
        let store = MockStore {
            fail_writes: true,
            ..MockStore::default()
        };
        let mut tracker = tracker(store);

        let result = tracker.create(draft("Acme", "Tester")).await;

        assert!(result.is_err());
        assert_eq!(tracker.jobs().len(), 1);
        let job = &tracker.jobs()[0];
        assert_eq!(job.id, "acme-tester");
        assert_eq!(job.applied, Applied::No);
        assert_eq!(job.response, WAITING_RESPONSE);
        assert_eq!(job.date_posted, "2024-03-09");
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Error);
        assert_eq!(tracker.store().fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_prepends_before_existing_jobs() {
        let store = MockStore {
            fail_writes: true,
            ..MockStore::with_jobs(vec![existing("Globex", "Engineer", Applied::No)])
        };
        let mut tracker = tracker(store);
        tracker.load().await.unwrap();

        let _ = tracker.create(draft("Acme", "Tester")).await;

        let ids: Vec<&str> = tracker.jobs().iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["acme-tester", "globex-engineer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_polls_until_row_appears() {
        let mut tracker = tracker(MockStore::lagging(2));
        let started = Instant::now();

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Confirmed));
        assert_eq!(tracker.store().fetch_count(), 3);
        assert!(started.elapsed() >= DEFAULT_POLL_INTERVAL * 2);
        assert!(started.elapsed() < DEFAULT_POLL_INTERVAL * 3);
        assert_eq!(tracker.jobs().iter().filter(|j| j.id == "acme-tester").count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_unconfirmed_after_budget() {
        let store = MockStore {
            drop_writes: true,
            ..MockStore::default()
        };
        let mut tracker = tracker(store);
        let started = Instant::now();

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Unconfirmed));
        assert_eq!(tracker.store().fetch_count(), DEFAULT_POLL_ATTEMPTS as usize);
        // No wait after the last attempt
        assert!(started.elapsed() >= DEFAULT_POLL_INTERVAL * (DEFAULT_POLL_ATTEMPTS - 1));
        assert!(started.elapsed() < DEFAULT_POLL_INTERVAL * DEFAULT_POLL_ATTEMPTS);
        // The list is whatever the last read returned, without the dropped row
        assert!(tracker.jobs().is_empty());
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_poll_read_failure() {
        let store = MockStore::default();
        store.fail_fetch.store(true, Ordering::SeqCst);
        let mut tracker = tracker(store);

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Failed(StoreError::UnexpectedShape)));
        assert_eq!(tracker.store().fetch_count(), 1);
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_honours_cancellation() {
        let store = MockStore {
            drop_writes: true,
            ..MockStore::default()
        };
        let mut tracker = tracker(store);
        let canceller = tracker.canceller();

        let (outcome, _) = tokio::join!(tracker.create(draft("Acme", "Tester")), async {
            tokio::time::sleep(Duration::from_millis(700)).await;
            canceller.cancel();
        });

        assert!(matches!(outcome.unwrap(), PollOutcome::Cancelled));
        assert_eq!(tracker.store().fetch_count(), 2);
        let notice = tracker.notice().unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert!(notice.message.contains("Tester at Acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_after_cancel_polls_again() {
        let store = MockStore {
            drop_writes: true,
            ..MockStore::default()
        };
        let mut tracker = tracker(store);
        tracker.canceller().cancel();

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Unconfirmed));
        assert_eq!(tracker.store().fetch_count(), DEFAULT_POLL_ATTEMPTS as usize);
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_with_custom_budget() {
        let store = MockStore {
            drop_writes: true,
            ..MockStore::default()
        };
        let mut tracker = tracker(store).with_poll(PollConfig {
            attempts: 2,
            interval: Duration::from_millis(50),
        });

        let outcome = tracker.create(draft("Acme", "Tester")).await.unwrap();

        assert!(matches!(outcome, PollOutcome::Unconfirmed));
        assert_eq!(tracker.store().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_load_replaces_collection() {
        let store = MockStore::with_jobs(vec![
            existing("Acme", "Tester", Applied::No),
            existing("Globex", "Engineer", Applied::Yes),
        ]);
        let mut tracker = tracker(store);

        assert_eq!(tracker.load().await.unwrap(), 2);
        assert!(tracker.get("globex-engineer").is_some());
    }

    #[tokio::test]
    async fn test_load_failure_empties_and_notifies() {
        let store = MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::No)]);
        let mut tracker = tracker(store);
        tracker.load().await.unwrap();

        tracker.store().fail_fetch.store(true, Ordering::SeqCst);
        assert!(tracker.load().await.is_err());
        assert!(tracker.jobs().is_empty());
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_load_quietly_survives_read_failure() {
        let store = MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::No)]);
        let mut tracker = tracker(store);
        assert_eq!(tracker.load_quietly().await, 1);

        tracker.store().fail_fetch.store(true, Ordering::SeqCst);
        assert_eq!(tracker.load_quietly().await, 0);
        assert!(tracker.jobs().is_empty());
        assert!(tracker.notice().is_none());

        // The post still goes out
        tracker.create(draft("Globex", "Engineer")).await.unwrap();
        assert_eq!(tracker.store().writes().len(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_every_job_sharing_the_id() {
        let first = existing("Acme", "Tester", Applied::No);
        let second = Job {
            notes: "second row".to_string(),
            ..first.clone()
        };
        let store = MockStore {
            fail_writes: true,
            ..MockStore::with_jobs(vec![first, second])
        };
        let mut tracker = tracker(store);
        tracker.load().await.unwrap();

        let _ = tracker.update_notes("acme-tester", "both rows").await;

        assert_eq!(tracker.jobs().len(), 2);
        assert!(tracker.jobs().iter().all(|j| j.notes == "both rows"));
    }

    #[tokio::test]
    async fn test_mark_applied_sets_status_only() {
        let original = existing("Acme", "Tester", Applied::No);
        let mut tracker = tracker(MockStore::with_jobs(vec![original.clone()]));
        tracker.load().await.unwrap();

        assert!(tracker.mark_applied("acme-tester").await.unwrap());

        let job = tracker.get("acme-tester").unwrap();
        assert_eq!(job.applied, Applied::Yes);
        assert_eq!(job.date_applied, "2024-03-09");
        assert_eq!(job.response, WAITING_RESPONSE);
        let expected = Job {
            applied: Applied::Yes,
            date_applied: "2024-03-09".to_string(),
            response: WAITING_RESPONSE.to_string(),
            ..original.clone()
        };
        assert_eq!(job, &expected);

        let writes = tracker.store().writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.as_ref(), Some(&original));
        // One read for load, one resync
        assert_eq!(tracker.store().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_mark_applied_twice_is_noop() {
        let mut tracker = tracker(MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::Yes)]));
        tracker.load().await.unwrap();

        assert!(!tracker.mark_applied("acme-tester").await.unwrap());
        assert!(tracker.store().writes().is_empty());
    }

    #[tokio::test]
    async fn test_edit_preserves_status_fields() {
        let original = existing("Acme", "Tester", Applied::Yes);
        let mut tracker = tracker(MockStore::with_jobs(vec![original.clone()]));
        tracker.load().await.unwrap();

        let mut changes = draft("Acme", "Senior Tester");
        changes.salary_benefits = "great benefits ".repeat(12);
        let updated = tracker.edit("acme-tester", changes).await.unwrap();

        assert_eq!(updated.id, "acme-senior-tester");
        assert_eq!(updated.applied, original.applied);
        assert_eq!(updated.date_applied, original.date_applied);
        assert_eq!(updated.response, original.response);
        assert_eq!(updated.date_posted, original.date_posted);
        assert_eq!(updated.employment_type, EmploymentType::Contract);
        assert!(updated.salary_benefits.contains('\n'));

        let (written, previous) = &tracker.store().writes()[0];
        assert_eq!(written, &updated);
        assert_eq!(previous.as_ref().unwrap().position, "Tester");

        assert!(tracker.get("acme-tester").is_none());
        assert_eq!(tracker.get("acme-senior-tester"), Some(&updated));
    }

    #[tokio::test]
    async fn test_failed_update_is_not_rolled_back() {
        let store = MockStore {
            fail_writes: true,
            ..MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::No)])
        };
        let mut tracker = tracker(store);
        tracker.load().await.unwrap();

        assert!(tracker.update_notes("acme-tester", "call back monday").await.is_err());
        assert_eq!(tracker.get("acme-tester").unwrap().notes, "call back monday");
        assert_eq!(tracker.notice().unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_record_response() {
        let mut tracker = tracker(MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::Yes)]));
        tracker.load().await.unwrap();

        tracker.record_response("acme-tester", "Interview on tuesday").await.unwrap();
        assert_eq!(tracker.get("acme-tester").unwrap().response, "Interview on tuesday");

        tracker.record_response("acme-tester", "  ").await.unwrap();
        assert_eq!(tracker.get("acme-tester").unwrap().response, WAITING_RESPONSE);
    }

    #[tokio::test]
    async fn test_delete_declined_is_noop() {
        let mut tracker = tracker(MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::No)]));
        tracker.load().await.unwrap();

        assert!(!tracker.delete("acme-tester", |_| false).await.unwrap());
        assert_eq!(tracker.jobs().len(), 1);
        assert!(tracker.store().deletes().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_and_resyncs() {
        let mut tracker = tracker(MockStore::with_jobs(vec![
            existing("Acme", "Tester", Applied::No),
            existing("Globex", "Engineer", Applied::No),
        ]));
        tracker.load().await.unwrap();

        assert!(tracker.delete("acme-tester", |job| job.company == "Acme").await.unwrap());

        assert!(tracker.get("acme-tester").is_none());
        assert_eq!(tracker.jobs().len(), 1);
        assert_eq!(tracker.store().deletes()[0].position, "Tester");
        assert_eq!(tracker.store().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_delete_removes_locally_even_if_remote_fails() {
        let store = MockStore {
            fail_writes: true,
            ..MockStore::with_jobs(vec![existing("Acme", "Tester", Applied::No)])
        };
        let mut tracker = tracker(store);
        tracker.load().await.unwrap();

        assert!(tracker.delete("acme-tester", |_| true).await.is_err());
        assert!(tracker.jobs().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let mut tracker = tracker(MockStore::default());
        let err = tracker.mark_applied("nope").await.unwrap_err();
        assert!(matches!(err, TrackerError::UnknownJob(id) if id == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_expires() {
        let mut tracker = tracker(MockStore::default()).with_notice_ttl(Duration::from_secs(3));
        tracker.create(draft("Acme", "Tester")).await.unwrap();
        assert!(tracker.notice().is_some());

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(tracker.notice().is_none());
    }
}
