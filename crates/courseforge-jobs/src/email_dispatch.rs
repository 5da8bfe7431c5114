//! Email program dispatcher.
//!
//! Wakes on a fixed interval, finds programs whose `next_run_at` has passed,
//! queues one send per recipient, and moves each program to its next fire
//! time. Runs missed while the server was down collapse into a single send.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courseforge_common::error::ForgeResult;
use courseforge_common::models::email::EmailProgram;
use courseforge_common::schedule::{parse_timezone, CronSchedule, ScheduleError};
use courseforge_db::repository::email;
use courseforge_db::Database;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Programs handled per dispatch cycle.
const DISPATCH_BATCH: i64 = 100;

/// Shortest wait between dispatch cycles.
pub const MIN_DISPATCH_INTERVAL: Duration = Duration::from_secs(1);

/// The slice of storage the dispatcher needs.
pub trait ProgramStore: Send + Sync {
    fn due_programs(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> impl Future<Output = ForgeResult<Vec<EmailProgram>>> + Send;

    fn recipients(&self, program: &EmailProgram) -> impl Future<Output = ForgeResult<Vec<Uuid>>> + Send;

    fn enqueue_sends(
        &self,
        program_id: Uuid,
        recipients: &[Uuid],
        scheduled_for: DateTime<Utc>,
    ) -> impl Future<Output = ForgeResult<u64>> + Send;

    /// `next_run_at = None` retires the program.
    fn advance(
        &self,
        program_id: Uuid,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = ForgeResult<()>> + Send;
}

/// [`ProgramStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgProgramStore {
    db: Database,
}

impl PgProgramStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl ProgramStore for PgProgramStore {
    async fn due_programs(&self, now: DateTime<Utc>, limit: i64) -> ForgeResult<Vec<EmailProgram>> {
        Ok(email::due_programs(&self.db.pg, now, limit).await?)
    }

    async fn recipients(&self, program: &EmailProgram) -> ForgeResult<Vec<Uuid>> {
        Ok(email::program_recipients(&self.db.pg, program).await?)
    }

    async fn enqueue_sends(
        &self,
        program_id: Uuid,
        recipients: &[Uuid],
        scheduled_for: DateTime<Utc>,
    ) -> ForgeResult<u64> {
        Ok(email::enqueue_program_sends(&self.db.pg, program_id, recipients, scheduled_for).await?)
    }

    async fn advance(
        &self,
        program_id: Uuid,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> ForgeResult<()> {
        Ok(email::advance_program(&self.db.pg, program_id, ran_at, next_run_at).await?)
    }
}

/// Next fire time of a stored program strictly after `after`.
pub fn next_fire(
    program: &EmailProgram,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ScheduleError> {
    let schedule = CronSchedule::from_cron(&program.cron)?;
    let tz = parse_timezone(&program.timezone)?;
    Ok(schedule.next_run(after, tz))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub programs: usize,
    pub sends_queued: u64,
    pub retired: usize,
    /// Programs skipped after a storage error; they stay due for the next cycle.
    pub failed: usize,
}

/// Run one dispatch cycle as of `now`.
///
/// A program whose sends cannot be queued is logged and skipped so the rest
/// of the batch still goes out.
pub async fn dispatch_due<S: ProgramStore>(store: &S, now: DateTime<Utc>) -> ForgeResult<DispatchSummary> {
    let mut summary = DispatchSummary::default();

    for program in store.due_programs(now, DISPATCH_BATCH).await? {
        summary.programs += 1;

        match dispatch_program(store, &program, now).await {
            Ok((queued, retired)) => {
                summary.sends_queued += queued;
                if retired {
                    summary.retired += 1;
                }
            }
            Err(e) => {
                error!(program_id = %program.id, error = %e, "Email program dispatch failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// Queue one program's sends and move it on. Returns `(queued, retired)`.
async fn dispatch_program<S: ProgramStore>(
    store: &S,
    program: &EmailProgram,
    now: DateTime<Utc>,
) -> ForgeResult<(u64, bool)> {
    let next_run_at = match next_fire(program, now) {
        Ok(next) => next,
        Err(e) => {
            warn!(program_id = %program.id, cron = %program.cron, error = %e, "Retiring program with unusable schedule");
            store.advance(program.id, now, None).await?;
            return Ok((0, true));
        }
    };

    let scheduled_for = program.next_run_at.unwrap_or(now);
    let recipients = store.recipients(program).await?;
    let queued = store
        .enqueue_sends(program.id, &recipients, scheduled_for)
        .await?;
    store.advance(program.id, now, next_run_at).await?;

    debug!(
        program_id = %program.id,
        recipients = recipients.len(),
        queued,
        next_run_at = ?next_run_at,
        "Email program dispatched"
    );

    Ok((queued, next_run_at.is_none()))
}

/// Periodic driver around [`dispatch_due`].
pub struct EmailDispatcher<S> {
    store: S,
    interval: Duration,
}

impl<S: ProgramStore> EmailDispatcher<S> {
    /// `interval` is raised to [`MIN_DISPATCH_INTERVAL`] when shorter.
    pub fn new(store: S, interval: Duration) -> Self {
        Self {
            store,
            interval: interval.max(MIN_DISPATCH_INTERVAL),
        }
    }

    /// Loop until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Email dispatcher started");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match dispatch_due(&self.store, Utc::now()).await {
                        Ok(summary) if summary.programs > 0 => info!(
                            programs = summary.programs,
                            sends_queued = summary.sends_queued,
                            retired = summary.retired,
                            failed = summary.failed,
                            "Email dispatch cycle complete"
                        ),
                        Ok(_) => trace!("No email programs due"),
                        Err(e) => error!(error = %e, "Email dispatch cycle failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Email dispatcher shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn program(cron: &str, timezone: &str, next_run_at: DateTime<Utc>) -> EmailProgram {
        EmailProgram {
            id: Uuid::now_v7(),
            owner_id: Uuid::now_v7(),
            course_id: None,
            name: "Weekly tips".into(),
            subject: "Tips".into(),
            body: "Hello".into(),
            schedule_text: "every monday at 9am".into(),
            cron: cron.into(),
            timezone: timezone.into(),
            active: true,
            next_run_at: Some(next_run_at),
            last_run_at: None,
            created_at: next_run_at,
            updated_at: next_run_at,
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        programs: Mutex<Vec<EmailProgram>>,
        recipients: Vec<Uuid>,
        sends: Mutex<Vec<(Uuid, Uuid, DateTime<Utc>)>>,
        broken_recipients: Option<Uuid>,
    }

    impl ProgramStore for MemoryStore {
        async fn due_programs(&self, now: DateTime<Utc>, limit: i64) -> ForgeResult<Vec<EmailProgram>> {
            Ok(self
                .programs
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.active && p.next_run_at.is_some_and(|t| t <= now))
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn recipients(&self, program: &EmailProgram) -> ForgeResult<Vec<Uuid>> {
            if self.broken_recipients == Some(program.id) {
                return Err(sqlx::Error::PoolTimedOut.into());
            }
            Ok(self.recipients.clone())
        }

        async fn enqueue_sends(
            &self,
            program_id: Uuid,
            recipients: &[Uuid],
            scheduled_for: DateTime<Utc>,
        ) -> ForgeResult<u64> {
            let mut sends = self.sends.lock().unwrap();
            sends.extend(recipients.iter().map(|r| (program_id, *r, scheduled_for)));
            Ok(recipients.len() as u64)
        }

        async fn advance(
            &self,
            program_id: Uuid,
            ran_at: DateTime<Utc>,
            next_run_at: Option<DateTime<Utc>>,
        ) -> ForgeResult<()> {
            let mut programs = self.programs.lock().unwrap();
            let program = programs.iter_mut().find(|p| p.id == program_id).unwrap();
            program.last_run_at = Some(ran_at);
            program.next_run_at = next_run_at;
            program.active = program.active && next_run_at.is_some();
            Ok(())
        }
    }

    #[tokio::test]
    async fn due_program_fans_out_and_advances() {
        let due = program("0 9 * * 1", "UTC", utc("2024-06-03T09:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![due.clone()]),
            recipients: vec![Uuid::now_v7(), Uuid::now_v7()],
            ..Default::default()
        };

        let summary = dispatch_due(&store, utc("2024-06-03T09:00:30Z")).await.unwrap();

        assert_eq!(summary.programs, 1);
        assert_eq!(summary.sends_queued, 2);
        let sends = store.sends.lock().unwrap();
        assert!(sends.iter().all(|(id, _, at)| *id == due.id && *at == utc("2024-06-03T09:00:00Z")));

        let programs = store.programs.lock().unwrap();
        assert_eq!(programs[0].next_run_at, Some(utc("2024-06-10T09:00:00Z")));
        assert_eq!(programs[0].last_run_at, Some(utc("2024-06-03T09:00:30Z")));
    }

    #[tokio::test]
    async fn next_run_is_computed_in_the_program_timezone() {
        // 09:00 in New York during EDT is 13:00 UTC
        let due = program("0 9 * * *", "America/New_York", utc("2024-06-03T13:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![due]),
            ..Default::default()
        };

        dispatch_due(&store, utc("2024-06-03T13:00:05Z")).await.unwrap();

        let programs = store.programs.lock().unwrap();
        assert_eq!(programs[0].next_run_at, Some(utc("2024-06-04T13:00:00Z")));
    }

    #[tokio::test]
    async fn missed_runs_collapse_into_one_send() {
        let stale = program("0 9 * * *", "UTC", utc("2024-06-01T09:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![stale]),
            recipients: vec![Uuid::now_v7()],
            ..Default::default()
        };

        let summary = dispatch_due(&store, utc("2024-06-05T12:00:00Z")).await.unwrap();

        assert_eq!(summary.sends_queued, 1);
        let programs = store.programs.lock().unwrap();
        assert_eq!(programs[0].next_run_at, Some(utc("2024-06-06T09:00:00Z")));
    }

    #[tokio::test]
    async fn broken_schedule_retires_the_program() {
        let broken = program("*/5 * * * *", "UTC", utc("2024-06-03T09:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![broken]),
            recipients: vec![Uuid::now_v7()],
            ..Default::default()
        };

        let summary = dispatch_due(&store, utc("2024-06-03T09:01:00Z")).await.unwrap();

        assert_eq!(summary.retired, 1);
        assert_eq!(summary.sends_queued, 0);
        let programs = store.programs.lock().unwrap();
        assert!(!programs[0].active);
        assert!(programs[0].next_run_at.is_none());
    }

    #[tokio::test]
    async fn programs_not_yet_due_are_left_alone() {
        let future = program("0 9 * * *", "UTC", utc("2024-06-04T09:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![future]),
            ..Default::default()
        };

        let summary = dispatch_due(&store, utc("2024-06-03T09:00:00Z")).await.unwrap();
        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn one_failing_program_does_not_starve_the_rest() {
        let broken = program("0 9 * * *", "UTC", utc("2024-06-03T09:00:00Z"));
        let healthy = program("0 9 * * *", "UTC", utc("2024-06-03T09:00:00Z"));
        let store = MemoryStore {
            programs: Mutex::new(vec![broken.clone(), healthy.clone()]),
            recipients: vec![Uuid::now_v7()],
            broken_recipients: Some(broken.id),
            ..Default::default()
        };

        let summary = dispatch_due(&store, utc("2024-06-03T09:00:10Z")).await.unwrap();

        assert_eq!(summary.programs, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sends_queued, 1);
        assert!(store.sends.lock().unwrap().iter().all(|(id, _, _)| *id == healthy.id));

        let programs = store.programs.lock().unwrap();
        // the failed program stays due and is retried next cycle
        assert_eq!(programs[0].next_run_at, Some(utc("2024-06-03T09:00:00Z")));
        assert_eq!(programs[1].next_run_at, Some(utc("2024-06-04T09:00:00Z")));
    }

    #[tokio::test]
    async fn zero_interval_is_raised_to_the_minimum() {
        let dispatcher = EmailDispatcher::new(MemoryStore::default(), Duration::ZERO);
        assert_eq!(dispatcher.interval, MIN_DISPATCH_INTERVAL);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });
        time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn dispatcher_stops_on_shutdown() {
        let dispatcher = Arc::new(EmailDispatcher::new(
            MemoryStore::default(),
            Duration::from_millis(10),
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run(shutdown_rx).await }
        });

        time::sleep(Duration::from_millis(30)).await;
        shutdown_tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }
}
