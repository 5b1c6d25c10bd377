//! Timezone-aware cron runner driving the Planner and Dispatcher with
//! reentrancy guards (spec §4.1). Runner shape grounded on the
//! `other_examples` gateway scheduler: compute the next fire time,
//! sleep capped at a poll interval, race against a `CancellationToken`.
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::dispatcher::Dispatcher;
use crate::app::planner::Planner;
use crate::app::stores::{PlannedMessageStore, UserStore};
use crate::config::dispatcher::DispatcherConfig;
use crate::config::scheduler::SchedulerConfig;

const POLL_INTERVAL: Duration = Duration::from_secs(30);

fn parse_cron(expr: &str) -> anyhow::Result<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let full_expr = match fields.len() {
        5 => format!("0 {expr} *"),
        6 => format!("0 {expr}"),
        7 => expr.to_string(),
        _ => anyhow::bail!("invalid cron expression (expected 5-7 fields): {expr}"),
    };
    Schedule::from_str(&full_expr).map_err(|e| anyhow::anyhow!("invalid cron expression '{expr}': {e}"))
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskStatus {
    pub is_scheduled: bool,
    pub is_running: bool,
    pub next_execution: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStatus {
    pub planner: Option<TaskStatus>,
    pub dispatcher: Option<TaskStatus>,
    pub planner_runs: u64,
    pub planner_skipped: u64,
    pub planner_failures: u64,
    pub dispatcher_runs: u64,
    pub dispatcher_skipped: u64,
    pub dispatcher_failures: u64,
}

struct TaskHandle {
    schedule: Schedule,
    running: Arc<AtomicBool>,
    runs: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    failures: Arc<AtomicU64>,
}

impl TaskHandle {
    fn status(&self, timezone: Tz) -> TaskStatus {
        TaskStatus {
            is_scheduled: true,
            is_running: self.running.load(Ordering::SeqCst),
            next_execution: self.schedule.upcoming(timezone).next().map(|t| t.with_timezone(&Utc)),
        }
    }
}

pub struct Scheduler<U: UserStore + 'static, P: PlannedMessageStore + Send + Sync + 'static> {
    planner: Arc<Planner<U, P>>,
    dispatcher: Arc<Dispatcher<P>>,
    timezone: Tz,
    planner_task: TaskHandle,
    dispatcher_task: TaskHandle,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<U, P> Scheduler<U, P>
where
    U: UserStore + Send + Sync + 'static,
    P: PlannedMessageStore + Send + Sync + 'static,
{
    pub fn new(planner: Arc<Planner<U, P>>, dispatcher: Arc<Dispatcher<P>>, scheduler_config: &SchedulerConfig, dispatcher_config: &DispatcherConfig) -> anyhow::Result<Self> {
        let timezone: Tz = scheduler_config.timezone.parse().map_err(|_| anyhow::anyhow!("invalid timezone: {}", scheduler_config.timezone))?;

        Ok(Self {
            planner,
            dispatcher,
            timezone,
            planner_task: TaskHandle {
                schedule: parse_cron(&scheduler_config.planner_cron)?,
                running: Arc::new(AtomicBool::new(false)),
                runs: Arc::new(AtomicU64::new(0)),
                skipped: Arc::new(AtomicU64::new(0)),
                failures: Arc::new(AtomicU64::new(0)),
            },
            dispatcher_task: TaskHandle {
                schedule: parse_cron(&dispatcher_config.cron)?,
                running: Arc::new(AtomicBool::new(false)),
                runs: Arc::new(AtomicU64::new(0)),
                skipped: Arc::new(AtomicU64::new(0)),
                failures: Arc::new(AtomicU64::new(0)),
            },
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            planner: Some(self.planner_task.status(self.timezone)),
            dispatcher: Some(self.dispatcher_task.status(self.timezone)),
            planner_runs: self.planner_task.runs.load(Ordering::SeqCst),
            planner_skipped: self.planner_task.skipped.load(Ordering::SeqCst),
            planner_failures: self.planner_task.failures.load(Ordering::SeqCst),
            dispatcher_runs: self.dispatcher_task.runs.load(Ordering::SeqCst),
            dispatcher_skipped: self.dispatcher_task.skipped.load(Ordering::SeqCst),
            dispatcher_failures: self.dispatcher_task.failures.load(Ordering::SeqCst),
        }
    }

    /// Runs the Planner now, honoring the reentrancy guard. Shared by
    /// the cron loop and manual trigger entry points (tests, CLI).
    pub async fn trigger_planner_now(&self) {
        run_guarded("planner", &self.planner_task, {
            let planner = Arc::clone(&self.planner);
            move || {
                let planner = Arc::clone(&planner);
                async move { planner.plan_automatic_messages().await.map(|_| ()).map_err(|e| e.to_string()) }
            }
        })
        .await;
    }

    pub async fn trigger_dispatcher_now(&self) {
        run_guarded("dispatcher", &self.dispatcher_task, {
            let dispatcher = Arc::clone(&self.dispatcher);
            move || {
                let dispatcher = Arc::clone(&dispatcher);
                async move { dispatcher.process_pending_messages().await.map(|_| ()).map_err(|e| e.to_string()) }
            }
        })
        .await;
    }

    pub fn start(self: &Arc<Self>) {
        let mut handles = Vec::new();

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            scheduler.run_loop(true).await;
        }));

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            scheduler.run_loop(false).await;
        }));

        // Can't `await` in a non-async fn; stash synchronously via try_lock
        // since no other task holds this lock before `start` returns.
        if let Ok(mut guard) = self.handles.try_lock() {
            *guard = handles;
        }
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    async fn run_loop(self: Arc<Self>, is_planner: bool) {
        loop {
            let schedule = if is_planner { &self.planner_task.schedule } else { &self.dispatcher_task.schedule };
            let Some(fire_time) = schedule.upcoming(self.timezone).next() else {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                    _ = self.shutdown.cancelled() => return,
                }
            };

            let now = Utc::now().with_timezone(&self.timezone);
            let delay = (fire_time - now).to_std().unwrap_or(Duration::ZERO);
            let capped = delay.min(POLL_INTERVAL);

            tokio::select! {
                _ = tokio::time::sleep(capped) => {
                    if Utc::now().with_timezone(&self.timezone) < fire_time {
                        continue;
                    }
                }
                _ = self.shutdown.cancelled() => return,
            }

            if is_planner {
                self.trigger_planner_now().await;
            } else {
                self.trigger_dispatcher_now().await;
            }
        }
    }
}

async fn run_guarded<F, Fut>(name: &str, task: &TaskHandle, work: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    if task.running.swap(true, Ordering::SeqCst) {
        task.skipped.fetch_add(1, Ordering::SeqCst);
        warn!(task = name, "skipped overlapping run");
        return;
    }

    let result = work().await;
    task.running.store(false, Ordering::SeqCst);

    match result {
        Ok(()) => {
            task.runs.fetch_add(1, Ordering::SeqCst);
            info!(task = name, "scheduled task completed");
        }
        Err(e) => {
            task.runs.fetch_add(1, Ordering::SeqCst);
            task.failures.fetch_add(1, Ordering::SeqCst);
            error!(task = name, error = %e, "scheduled task failed");
        }
    }
}
