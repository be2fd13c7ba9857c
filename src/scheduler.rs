// =============================================================================
// Scheduler — single process-wide async job scheduler
// =============================================================================
//
// One instance, one background task per agent, keyed by agent name.
// Grounded on the teacher's `tokio::spawn` + `tokio::time::interval` loop
// idiom used throughout `main.rs`, lifted into a reusable registry so agents
// can be started and stopped individually instead of being wired as
// top-level `main` loops. A job's tick always runs to completion before its
// next tick is scheduled, which is what gives "two cycles of the same agent
// never overlap" for free — there is no concurrent second invocation to
// race against.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    fn interval_minutes(&self) -> u32;
    async fn tick(&self);
}

struct JobEntry {
    handle: JoinHandle<()>,
    interval_minutes: u32,
    next_run: Arc<RwLock<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub name: String,
    pub next_run: DateTime<Utc>,
    pub trigger: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs: Vec<JobStatus>,
    pub active_agents: usize,
}

pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Register and start a job. Adding a job under a name that is already
    /// running aborts the prior task and replaces it (idempotent restart).
    pub fn schedule(&self, job: Arc<dyn ScheduledJob>) {
        let name = job.name().to_string();
        let minutes = job.interval_minutes().max(1);

        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.remove(&name) {
            existing.handle.abort();
            info!(agent = %name, "replaced existing scheduled job");
        }

        let next_run = Arc::new(RwLock::new(Utc::now() + ChronoDuration::minutes(minutes as i64)));
        let next_run_task = next_run.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(StdDuration::from_secs(minutes as u64 * 60));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately; consume it, run on schedule from here
            loop {
                ticker.tick().await;
                job.tick().await;
                *next_run_task.write() = Utc::now() + ChronoDuration::minutes(minutes as i64);
                info!(agent = %task_name, "scheduled tick complete");
            }
        });

        jobs.insert(
            name,
            JobEntry {
                handle,
                interval_minutes: minutes,
                next_run,
            },
        );
    }

    pub fn stop(&self, name: &str) -> bool {
        let mut jobs = self.jobs.lock();
        match jobs.remove(name) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => {
                warn!(agent = %name, "stop requested for unknown job");
                false
            }
        }
    }

    pub fn stop_all(&self) {
        let mut jobs = self.jobs.lock();
        for (_, entry) in jobs.drain() {
            entry.handle.abort();
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.jobs.lock().contains_key(name)
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.lock();
        let job_statuses = jobs
            .iter()
            .map(|(name, entry)| JobStatus {
                id: name.clone(),
                name: name.clone(),
                next_run: *entry.next_run.read(),
                trigger: format!("every {}m", entry.interval_minutes),
            })
            .collect();
        SchedulerStatus {
            running: !jobs.is_empty(),
            active_agents: jobs.len(),
            jobs: job_statuses,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        name: String,
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ScheduledJob for CountingJob {
        fn name(&self) -> &str {
            &self.name
        }
        fn interval_minutes(&self) -> u32 {
            1
        }
        async fn tick(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn schedule_then_stop_is_idempotent() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(Arc::new(CountingJob {
            name: "agent-1".to_string(),
            count: count.clone(),
        }));
        assert!(scheduler.is_running("agent-1"));
        assert!(scheduler.stop("agent-1"));
        assert!(!scheduler.stop("agent-1"));
        assert!(!scheduler.is_running("agent-1"));
    }

    #[tokio::test]
    async fn status_reports_active_agents() {
        let scheduler = Scheduler::new();
        scheduler.schedule(Arc::new(CountingJob {
            name: "agent-1".to_string(),
            count: Arc::new(AtomicUsize::new(0)),
        }));
        let status = scheduler.status();
        assert_eq!(status.active_agents, 1);
        assert!(status.running);
    }

    #[tokio::test]
    async fn scheduling_same_name_replaces_prior_job() {
        let scheduler = Scheduler::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(Arc::new(CountingJob {
            name: "agent-1".to_string(),
            count: count_a.clone(),
        }));
        scheduler.schedule(Arc::new(CountingJob {
            name: "agent-1".to_string(),
            count: count_b.clone(),
        }));
        assert_eq!(scheduler.status().active_agents, 1);
    }
}
