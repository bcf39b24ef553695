//! Debounced per-bundle rebuild scheduler (§4.11 / C11).
//!
//! Per-bundle state machine `idle → queued → running` with a latent
//! `queued-again` bit. `schedule` resets a debounce timer; when it fires
//! the bundle transitions to `running` and the builder callback runs.
//! Arrivals during `running` set `queued-again` and, on completion,
//! trigger exactly one more `schedule` (without `force`, unless `force`
//! was set again while running).
//!
//! Timers are modeled with `tokio::time::sleep` tasks per bundle, mirroring
//! the single-flight, per-key critical-section idiom [`latchflow_authz::guard::RateLimiter`]
//! uses for its sliding windows — one `Mutex`-guarded entry per key instead
//! of a global lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Queued,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastRunStatus {
    Built,
    Skipped,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastRun {
    pub when: DateTime<Utc>,
    pub status: LastRunStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleStatus {
    pub state: SchedulerState,
    pub last: Option<LastRun>,
}

struct BundleSlot {
    state: SchedulerState,
    force: bool,
    queued_again: bool,
    last: Option<LastRun>,
    timer: Option<JoinHandle<()>>,
}

impl Default for BundleSlot {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
            force: false,
            queued_again: false,
            last: None,
            timer: None,
        }
    }
}

/// A rebuild outcome reported back to the scheduler by the builder
/// callback, distinct from the transport-level `Result` so a build
/// failure doesn't abort the scheduler's own bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Built,
    Skipped,
    Failed(String),
}

/// Per-bundle debounced rebuild scheduler. Generic over the builder
/// callback so the scheduler itself stays storage-agnostic; wiring it to
/// [`crate::bundle::build_bundle_artifact`] is the caller's job.
pub struct RebuildScheduler<F>
where
    F: Fn(String, bool) -> futures::future::BoxFuture<'static, RebuildOutcome> + Send + Sync + 'static,
{
    slots: Arc<DashMap<String, Mutex<BundleSlot>>>,
    debounce: Duration,
    builder: Arc<F>,
}

impl<F> RebuildScheduler<F>
where
    F: Fn(String, bool) -> futures::future::BoxFuture<'static, RebuildOutcome> + Send + Sync + 'static,
{
    pub fn new(builder: F) -> Self {
        Self::with_debounce(builder, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(builder: F, debounce: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            debounce,
            builder: Arc::new(builder),
        }
    }

    fn slot(&self, bundle_id: &str) -> Arc<DashMap<String, Mutex<BundleSlot>>> {
        self.slots.entry(bundle_id.to_owned()).or_default();
        self.slots.clone()
    }

    /// `schedule(bundleId, {force?})`: resets the debounce timer, sets the
    /// sticky force flag, and (if not already running) arms a fresh timer.
    pub async fn schedule(&self, bundle_id: &str, force: bool) {
        let slots = self.slot(bundle_id);
        let entry = slots.get(bundle_id).expect("slot just inserted");
        let mut guard = entry.value().lock().await;

        guard.force = guard.force || force;

        match guard.state {
            SchedulerState::Running => {
                guard.queued_again = true;
                debug!(bundle_id, "rebuild requested while running, marking queued-again");
            }
            SchedulerState::Idle | SchedulerState::Queued => {
                guard.state = SchedulerState::Queued;
                if let Some(old_timer) = guard.timer.take() {
                    old_timer.abort();
                }
                let bundle_id_owned = bundle_id.to_owned();
                let slots_for_timer = self.slots.clone();
                let builder = self.builder.clone();
                let debounce = self.debounce;
                guard.timer = Some(tokio::spawn(async move {
                    tokio::time::sleep(debounce).await;
                    Self::fire(slots_for_timer, builder, bundle_id_owned).await;
                }));
            }
        }
    }

    /// `scheduleForFiles(fileIds, opts?)`: schedule every bundle that the
    /// provided lookup associates with any of `file_ids`.
    pub async fn schedule_for_files(&self, file_ids: &[String], bundles_by_file: &HashMap<String, Vec<String>>, force: bool) {
        let mut distinct: Vec<String> = file_ids
            .iter()
            .filter_map(|id| bundles_by_file.get(id))
            .flatten()
            .cloned()
            .collect();
        distinct.sort();
        distinct.dedup();
        for bundle_id in distinct {
            self.schedule(&bundle_id, force).await;
        }
    }

    pub fn status(&self, bundle_id: &str) -> BundleStatus {
        match self.slots.get(bundle_id) {
            None => BundleStatus {
                state: SchedulerState::Idle,
                last: None,
            },
            Some(entry) => {
                let guard = entry.value().try_lock();
                match guard {
                    Ok(guard) => BundleStatus {
                        state: guard.state,
                        last: guard.last.clone(),
                    },
                    Err(_) => BundleStatus {
                        state: SchedulerState::Running,
                        last: None,
                    },
                }
            }
        }
    }

    async fn fire(slots: Arc<DashMap<String, Mutex<BundleSlot>>>, builder: Arc<F>, bundle_id: String) {
        let force = {
            let entry = match slots.get(&bundle_id) {
                Some(e) => e,
                None => return,
            };
            let mut guard = entry.value().lock().await;
            guard.state = SchedulerState::Running;
            guard.timer = None;
            let force = guard.force;
            guard.force = false;
            force
        };

        let outcome = builder(bundle_id.clone(), force).await;

        let entry = match slots.get(&bundle_id) {
            Some(e) => e,
            None => return,
        };
        let mut guard = entry.value().lock().await;

        guard.last = Some(LastRun {
            when: Utc::now(),
            status: match &outcome {
                RebuildOutcome::Built => LastRunStatus::Built,
                RebuildOutcome::Skipped => LastRunStatus::Skipped,
                RebuildOutcome::Failed(e) => LastRunStatus::Error(e.clone()),
            },
        });

        if matches!(outcome, RebuildOutcome::Failed(_)) {
            warn!(bundle_id = %bundle_id, "bundle rebuild failed");
        }

        if guard.queued_again {
            guard.queued_again = false;
            guard.state = SchedulerState::Idle;
            let refire_force = guard.force;
            drop(guard);
            // Re-enter through `schedule` so single-flight bookkeeping
            // (timer management, force stickiness) stays in one place.
            let rescheduler = Self {
                slots: slots.clone(),
                debounce: Duration::from_millis(0),
                builder: builder.clone(),
            };
            rescheduler.schedule(&bundle_id, refire_force).await;
        } else {
            guard.state = SchedulerState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::advance;

    fn counting_builder(counter: Arc<AtomicUsize>) -> impl Fn(String, bool) -> futures::future::BoxFuture<'static, RebuildOutcome> + Send + Sync + 'static {
        move |_bundle_id, _force| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                RebuildOutcome::Built
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_schedule_fires_after_debounce() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = RebuildScheduler::with_debounce(counting_builder(counter.clone()), Duration::from_millis(50));

        scheduler.schedule("bundle-1", false).await;
        assert_eq!(scheduler.status("bundle-1").state, SchedulerState::Queued);

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status("bundle-1").state, SchedulerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_schedules_within_window_collapse_to_one_build() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = RebuildScheduler::with_debounce(counting_builder(counter.clone()), Duration::from_millis(50));

        scheduler.schedule("bundle-1", false).await;
        advance(Duration::from_millis(20)).await;
        scheduler.schedule("bundle-1", false).await;
        advance(Duration::from_millis(20)).await;
        scheduler.schedule("bundle-1", false).await;

        advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_bundles_are_independent() {
        let scheduler = RebuildScheduler::with_debounce(counting_builder(Arc::new(AtomicUsize::new(0))), Duration::from_millis(1));
        scheduler.schedule("a", false).await;
        scheduler.schedule("b", false).await;
        assert_eq!(scheduler.status("a").state, SchedulerState::Queued);
        assert_eq!(scheduler.status("b").state, SchedulerState::Queued);
    }

    #[tokio::test]
    async fn unknown_bundle_reports_idle_with_no_history() {
        let scheduler = RebuildScheduler::with_debounce(counting_builder(Arc::new(AtomicUsize::new(0))), Duration::from_millis(1));
        let status = scheduler.status("never-scheduled");
        assert_eq!(status.state, SchedulerState::Idle);
        assert!(status.last.is_none());
    }
}
