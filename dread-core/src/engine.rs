//! SchedulingEngine: the only active component.
//!
//! A single periodic driver calls [`SchedulingEngine::tick`]. Each tick claims
//! due entries from the store (claim-before-process, so overlapping ticks never
//! deliver the same fire twice), renders and sends the messages concurrently,
//! and stores each task's next fire or expiry.
//!
//! Task creation, completion and cancellation are direct store writes and
//! never wait for a tick.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::MessageCatalog;
use crate::error::{NagError, Result};
use crate::notify::{EngineEvent, MessageKind, Notifier, Observer, OutboundMessage, TracingObserver};
use crate::planner::{Plan, ReminderPlanner};
use crate::store::{Claim, EntryKind, ScheduleEntry, ScheduleStore};
use crate::task::{Task, TaskState};
use crate::time::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub task_id: String,
    pub message: String,
    /// Wall-clock time between creation and completion.
    pub duration_since_creation: Duration,
    pub nag_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reminders: usize,
    pub expired: usize,
    pub delivery_failures: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RearmReport {
    pub rescheduled: usize,
    pub kept: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Reminded { delivered: bool },
    Expired { delivered: bool },
}

pub struct SchedulingEngine<C: Clock, S: ScheduleStore> {
    clock: C,
    store: S,
    planner: ReminderPlanner,
    catalog: MessageCatalog,
    notifier: Arc<dyn Notifier>,
    observer: Arc<dyn Observer>,
    // Serializes "read the user's fires, plan, store" so two tasks of one
    // user cannot both pick the same free slot.
    plan_lock: Mutex<()>,
}

impl<C: Clock, S: ScheduleStore> SchedulingEngine<C, S> {
    pub fn new(
        clock: C,
        store: S,
        planner: ReminderPlanner,
        catalog: MessageCatalog,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            store,
            planner,
            catalog,
            notifier,
            observer: Arc::new(TracingObserver),
            plan_lock: Mutex::new(()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn planner(&self) -> &ReminderPlanner {
        &self.planner
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Validate, register and schedule a new task.
    pub fn create_task(&self, user_id: &str, name: &str, dread: i64, urgency: i64) -> Result<Task> {
        let now = self.clock.now();
        let task = Task::from_request(Uuid::new_v4().to_string(), user_id, name, dread, urgency, now)?;
        self.store.insert_task(task.clone())?;
        if let Err(e) = self.on_task_created(&task) {
            self.store.remove_task(&task.id);
            return Err(e);
        }
        Ok(task)
    }

    /// Compute and store the first fire of an already-registered task.
    pub fn on_task_created(&self, task: &Task) -> Result<Plan> {
        let plan = self.schedule(task, self.clock.now())?;
        self.observer.observe(&EngineEvent::TaskCreated {
            task_id: task.id.clone(),
            user_id: task.user_id.clone(),
            first_fire: plan.at(),
        });
        Ok(plan)
    }

    /// Process every fire due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let claims = self.store.claim_due(now, self.planner.lifetime());
        if claims.is_empty() {
            return TickReport::default();
        }
        debug!(due = claims.len(), %now, "tick");

        let outcomes = join_all(claims.into_iter().map(|claim| self.process(claim, now))).await;

        let mut report = TickReport::default();
        for outcome in outcomes {
            let delivered = match outcome {
                Outcome::Reminded { delivered } => {
                    report.reminders += 1;
                    delivered
                }
                Outcome::Expired { delivered } => {
                    report.expired += 1;
                    delivered
                }
            };
            if !delivered {
                report.delivery_failures += 1;
            }
        }
        report
    }

    pub async fn complete_task(&self, task_id: &str) -> Result<CompletionResult> {
        let now = self.clock.now();
        // The nag count is read from the terminal snapshot, after any claim
        // that won the race has already counted its fire.
        let task = self.store.transition(task_id, TaskState::Completed, now)?;
        let elapsed = now - task.created_at;

        let message = self.catalog.completion_message(&task, elapsed, task.nag_count).await;
        self.deliver(&task, MessageKind::Completion, message.clone()).await;
        self.observer.observe(&EngineEvent::TaskCompleted {
            task_id: task.id.clone(),
            nag_count: task.nag_count,
            elapsed,
        });

        Ok(CompletionResult {
            task_id: task.id,
            message,
            duration_since_creation: elapsed,
            nag_count: task.nag_count,
        })
    }

    pub fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let task = self.store.transition(task_id, TaskState::Cancelled, self.clock.now())?;
        self.observer.observe(&EngineEvent::TaskCancelled {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// Bring stored tasks back under the driver after a restart.
    ///
    /// Tasks past their horizon expire now. Tasks without a pending entry get
    /// a fresh one; tasks that still have one keep it.
    pub async fn rearm(&self) -> RearmReport {
        let now = self.clock.now();
        let mut report = RearmReport::default();

        for task in self.store.active_tasks() {
            if self.planner.is_expired(&task, now) {
                if self.expire(&task, now).await.is_some() {
                    report.expired += 1;
                }
                continue;
            }
            if self.store.peek_fire_time(&task.id).is_some() {
                report.kept += 1;
                continue;
            }
            match self.schedule(&task, now) {
                Ok(_) => report.rescheduled += 1,
                Err(e) => {
                    if self.force_expire(&task, now, e).await.is_some() {
                        report.expired += 1;
                    }
                }
            }
        }
        info!(?report, "active tasks re-armed");
        report
    }

    /// Drive [`tick`](Self::tick) from a tokio interval until the handle is
    /// aborted.
    pub fn spawn(self: Arc<Self>, every: std::time::Duration) -> JoinHandle<()>
    where
        C: 'static,
        S: 'static,
    {
        tokio::spawn(async move {
            info!(every_ms = every.as_millis() as u64, "scheduling driver started");
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let report = self.tick(self.clock.now()).await;
                if report != TickReport::default() {
                    debug!(?report, "tick processed");
                }
            }
        })
    }

    async fn process(&self, claim: Claim, now: DateTime<Utc>) -> Outcome {
        let Claim { task, entry } = claim;

        let kind = match entry.kind {
            EntryKind::Reminder(kind) => kind,
            EntryKind::Expire => {
                let delivered = self.expire(&task, now).await.unwrap_or(true);
                return Outcome::Expired { delivered };
            }
        };

        let text = self.catalog.reminder_message(&task, kind, now).await;
        let delivered = self.deliver(&task, MessageKind::Reminder(kind), text).await;
        if delivered {
            self.observer.observe(&EngineEvent::ReminderSent {
                task_id: task.id.clone(),
                user_id: task.user_id.clone(),
                kind,
                nag_count: task.nag_count,
            });
        }

        // Delivery failures still advance the schedule.
        match self.schedule(&task, now) {
            Ok(Plan::Expire { at }) if at <= now => {
                self.expire(&task, now).await;
            }
            Ok(_) => {}
            Err(NagError::Cancelled(_) | NagError::AlreadyFinished { .. }) => {
                debug!(task_id = %task.id, "task finished while its reminder was in flight");
            }
            Err(e) => {
                self.force_expire(&task, now, e).await;
            }
        }
        Outcome::Reminded { delivered }
    }

    /// Plan against the user's other fires and store the result.
    fn schedule(&self, task: &Task, now: DateTime<Utc>) -> Result<Plan> {
        let _guard = self.plan_lock.lock().unwrap_or_else(|e| e.into_inner());

        let occupied = self.store.fire_times_for_user(&task.user_id, &task.id);
        let plan = self.planner.next_fire(task, now, &occupied)?;
        self.store.schedule_next(&task.id, ScheduleEntry::from(plan))?;

        self.observer.observe(&EngineEvent::Rescheduled {
            task_id: task.id.clone(),
            fire_at: plan.at(),
            expiring: matches!(plan, Plan::Expire { .. }),
        });
        Ok(plan)
    }

    /// Move to EXPIRED and send the notice. `None` if the task had already
    /// finished, otherwise whether the notice was delivered.
    async fn expire(&self, task: &Task, now: DateTime<Utc>) -> Option<bool> {
        let expired = match self.store.transition(&task.id, TaskState::Expired, now) {
            Ok(t) => t,
            Err(e) => {
                debug!(task_id = %task.id, error = %e, "expiry skipped");
                return None;
            }
        };

        let text = self.catalog.expiry_message(&expired, self.planner.lifetime());
        let delivered = self.deliver(&expired, MessageKind::Expired, text).await;
        self.observer.observe(&EngineEvent::TaskExpired {
            task_id: expired.id.clone(),
            nag_count: expired.nag_count,
        });
        Some(delivered)
    }

    async fn force_expire(&self, task: &Task, now: DateTime<Utc>, cause: NagError) -> Option<bool> {
        warn!(task_id = %task.id, error = %cause, "cannot plan next fire");
        self.observer.observe(&EngineEvent::ScheduleInconsistent {
            task_id: task.id.clone(),
            reason: cause.to_string(),
        });
        self.expire(task, now).await
    }

    async fn deliver(&self, task: &Task, kind: MessageKind, text: String) -> bool {
        let message = OutboundMessage {
            user_id: task.user_id.clone(),
            task_id: task.id.clone(),
            kind,
            text,
        };
        match self.notifier.notify(&message).await {
            Ok(()) => true,
            Err(e) => {
                self.observer.observe(&EngineEvent::DeliveryFailed {
                    task_id: task.id.clone(),
                    user_id: task.user_id.clone(),
                    error: format!("{e:#}"),
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::notify::ChannelNotifier;
    use crate::planner::FireKind;
    use crate::store::InMemoryStore;
    use crate::time::{ManualClock, TimeScale};
    use chrono::TimeZone;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    type Engine = SchedulingEngine<Arc<ManualClock>, InMemoryStore>;

    fn engine() -> (Engine, Arc<ManualClock>, UnboundedReceiver<OutboundMessage>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let (notifier, rx) = ChannelNotifier::new();
        let engine = SchedulingEngine::new(
            clock.clone(),
            InMemoryStore::new(),
            ReminderPlanner::from_config(&SchedulerConfig::default()).unwrap(),
            MessageCatalog::new(TimeScale::REAL_TIME).with_seed(3),
            Arc::new(notifier),
        );
        (engine, clock, rx)
    }

    #[tokio::test]
    async fn create_schedules_first_fire() {
        let (e, _clock, _rx) = engine();
        let t = e.create_task("u1", "taxes", 3, 5).unwrap();
        assert_eq!(e.store().peek_fire_time(&t.id), Some(t0() + Duration::minutes(20)));
    }

    #[tokio::test]
    async fn invalid_input_leaves_store_untouched() {
        let (e, _clock, _rx) = engine();
        assert!(matches!(
            e.create_task("u1", "taxes", 0, 3),
            Err(NagError::InvalidRating { field: "dread", .. })
        ));
        assert!(e.store().is_empty());
        assert!(matches!(e.cancel_task("nope"), Err(NagError::UnknownTask(_))));
        assert!(matches!(e.complete_task("nope").await, Err(NagError::UnknownTask(_))));
    }

    /// Accepts tasks but refuses to store any schedule.
    #[derive(Default)]
    struct NoSchedule(InMemoryStore);

    impl ScheduleStore for NoSchedule {
        fn insert_task(&self, task: Task) -> Result<()> {
            self.0.insert_task(task)
        }
        fn remove_task(&self, id: &str) -> Option<Task> {
            self.0.remove_task(id)
        }
        fn task(&self, id: &str) -> Option<Task> {
            self.0.task(id)
        }
        fn tasks_for_user(&self, user_id: &str) -> Vec<Task> {
            self.0.tasks_for_user(user_id)
        }
        fn active_tasks(&self) -> Vec<Task> {
            self.0.active_tasks()
        }
        fn schedule_next(&self, id: &str, _entry: ScheduleEntry) -> Result<()> {
            Err(NagError::Cancelled(id.to_string()))
        }
        fn due_tasks(&self, now: DateTime<Utc>) -> Vec<String> {
            self.0.due_tasks(now)
        }
        fn claim(&self, id: &str, now: DateTime<Utc>, lifetime: Duration) -> Option<Claim> {
            self.0.claim(id, now, lifetime)
        }
        fn transition(&self, id: &str, to: TaskState, at: DateTime<Utc>) -> Result<Task> {
            self.0.transition(id, to, at)
        }
        fn cancel_all(&self, id: &str) {
            self.0.cancel_all(id)
        }
        fn peek_fire_time(&self, id: &str) -> Option<DateTime<Utc>> {
            self.0.peek_fire_time(id)
        }
        fn fire_times_for_user(&self, user_id: &str, exclude: &str) -> Vec<DateTime<Utc>> {
            self.0.fire_times_for_user(user_id, exclude)
        }
    }

    #[tokio::test]
    async fn create_is_undone_when_first_fire_cannot_be_stored() {
        let (notifier, _rx) = ChannelNotifier::new();
        let e = SchedulingEngine::new(
            Arc::new(ManualClock::new(t0())),
            NoSchedule::default(),
            ReminderPlanner::from_config(&SchedulerConfig::default()).unwrap(),
            MessageCatalog::new(TimeScale::REAL_TIME),
            Arc::new(notifier),
        );

        assert!(matches!(e.create_task("u1", "taxes", 3, 5), Err(NagError::Cancelled(_))));
        assert!(e.store().active_tasks().is_empty());
        assert!(e.store().0.is_empty());
    }

    #[tokio::test]
    async fn tick_sends_counts_and_reschedules() {
        let (e, clock, mut rx) = engine();
        let t = e.create_task("u1", "taxes", 3, 5).unwrap();

        let now = clock.advance(Duration::minutes(20));
        let report = e.tick(now).await;
        assert_eq!(report.reminders, 1);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Reminder(FireKind::First));
        assert!(msg.text.starts_with("taxes"));

        let stored = e.store().task(&t.id).unwrap();
        assert_eq!(stored.nag_count, 1);
        assert_eq!(stored.last_fire_at, Some(now));
        assert_eq!(e.store().peek_fire_time(&t.id), Some(now + Duration::hours(1)));
    }

    #[tokio::test]
    async fn completion_reads_nag_count_and_purges_schedule() {
        let (e, clock, mut rx) = engine();
        let t = e.create_task("u1", "taxes", 5, 5).unwrap();
        e.tick(clock.advance(Duration::minutes(20))).await;
        rx.recv().await.unwrap();

        clock.advance(Duration::minutes(10));
        let result = e.complete_task(&t.id).await.unwrap();
        assert_eq!(result.nag_count, 1);
        assert_eq!(result.duration_since_creation, Duration::minutes(30));
        assert_eq!(e.store().peek_fire_time(&t.id), None);
        assert_eq!(e.store().task(&t.id).unwrap().state, TaskState::Completed);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.kind, MessageKind::Completion);
        assert_eq!(msg.text, result.message);

        assert!(matches!(
            e.complete_task(&t.id).await,
            Err(NagError::AlreadyFinished { .. })
        ));
    }

    #[tokio::test]
    async fn cancelled_task_is_never_claimed() {
        let (e, clock, mut rx) = engine();
        let t = e.create_task("u1", "taxes", 3, 5).unwrap();
        e.cancel_task(&t.id).unwrap();

        let report = e.tick(clock.advance(Duration::hours(30))).await;
        assert_eq!(report, TickReport::default());
        assert!(rx.try_recv().is_err());
        assert_eq!(e.store().task(&t.id).unwrap().state, TaskState::Cancelled);
    }

    #[tokio::test]
    async fn rearm_expires_stale_and_reschedules_orphans() {
        let (e, clock, mut rx) = engine();
        let stale = Task::from_request("old", "u1", "passport", 2, 2, t0() - Duration::hours(30)).unwrap();
        let orphan = Task::from_request("new", "u1", "dishes", 2, 2, t0() - Duration::hours(1)).unwrap();
        e.store().insert_task(stale).unwrap();
        e.store().insert_task(orphan).unwrap();

        let report = e.rearm().await;
        assert_eq!(report, RearmReport { rescheduled: 1, kept: 0, expired: 1 });
        assert_eq!(e.store().task("old").unwrap().state, TaskState::Expired);
        // First fire was due 40 minutes ago; it is clamped to now.
        assert_eq!(e.store().peek_fire_time("new"), Some(clock.now()));
        assert_eq!(rx.recv().await.unwrap().kind, MessageKind::Expired);
    }
}
