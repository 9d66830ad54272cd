//! Per-task schedule state.
//!
//! The store owns canonical task copies plus at most one pending entry per
//! task. Every mutation is a single critical section, so concurrent ticks can
//! share one store without double-claiming a fire.
//!
//! Layout of [`InMemoryStore`]:
//! - `tasks`: id -> Task
//! - `entries`: id -> pending ScheduleEntry (replace, never append)
//! - `by_user`: user_id -> set(task_id), for collision lookups
//! - `cancelled`: ids whose schedule was cancelled; nothing may be stored for
//!   them afterwards

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NagError, Result};
use crate::planner::{FireKind, Plan};
use crate::task::{Task, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entry", content = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Reminder(FireKind),
    Expire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub fire_at: DateTime<Utc>,
    pub kind: EntryKind,
}

impl From<Plan> for ScheduleEntry {
    fn from(plan: Plan) -> Self {
        match plan {
            Plan::Fire { at, kind } => ScheduleEntry {
                fire_at: at,
                kind: EntryKind::Reminder(kind),
            },
            Plan::Expire { at } => ScheduleEntry {
                fire_at: at,
                kind: EntryKind::Expire,
            },
        }
    }
}

/// A due entry taken out of the store by exactly one caller.
///
/// For reminders, `task` already reflects the fire (nag count incremented,
/// `last_fire_at` set to the claim time). A reminder claimed at or past the
/// task's lifetime comes back as an `Expire` entry and is not counted.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub task: Task,
    pub entry: ScheduleEntry,
}

pub trait ScheduleStore: Send + Sync {
    fn insert_task(&self, task: Task) -> Result<()>;

    /// Forget a task entirely. Only for undoing a registration that could not
    /// be scheduled.
    fn remove_task(&self, id: &str) -> Option<Task>;

    fn task(&self, id: &str) -> Option<Task>;

    fn tasks_for_user(&self, user_id: &str) -> Vec<Task>;

    fn active_tasks(&self) -> Vec<Task>;

    /// Store `entry` as the task's only pending fire.
    fn schedule_next(&self, id: &str, entry: ScheduleEntry) -> Result<()>;

    /// Ids with an entry due at or before `now`, earliest first.
    fn due_tasks(&self, now: DateTime<Utc>) -> Vec<String>;

    /// Take the task's due entry. `None` if another caller got it first, the
    /// entry is not due yet, or the task is no longer schedulable.
    ///
    /// `lifetime` is the wall-clock span after `created_at` past which a due
    /// reminder turns into an expiry.
    fn claim(&self, id: &str, now: DateTime<Utc>, lifetime: Duration) -> Option<Claim>;

    fn claim_due(&self, now: DateTime<Utc>, lifetime: Duration) -> Vec<Claim> {
        self.due_tasks(now)
            .iter()
            .filter_map(|id| self.claim(id, now, lifetime))
            .collect()
    }

    /// Move an active task to a terminal state and drop its schedule.
    fn transition(&self, id: &str, to: TaskState, at: DateTime<Utc>) -> Result<Task>;

    /// Drop any pending entry and refuse future ones. Idempotent.
    fn cancel_all(&self, id: &str);

    fn peek_fire_time(&self, id: &str) -> Option<DateTime<Utc>>;

    /// Pending reminder times of the user's other tasks.
    fn fire_times_for_user(&self, user_id: &str, exclude: &str) -> Vec<DateTime<Utc>>;
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    entries: HashMap<String, ScheduleEntry>,
    by_user: HashMap<String, HashSet<String>>,
    cancelled: HashSet<String>,
}

impl Inner {
    fn schedulable(&self, id: &str) -> bool {
        !self.cancelled.contains(id) && self.tasks.get(id).is_some_and(Task::is_active)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }

    pub fn entry(&self, id: &str) -> Option<ScheduleEntry> {
        self.lock().entries.get(id).copied()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ScheduleStore for InMemoryStore {
    fn insert_task(&self, task: Task) -> Result<()> {
        let mut inner = self.lock();
        if inner.tasks.contains_key(&task.id) {
            return Err(NagError::DuplicateTask(task.id));
        }
        inner
            .by_user
            .entry(task.user_id.clone())
            .or_default()
            .insert(task.id.clone());
        inner.tasks.insert(task.id.clone(), task);
        Ok(())
    }

    fn remove_task(&self, id: &str) -> Option<Task> {
        let mut inner = self.lock();
        let task = inner.tasks.remove(id)?;
        inner.entries.remove(id);
        inner.cancelled.remove(id);
        if let Some(ids) = inner.by_user.get_mut(&task.user_id) {
            ids.remove(id);
            if ids.is_empty() {
                inner.by_user.remove(&task.user_id);
            }
        }
        Some(task)
    }

    fn task(&self, id: &str) -> Option<Task> {
        self.lock().tasks.get(id).cloned()
    }

    fn tasks_for_user(&self, user_id: &str) -> Vec<Task> {
        let inner = self.lock();
        let Some(ids) = inner.by_user.get(user_id) else {
            return vec![];
        };
        let mut out: Vec<Task> = ids.iter().filter_map(|id| inner.tasks.get(id)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    fn active_tasks(&self) -> Vec<Task> {
        let inner = self.lock();
        let mut out: Vec<Task> = inner.tasks.values().filter(|t| t.is_active()).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    fn schedule_next(&self, id: &str, entry: ScheduleEntry) -> Result<()> {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.get(id) else {
            return Err(NagError::UnknownTask(id.to_string()));
        };
        if inner.cancelled.contains(id) {
            return Err(NagError::Cancelled(id.to_string()));
        }
        if task.state.is_terminal() {
            return Err(NagError::AlreadyFinished {
                id: id.to_string(),
                state: task.state.as_str(),
            });
        }
        inner.entries.insert(id.to_string(), entry);
        Ok(())
    }

    fn due_tasks(&self, now: DateTime<Utc>) -> Vec<String> {
        let inner = self.lock();
        let mut due: Vec<(DateTime<Utc>, &String)> = inner
            .entries
            .iter()
            .filter(|(id, e)| e.fire_at <= now && inner.schedulable(id))
            .map(|(id, e)| (e.fire_at, id))
            .collect();
        due.sort();
        due.into_iter().map(|(_, id)| id.clone()).collect()
    }

    fn claim(&self, id: &str, now: DateTime<Utc>, lifetime: Duration) -> Option<Claim> {
        let mut inner = self.lock();
        if !inner.schedulable(id) {
            return None;
        }
        let mut entry = *inner.entries.get(id)?;
        if entry.fire_at > now {
            return None;
        }
        inner.entries.remove(id);

        let task = inner.tasks.get_mut(id)?;
        if let EntryKind::Reminder(_) = entry.kind {
            if now >= task.created_at + lifetime {
                entry.kind = EntryKind::Expire;
            } else {
                task.nag_count += 1;
                task.last_fire_at = Some(now);
            }
        }
        Some(Claim {
            task: task.clone(),
            entry,
        })
    }

    fn transition(&self, id: &str, to: TaskState, at: DateTime<Utc>) -> Result<Task> {
        let mut inner = self.lock();
        let Some(task) = inner.tasks.get_mut(id) else {
            return Err(NagError::UnknownTask(id.to_string()));
        };
        if task.state.is_terminal() {
            return Err(NagError::AlreadyFinished {
                id: id.to_string(),
                state: task.state.as_str(),
            });
        }
        if !to.is_terminal() {
            return Err(NagError::Schedule {
                task_id: id.to_string(),
                reason: format!("cannot move back to {to}"),
            });
        }

        task.state = to;
        if to == TaskState::Completed {
            task.completed_at = Some(at);
        }
        let task = task.clone();
        inner.entries.remove(id);
        inner.cancelled.insert(id.to_string());
        Ok(task)
    }

    fn cancel_all(&self, id: &str) {
        let mut inner = self.lock();
        inner.entries.remove(id);
        if inner.tasks.contains_key(id) {
            inner.cancelled.insert(id.to_string());
        }
    }

    fn peek_fire_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.get(id).map(|e| e.fire_at)
    }

    fn fire_times_for_user(&self, user_id: &str, exclude: &str) -> Vec<DateTime<Utc>> {
        let inner = self.lock();
        let Some(ids) = inner.by_user.get(user_id) else {
            return vec![];
        };
        let mut out: Vec<DateTime<Utc>> = ids
            .iter()
            .filter(|id| id.as_str() != exclude && inner.schedulable(id))
            .filter_map(|id| inner.entries.get(id))
            .filter(|e| matches!(e.kind, EntryKind::Reminder(_)))
            .map(|e| e.fire_at)
            .collect();
        out.sort();
        out
    }
}
