//! Reminder planner: when does a task get nagged next?
//!
//! Pure and deterministic. Given a task's state, the current time, and the
//! fire times already booked for the same user, it returns either the next
//! reminder slot or the expiry signal.
//!
//! Order of operations for a slot:
//! 1. cadence (first fire, early/late interval, check-in, final reminder)
//! 2. clamp to `now`
//! 3. quiet hours deferral
//! 4. collision avoidance against the user's other fires, re-checking quiet hours
//! 5. expiry horizon

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::{SchedulerConfig, UrgencyCadence};
use crate::error::NagError;
use crate::task::Task;
use crate::time::{parse_hhmm, parse_tz, QuietHours, TimeScale};

/// Upper bound on projected fires; the default table never gets close.
const MAX_PROJECTED_FIRES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireKind {
    /// Fixed nudge shortly after creation.
    First,
    /// Regular cadence, before the switch point.
    Early,
    /// Regular cadence, after the switch point.
    Late,
    /// Fixed check-in at `checkin_hours`.
    CheckIn,
    /// Last call before expiry.
    Final,
}

impl FireKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FireKind::First => "first",
            FireKind::Early => "early",
            FireKind::Late => "late",
            FireKind::CheckIn => "check-in",
            FireKind::Final => "final",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum Plan {
    Fire { at: DateTime<Utc>, kind: FireKind },
    /// No more reminders; the task expires at `at`.
    Expire { at: DateTime<Utc> },
}

impl Plan {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Plan::Fire { at, .. } | Plan::Expire { at } => *at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReminderPlanner {
    tz: Tz,
    quiet: QuietHours,
    scale: TimeScale,
    // Nominal (unscaled) durations.
    first_fire: Duration,
    spacing: Duration,
    expiry: Duration,
    switch_after: Duration,
    checkin_after: Duration,
    final_lead: Duration,
    cadence: Vec<UrgencyCadence>,
}

impl ReminderPlanner {
    pub fn from_config(cfg: &SchedulerConfig) -> Result<Self, NagError> {
        cfg.validate()?;
        let as_cfg = |e: anyhow::Error| NagError::Config(e.to_string());

        Ok(Self {
            tz: parse_tz(&cfg.timezone).map_err(as_cfg)?,
            quiet: QuietHours::new(
                parse_hhmm(&cfg.quiet_start).map_err(as_cfg)?,
                parse_hhmm(&cfg.quiet_end).map_err(as_cfg)?,
            ),
            scale: TimeScale::new(cfg.time_scale).map_err(as_cfg)?,
            first_fire: Duration::minutes(cfg.first_fire_minutes),
            spacing: Duration::minutes(cfg.collision_spacing_minutes),
            expiry: Duration::hours(cfg.expiry_hours),
            switch_after: Duration::hours(cfg.cadence_switch_hours),
            checkin_after: Duration::hours(cfg.checkin_hours),
            final_lead: Duration::minutes(cfg.final_lead_minutes),
            cadence: cfg.cadence.clone(),
        })
    }

    pub fn scale(&self) -> TimeScale {
        self.scale
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Wall-clock length of a nominal duration under the configured scale.
    fn scaled(&self, nominal: Duration) -> Duration {
        self.scale.compress(nominal)
    }

    /// Wall-clock time from creation to expiry.
    pub fn lifetime(&self) -> Duration {
        self.scaled(self.expiry)
    }

    pub fn expires_at(&self, task: &Task) -> DateTime<Utc> {
        task.created_at + self.lifetime()
    }

    pub fn is_expired(&self, task: &Task, now: DateTime<Utc>) -> bool {
        now >= self.expires_at(task)
    }

    /// Compute the next fire for `task`, or the expiry signal.
    ///
    /// `occupied` holds fire times already booked for the same user, excluding
    /// this task.
    pub fn next_fire(
        &self,
        task: &Task,
        now: DateTime<Utc>,
        occupied: &[DateTime<Utc>],
    ) -> Result<Plan, NagError> {
        if task.state.is_terminal() {
            return Err(self.inconsistent(task, format!("task is {}", task.state)));
        }

        let expiry = self.expires_at(task);
        let (slot, kind) = self.cadence_slot(task, expiry)?;
        let at = self.resolve(task, slot.max(now), occupied)?;

        if at >= expiry {
            return Ok(Plan::Expire { at: expiry });
        }
        Ok(Plan::Fire { at, kind })
    }

    /// Every fire the task would receive if it were never completed, ending
    /// with the expiry. Ignores other tasks.
    pub fn project(&self, task: &Task) -> Result<Vec<Plan>, NagError> {
        let mut t = task.clone();
        let mut out = Vec::new();

        while out.len() < MAX_PROJECTED_FIRES {
            let plan = self.next_fire(&t, t.created_at, &[])?;
            out.push(plan);
            match plan {
                Plan::Fire { at, .. } => {
                    t.last_fire_at = Some(at);
                    t.nag_count += 1;
                }
                Plan::Expire { .. } => return Ok(out),
            }
        }
        Err(self.inconsistent(task, "projection did not reach expiry".to_string()))
    }

    fn cadence_slot(
        &self,
        task: &Task,
        expiry: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, FireKind), NagError> {
        let created = task.created_at;
        let Some(base) = task.last_fire_at else {
            return Ok((created + self.scaled(self.first_fire), FireKind::First));
        };

        let urgency = task.urgency.get();
        let row = self
            .cadence
            .iter()
            .find(|c| c.urgency == urgency)
            .ok_or_else(|| self.inconsistent(task, format!("no cadence for urgency {urgency}")))?;

        let switch_at = created + self.scaled(self.switch_after);
        let (minutes, kind) = if base < switch_at {
            (row.early_minutes, FireKind::Early)
        } else {
            (row.late_minutes, FireKind::Late)
        };
        let mut slot = (base + self.scaled(Duration::minutes(minutes)), kind);

        if row.checkin {
            let checkin = created + self.scaled(self.checkin_after);
            if base < checkin && checkin < slot.0 {
                slot = (checkin, FireKind::CheckIn);
            }
        }
        if row.final_reminder {
            let last_call = expiry - self.scaled(self.final_lead);
            if base < last_call && slot.0 > last_call {
                slot = (last_call, FireKind::Final);
            }
        }
        Ok(slot)
    }

    /// Apply quiet hours and push past any of the user's fires closer than the
    /// collision spacing. Each shift lands at exactly `conflict + spacing`, so a
    /// conflict never recurs and the loop is bounded by `occupied.len()`.
    fn resolve(
        &self,
        task: &Task,
        candidate: DateTime<Utc>,
        occupied: &[DateTime<Utc>],
    ) -> Result<DateTime<Utc>, NagError> {
        let spacing = self.scaled(self.spacing);
        let mut at = self.defer_quiet(task, candidate)?;

        for _ in 0..=occupied.len() {
            let conflict = occupied
                .iter()
                .copied()
                .filter(|other| distance(at, *other) < spacing)
                .max();
            let Some(other) = conflict else {
                return Ok(at);
            };
            at = self.defer_quiet(task, other + spacing)?;
        }
        Err(self.inconsistent(task, "collision avoidance did not settle".to_string()))
    }

    fn defer_quiet(&self, task: &Task, at: DateTime<Utc>) -> Result<DateTime<Utc>, NagError> {
        self.quiet
            .defer(at, self.tz)
            .ok_or_else(|| self.inconsistent(task, format!("cannot resolve quiet-hours end after {at}")))
    }

    fn inconsistent(&self, task: &Task, reason: String) -> NagError {
        NagError::Schedule {
            task_id: task.id.clone(),
            reason,
        }
    }
}

fn distance(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a >= b { a - b } else { b - a }
}
