//! Scheduler configuration surface.
//!
//! Every field has a default, so a partial `[scheduler]` table is valid.

use serde::{Deserialize, Serialize};

use crate::error::NagError;
use crate::time::{parse_hhmm, parse_tz, TimeScale};

/// Upper bound for every configured span. Keeps interval arithmetic far from
/// chrono's overflow limits.
const MAX_HOURS: i64 = 24 * 30;
const MAX_MINUTES: i64 = MAX_HOURS * 60;

/// Cadence for one urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyCadence {
    pub urgency: u8,
    /// Interval used while the task is younger than `cadence_switch_hours`.
    pub early_minutes: i64,
    /// Interval used afterwards.
    pub late_minutes: i64,
    /// Extra check-in at `checkin_hours` after creation.
    #[serde(default)]
    pub checkin: bool,
    /// Extra reminder `final_lead_minutes` before expiry.
    #[serde(default)]
    pub final_reminder: bool,
}

impl UrgencyCadence {
    const fn row(urgency: u8, early_minutes: i64, late_minutes: i64) -> Self {
        Self {
            urgency,
            early_minutes,
            late_minutes,
            checkin: false,
            final_reminder: false,
        }
    }
}

pub fn default_cadence() -> Vec<UrgencyCadence> {
    vec![
        UrgencyCadence {
            checkin: true,
            final_reminder: true,
            ..UrgencyCadence::row(1, 240, 240)
        },
        UrgencyCadence {
            checkin: true,
            ..UrgencyCadence::row(2, 180, 240)
        },
        UrgencyCadence::row(3, 120, 180),
        UrgencyCadence::row(4, 90, 120),
        UrgencyCadence::row(5, 60, 90),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// IANA timezone quiet hours are evaluated in.
    pub timezone: String,
    /// "HH:MM"
    pub quiet_start: String,
    /// "HH:MM"
    pub quiet_end: String,
    pub first_fire_minutes: i64,
    pub collision_spacing_minutes: i64,
    pub expiry_hours: i64,
    pub cadence_switch_hours: i64,
    pub checkin_hours: i64,
    pub final_lead_minutes: i64,
    /// 1 = real time. Only used for accelerated runs.
    pub time_scale: u32,
    pub cadence: Vec<UrgencyCadence>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            quiet_start: "23:00".to_string(),
            quiet_end: "07:00".to_string(),
            first_fire_minutes: 20,
            collision_spacing_minutes: 15,
            expiry_hours: 24,
            cadence_switch_hours: 4,
            checkin_hours: 12,
            final_lead_minutes: 30,
            time_scale: 1,
            cadence: default_cadence(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_timezone(mut self, tz: impl Into<String>) -> Self {
        self.timezone = tz.into();
        self
    }

    pub fn with_time_scale(mut self, factor: u32) -> Self {
        self.time_scale = factor;
        self
    }

    pub fn cadence_for(&self, urgency: u8) -> Option<&UrgencyCadence> {
        self.cadence.iter().find(|c| c.urgency == urgency)
    }

    pub fn validate(&self) -> Result<(), NagError> {
        let cfg = |e: String| NagError::Config(e);

        parse_tz(&self.timezone).map_err(|e| cfg(e.to_string()))?;
        parse_hhmm(&self.quiet_start).map_err(|e| cfg(format!("quiet_start: {e}")))?;
        parse_hhmm(&self.quiet_end).map_err(|e| cfg(format!("quiet_end: {e}")))?;
        TimeScale::new(self.time_scale).map_err(|e| cfg(e.to_string()))?;

        let positive = [
            ("first_fire_minutes", self.first_fire_minutes, MAX_MINUTES),
            ("expiry_hours", self.expiry_hours, MAX_HOURS),
            ("cadence_switch_hours", self.cadence_switch_hours, MAX_HOURS),
            ("checkin_hours", self.checkin_hours, MAX_HOURS),
        ];
        for (name, v, max) in positive {
            if !(1..=max).contains(&v) {
                return Err(cfg(format!("{name} must be between 1 and {max}")));
            }
        }
        let non_negative = [
            ("collision_spacing_minutes", self.collision_spacing_minutes),
            ("final_lead_minutes", self.final_lead_minutes),
        ];
        for (name, v) in non_negative {
            if !(0..=MAX_MINUTES).contains(&v) {
                return Err(cfg(format!("{name} must be between 0 and {MAX_MINUTES}")));
            }
        }

        for urgency in 1..=5u8 {
            let rows = self.cadence.iter().filter(|c| c.urgency == urgency).count();
            if rows != 1 {
                return Err(cfg(format!(
                    "cadence must have exactly one row for urgency {urgency} (found {rows})"
                )));
            }
        }
        if let Some(bad) = self
            .cadence
            .iter()
            .find(|c| {
                !(1..=MAX_MINUTES).contains(&c.early_minutes)
                    || !(1..=MAX_MINUTES).contains(&c.late_minutes)
                    || !(1..=5).contains(&c.urgency)
            })
        {
            return Err(cfg(format!("invalid cadence row for urgency {}", bad.urgency)));
        }
        Ok(())
    }
}
