//! Task model for the nagging engine.
//!
//! Dread drives tone only. Urgency drives cadence only.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::NagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Active,
    Completed,
    Expired,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Active => "active",
            TaskState::Completed => "completed",
            TaskState::Expired => "expired",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 1..=5 rating. Construction is the only validation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(field: &'static str, value: i64) -> Result<Self, NagError> {
        if (i64::from(Self::MIN)..=i64::from(Self::MAX)).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(NagError::InvalidRating { field, value })
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = NagError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Rating::new("rating", i64::from(v))
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r.0
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// Owner; collision avoidance is per user.
    pub user_id: String,
    pub name: String,

    pub dread: Rating,
    pub urgency: Rating,

    pub created_at: DateTime<Utc>,

    /// Reminders emitted so far. Only ever increases.
    pub nag_count: u32,
    pub state: TaskState,
    pub last_fire_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        dread: Rating,
        urgency: Rating,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            name: name.into(),
            dread,
            urgency,
            created_at,
            nag_count: 0,
            state: TaskState::Active,
            last_fire_at: None,
            completed_at: None,
        }
    }

    /// Validate raw inbound values and build an active task.
    pub fn from_request(
        id: impl Into<String>,
        user_id: impl Into<String>,
        name: &str,
        dread: i64,
        urgency: i64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, NagError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(NagError::EmptyName);
        }
        let dread = Rating::new("dread", dread)?;
        let urgency = Rating::new("urgency", urgency)?;
        Ok(Self::new(id, user_id, name, dread, urgency, created_at))
    }

    pub fn is_active(&self) -> bool {
        self.state == TaskState::Active
    }

    pub fn with_nag_count(mut self, nag_count: u32) -> Self {
        self.nag_count = nag_count;
        self
    }

    pub fn with_last_fire(mut self, at: DateTime<Utc>) -> Self {
        self.last_fire_at = Some(at);
        self
    }
}
