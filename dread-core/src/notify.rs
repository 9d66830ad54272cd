//! Outbound seams: message delivery and engine observability.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::planner::FireKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "message", content = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    Reminder(FireKind),
    Completion,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub user_id: String,
    pub task_id: String,
    pub kind: MessageKind,
    pub text: String,
}

/// Fire-and-forget delivery to the user's chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &OutboundMessage) -> anyhow::Result<()>;
}

/// Hands messages to an in-process queue; the host drains the receiver.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        self.tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("outbound queue closed"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    TaskCreated {
        task_id: String,
        user_id: String,
        first_fire: DateTime<Utc>,
    },
    ReminderSent {
        task_id: String,
        user_id: String,
        kind: FireKind,
        nag_count: u32,
    },
    DeliveryFailed {
        task_id: String,
        user_id: String,
        error: String,
    },
    Rescheduled {
        task_id: String,
        fire_at: DateTime<Utc>,
        expiring: bool,
    },
    TaskCompleted {
        task_id: String,
        nag_count: u32,
        #[serde(skip)]
        elapsed: Duration,
    },
    TaskCancelled {
        task_id: String,
    },
    TaskExpired {
        task_id: String,
        nag_count: u32,
    },
    ScheduleInconsistent {
        task_id: String,
        reason: String,
    },
}

pub trait Observer: Send + Sync {
    fn observe(&self, event: &EngineEvent);
}

/// Default observer: every event becomes a tracing event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn observe(&self, event: &EngineEvent) {
        match event {
            EngineEvent::TaskCreated {
                task_id,
                user_id,
                first_fire,
            } => info!(%task_id, %user_id, %first_fire, "task created"),
            EngineEvent::ReminderSent {
                task_id,
                user_id,
                kind,
                nag_count,
            } => info!(%task_id, %user_id, kind = kind.as_str(), nag_count, "reminder sent"),
            EngineEvent::DeliveryFailed {
                task_id,
                user_id,
                error,
            } => warn!(%task_id, %user_id, %error, "delivery failed; schedule advances anyway"),
            EngineEvent::Rescheduled {
                task_id,
                fire_at,
                expiring,
            } => debug!(%task_id, %fire_at, expiring, "next fire stored"),
            EngineEvent::TaskCompleted {
                task_id,
                nag_count,
                elapsed,
            } => info!(%task_id, nag_count, elapsed_secs = elapsed.num_seconds(), "task completed"),
            EngineEvent::TaskCancelled { task_id } => info!(%task_id, "task cancelled"),
            EngineEvent::TaskExpired { task_id, nag_count } => {
                info!(%task_id, nag_count, "task expired")
            }
            EngineEvent::ScheduleInconsistent { task_id, reason } => {
                error!(%task_id, %reason, "schedule inconsistency; forcing expiry")
            }
        }
    }
}
