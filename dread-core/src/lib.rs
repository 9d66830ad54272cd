//! dread-core: reminder scheduling and message selection for the dread nagging assistant

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod notify;
pub mod planner;
pub mod store;
pub mod task;
pub mod templates;
pub mod time;

pub use catalog::{CompletionProfile, DreadBand, Escalation, MessageCatalog, SpeedBand};
pub use config::{SchedulerConfig, UrgencyCadence};
pub use engine::{CompletionResult, RearmReport, SchedulingEngine, TickReport};
pub use error::NagError;
pub use generator::{GenerationRequest, GeneratorPolicy, MessageGenerator, Purpose};
pub use notify::{
    ChannelNotifier, EngineEvent, MessageKind, Notifier, Observer, OutboundMessage,
    TracingObserver,
};
pub use planner::{FireKind, Plan, ReminderPlanner};
pub use store::{Claim, EntryKind, InMemoryStore, ScheduleEntry, ScheduleStore};
pub use task::{Rating, Task, TaskState};
pub use time::{Clock, ManualClock, QuietHours, SystemClock, TimeScale};
