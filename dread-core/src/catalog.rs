//! Message catalog: what a nag (or a completion) says.
//!
//! Selection is split in two layers:
//! - pure classification ([`ReminderKey`], [`CompletionProfile`]) from the
//!   task's numbers, unit-testable without any text;
//! - rendering, which picks uniformly from the matching static pool, or asks
//!   the optional generator once and falls back to the pool.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::generator::{accept, GenerationRequest, GeneratorPolicy, MessageGenerator, Purpose};
use crate::planner::FireKind;
use crate::task::Task;
use crate::templates::{self, render};
use crate::time::TimeScale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DreadBand {
    /// Dread 1-3.
    Firm,
    /// Dread 4-5.
    Savage,
}

impl DreadBand {
    pub fn of(dread: u8) -> Self {
        if dread >= 4 { DreadBand::Savage } else { DreadBand::Firm }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// Up to 2 nags.
    Opening,
    /// Nags 3-5.
    Pressing,
    /// Nag 6 onwards.
    Relentless,
}

impl Escalation {
    pub fn of(nag_count: u32) -> Self {
        match nag_count {
            0..=2 => Escalation::Opening,
            3..=5 => Escalation::Pressing,
            _ => Escalation::Relentless,
        }
    }
}

/// Which pool a reminder is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderKey {
    Regular(DreadBand, Escalation),
    CheckIn,
    Final,
}

impl ReminderKey {
    pub fn classify(dread: u8, nag_count: u32, kind: FireKind) -> Self {
        match kind {
            FireKind::CheckIn => ReminderKey::CheckIn,
            FireKind::Final => ReminderKey::Final,
            _ => ReminderKey::Regular(DreadBand::of(dread), Escalation::of(nag_count)),
        }
    }

    pub fn pool(&self) -> &'static [&'static str] {
        use DreadBand::*;
        use Escalation::*;
        match self {
            ReminderKey::Regular(Firm, Opening) => templates::FIRM_OPENING,
            ReminderKey::Regular(Firm, Pressing) => templates::FIRM_PRESSING,
            ReminderKey::Regular(Firm, Relentless) => templates::FIRM_RELENTLESS,
            ReminderKey::Regular(Savage, Opening) => templates::SAVAGE_OPENING,
            ReminderKey::Regular(Savage, Pressing) => templates::SAVAGE_PRESSING,
            ReminderKey::Regular(Savage, Relentless) => templates::SAVAGE_RELENTLESS,
            ReminderKey::CheckIn => templates::CHECKIN,
            ReminderKey::Final => templates::FINAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedBand {
    /// < 15 min
    Blazing,
    /// 15-30 min
    Fast,
    /// 30 min - 2 h
    Normal,
    /// 2-4 h
    Slow,
    /// >= 4 h
    Glacial,
}

impl SpeedBand {
    /// Classify a nominal (unscaled) time-to-completion.
    pub fn of(elapsed: Duration) -> Self {
        let minutes = elapsed.num_minutes();
        match minutes {
            m if m < 15 => SpeedBand::Blazing,
            m if m < 30 => SpeedBand::Fast,
            m if m < 120 => SpeedBand::Normal,
            m if m < 240 => SpeedBand::Slow,
            _ => SpeedBand::Glacial,
        }
    }

    pub fn pool(&self) -> &'static [&'static str] {
        match self {
            SpeedBand::Blazing => templates::COMPLETION_BLAZING,
            SpeedBand::Fast => templates::COMPLETION_FAST,
            SpeedBand::Normal => templates::COMPLETION_NORMAL,
            SpeedBand::Slow => templates::COMPLETION_SLOW,
            SpeedBand::Glacial => templates::COMPLETION_GLACIAL,
        }
    }

    fn is_quick(&self) -> bool {
        matches!(self, SpeedBand::Blazing | SpeedBand::Fast)
    }

    fn is_sluggish(&self) -> bool {
        matches!(self, SpeedBand::Slow | SpeedBand::Glacial)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyClause {
    /// Urgent, but slow.
    Mismatch,
    /// Urgent, and quick.
    Competence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NagClause {
    /// 5-9 reminders.
    Moderate,
    /// 10 or more.
    Extensive,
}

/// Everything that decides a completion message, minus the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CompletionProfile {
    pub speed: SpeedBand,
    pub dread_ack: bool,
    pub urgency: Option<UrgencyClause>,
    pub nagging: Option<NagClause>,
}

impl CompletionProfile {
    pub fn classify(elapsed: Duration, dread: u8, urgency: u8, nag_count: u32) -> Self {
        let speed = SpeedBand::of(elapsed);
        let urgency = match urgency >= 4 {
            true if speed.is_sluggish() => Some(UrgencyClause::Mismatch),
            true if speed.is_quick() => Some(UrgencyClause::Competence),
            _ => None,
        };
        let nagging = match nag_count {
            n if n >= 10 => Some(NagClause::Extensive),
            5..=9 => Some(NagClause::Moderate),
            _ => None,
        };
        Self {
            speed,
            dread_ack: dread >= 4,
            urgency,
            nagging,
        }
    }

    /// Appended clause fragments, in fixed order. At most three.
    pub fn clauses(&self, nag_count: u32) -> Vec<String> {
        let mut out = Vec::with_capacity(3);
        if self.dread_ack {
            out.push(templates::CLAUSE_DREAD.to_string());
        }
        match self.urgency {
            Some(UrgencyClause::Mismatch) => out.push(templates::CLAUSE_URGENCY_MISMATCH.to_string()),
            Some(UrgencyClause::Competence) => out.push(templates::CLAUSE_URGENCY_COMPETENCE.to_string()),
            None => {}
        }
        let count = nag_count.to_string();
        match self.nagging {
            Some(NagClause::Extensive) => {
                out.push(render(templates::CLAUSE_NAG_EXTENSIVE, &[("count", count.as_str())]))
            }
            Some(NagClause::Moderate) => {
                out.push(render(templates::CLAUSE_NAG_MODERATE, &[("count", count.as_str())]))
            }
            None => {}
        }
        out
    }
}

/// Phrase describing how long a task has been pending (nominal time).
pub fn time_context(elapsed: Duration) -> String {
    let hours = elapsed.num_hours();
    match elapsed.num_minutes() {
        m if m < 60 => "Less than an hour in".to_string(),
        m if m < 120 => "1 hour in".to_string(),
        m if m < 4 * 60 => format!("{hours} hours in"),
        m if m < 12 * 60 => format!("{hours} hours in. Half the day is gone"),
        m if m < 20 * 60 => format!("{hours} hours in. Almost a full day of avoidance"),
        _ => format!("{hours} hours in. Impressive dedication to doing nothing"),
    }
}

/// Compact span for completion messages: "10 min", "1h 30m", "7h".
pub fn span(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    let (h, m) = (minutes / 60, minutes % 60);
    match (h, m) {
        (0, m) => format!("{m} min"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m:02}m"),
    }
}

pub struct MessageCatalog {
    scale: TimeScale,
    rng: Mutex<StdRng>,
    generator: Option<Arc<dyn MessageGenerator>>,
    policy: GeneratorPolicy,
}

impl MessageCatalog {
    pub fn new(scale: TimeScale) -> Self {
        Self {
            scale,
            rng: Mutex::new(StdRng::from_entropy()),
            generator: None,
            policy: GeneratorPolicy::default(),
        }
    }

    /// Deterministic pool picks, for tests and replays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn MessageGenerator>, policy: GeneratorPolicy) -> Self {
        self.generator = Some(generator);
        self.policy = policy;
        self
    }

    pub async fn reminder_message(&self, task: &Task, kind: FireKind, now: DateTime<Utc>) -> String {
        let elapsed = time_context(self.scale.expand(now - task.created_at));
        let key = ReminderKey::classify(task.dread.get(), task.nag_count, kind);

        let request = GenerationRequest {
            purpose: Purpose::Reminder {
                kind,
                escalation: Escalation::of(task.nag_count),
            },
            task_name: task.name.clone(),
            dread: task.dread.get(),
            urgency: task.urgency.get(),
            nag_count: task.nag_count,
            elapsed: elapsed.clone(),
            max_tokens: self.policy.max_tokens,
        };
        if let Some(text) = self.try_generate(&request).await {
            return format!("{}\n\n{}", task.name, text);
        }

        let template = self.pick(key.pool());
        render(template, &[("task", task.name.as_str()), ("elapsed", elapsed.as_str())])
    }

    /// `elapsed` is wall-clock time since creation; it is classified on the
    /// nominal timeline so accelerated runs read like real ones.
    pub async fn completion_message(&self, task: &Task, elapsed: Duration, nag_count: u32) -> String {
        let nominal = self.scale.expand(elapsed);
        let profile = CompletionProfile::classify(nominal, task.dread.get(), task.urgency.get(), nag_count);

        let request = GenerationRequest {
            purpose: Purpose::Completion { profile },
            task_name: task.name.clone(),
            dread: task.dread.get(),
            urgency: task.urgency.get(),
            nag_count,
            elapsed: span(nominal),
            max_tokens: self.policy.max_tokens,
        };
        if let Some(text) = self.try_generate(&request).await {
            return text;
        }

        self.static_completion(task, &profile, nominal, nag_count)
    }

    /// Static rendering of a completion profile.
    pub fn static_completion(
        &self,
        task: &Task,
        profile: &CompletionProfile,
        nominal: Duration,
        nag_count: u32,
    ) -> String {
        let elapsed = span(nominal);
        let base = render(
            self.pick(profile.speed.pool()),
            &[("task", task.name.as_str()), ("elapsed", elapsed.as_str())],
        );
        let clauses = profile.clauses(nag_count);
        if clauses.is_empty() {
            return base;
        }
        format!("{base} {}.", capitalize(&clauses.join("; ")))
    }

    pub fn expiry_message(&self, task: &Task, lifetime: Duration) -> String {
        let hours = self.scale.expand(lifetime).num_hours();
        let horizon = if hours == 1 { "1 hour".to_string() } else { format!("{hours} hours") };
        render(templates::EXPIRED, &[("task", task.name.as_str()), ("horizon", horizon.as_str())])
    }

    fn pick(&self, pool: &'static [&'static str]) -> &'static str {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        pool.choose(&mut *rng).copied().unwrap_or_default()
    }

    async fn try_generate(&self, request: &GenerationRequest) -> Option<String> {
        let generator = self.generator.as_ref()?;

        match tokio::time::timeout(self.policy.timeout, generator.generate(request)).await {
            Ok(Ok(raw)) => match accept(&raw, self.policy.max_chars) {
                Ok(text) => Some(text),
                Err(rejection) => {
                    debug!(?rejection, task = %request.task_name, "generated message rejected, using static pool");
                    None
                }
            },
            Ok(Err(e)) => {
                debug!(error = %e, task = %request.task_name, "generator failed, using static pool");
                None
            }
            Err(_) => {
                debug!(timeout = ?self.policy.timeout, task = %request.task_name, "generator timed out, using static pool");
                None
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Rating;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn task(dread: u8, urgency: u8) -> Task {
        Task::new(
            "t1",
            "u1",
            "Call dentist",
            Rating::new("dread", i64::from(dread)).unwrap(),
            Rating::new("urgency", i64::from(urgency)).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
        )
    }

    fn catalog() -> MessageCatalog {
        MessageCatalog::new(TimeScale::REAL_TIME).with_seed(7)
    }

    fn rendered_pool(pool: &[&str], task: &str, elapsed: &str) -> Vec<String> {
        pool.iter()
            .map(|t| render(t, &[("task", task), ("elapsed", elapsed)]))
            .collect()
    }

    struct Scripted {
        reply: anyhow::Result<String>,
        delay: std::time::Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: anyhow::Result<String>) -> Self {
            Self {
                reply,
                delay: std::time::Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageGenerator for Scripted {
        async fn generate(&self, _request: &GenerationRequest) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    #[test]
    fn speed_band_boundaries() {
        assert_eq!(SpeedBand::of(Duration::minutes(14)), SpeedBand::Blazing);
        assert_eq!(SpeedBand::of(Duration::minutes(15)), SpeedBand::Fast);
        assert_eq!(SpeedBand::of(Duration::minutes(30)), SpeedBand::Normal);
        assert_eq!(SpeedBand::of(Duration::minutes(119)), SpeedBand::Normal);
        assert_eq!(SpeedBand::of(Duration::hours(2)), SpeedBand::Slow);
        assert_eq!(SpeedBand::of(Duration::hours(4)), SpeedBand::Glacial);
    }

    #[test]
    fn reminder_key_bands() {
        assert_eq!(
            ReminderKey::classify(3, 1, FireKind::First),
            ReminderKey::Regular(DreadBand::Firm, Escalation::Opening)
        );
        assert_eq!(
            ReminderKey::classify(4, 4, FireKind::Early),
            ReminderKey::Regular(DreadBand::Savage, Escalation::Pressing)
        );
        assert_eq!(
            ReminderKey::classify(5, 12, FireKind::Late),
            ReminderKey::Regular(DreadBand::Savage, Escalation::Relentless)
        );
        assert_eq!(ReminderKey::classify(5, 3, FireKind::CheckIn), ReminderKey::CheckIn);
        assert_eq!(ReminderKey::classify(1, 9, FireKind::Final), ReminderKey::Final);
    }

    #[test]
    fn profile_worst_case_has_every_clause() {
        let p = CompletionProfile::classify(Duration::hours(7), 5, 5, 18);
        assert_eq!(
            p,
            CompletionProfile {
                speed: SpeedBand::Glacial,
                dread_ack: true,
                urgency: Some(UrgencyClause::Mismatch),
                nagging: Some(NagClause::Extensive),
            }
        );
    }

    #[test]
    fn profile_blazing_low_stakes_has_no_clauses() {
        let p = CompletionProfile::classify(Duration::minutes(10), 1, 1, 0);
        assert_eq!(p.speed, SpeedBand::Blazing);
        assert!(p.clauses(0).is_empty());
    }

    #[test]
    fn profile_urgency_and_nag_clauses() {
        let quick = CompletionProfile::classify(Duration::minutes(20), 2, 4, 5);
        assert_eq!(quick.urgency, Some(UrgencyClause::Competence));
        assert_eq!(quick.nagging, Some(NagClause::Moderate));

        let normal = CompletionProfile::classify(Duration::minutes(90), 2, 5, 9);
        assert_eq!(normal.urgency, None);
        assert_eq!(normal.nagging, Some(NagClause::Moderate));

        let low = CompletionProfile::classify(Duration::hours(6), 2, 3, 4);
        assert_eq!(low.urgency, None);
        assert_eq!(low.nagging, None);
    }

    #[test]
    fn time_context_phrases() {
        assert_eq!(time_context(Duration::minutes(20)), "Less than an hour in");
        assert_eq!(time_context(Duration::minutes(190)), "3 hours in");
        assert!(time_context(Duration::hours(6)).contains("Half the day"));
        assert!(time_context(Duration::hours(22)).contains("doing nothing"));
    }

    #[test]
    fn span_formats() {
        assert_eq!(span(Duration::minutes(10)), "10 min");
        assert_eq!(span(Duration::hours(7)), "7h");
        assert_eq!(span(Duration::minutes(90)), "1h 30m");
    }

    #[tokio::test]
    async fn worst_case_completion_includes_all_clauses() {
        let c = catalog();
        let msg = c.completion_message(&task(5, 5), Duration::hours(7), 18).await;
        assert!(msg.contains(templates::CLAUSE_DREAD), "{msg}");
        assert!(msg.contains(templates::CLAUSE_URGENCY_MISMATCH), "{msg}");
        assert!(msg.contains("18 reminders of extensive nagging"), "{msg}");
        let sentences = msg.matches(['.', '!', '?']).count();
        assert!(sentences <= 2, "{msg}");
    }

    #[tokio::test]
    async fn blazing_completion_is_bare_template() {
        let c = catalog();
        let msg = c.completion_message(&task(1, 1), Duration::minutes(10), 0).await;
        let pool = rendered_pool(templates::COMPLETION_BLAZING, "Call dentist", "10 min");
        assert!(pool.contains(&msg), "{msg}");
    }

    #[tokio::test]
    async fn same_inputs_draw_from_same_pool() {
        let c = catalog();
        let pool = rendered_pool(templates::COMPLETION_NORMAL, "Call dentist", "1h 30m");
        for _ in 0..20 {
            let msg = c.completion_message(&task(2, 3), Duration::minutes(90), 3).await;
            assert!(pool.contains(&msg), "{msg}");
        }
    }

    #[tokio::test]
    async fn scaled_completion_is_classified_on_nominal_time() {
        let c = MessageCatalog::new(TimeScale::new(240).unwrap()).with_seed(1);
        // 105 real seconds * 240 = 7 nominal hours.
        let msg = c.completion_message(&task(5, 5), Duration::seconds(105), 18).await;
        assert!(msg.contains(templates::CLAUSE_URGENCY_MISMATCH), "{msg}");
        assert!(msg.contains("7h"), "{msg}");
    }

    #[tokio::test]
    async fn reminder_uses_band_pool() {
        let c = catalog();
        let t = task(5, 3).with_nag_count(7);
        let now = t.created_at + Duration::hours(5);
        let msg = c.reminder_message(&t, FireKind::Late, now).await;
        let pool = rendered_pool(
            templates::SAVAGE_RELENTLESS,
            "Call dentist",
            "5 hours in. Half the day is gone",
        );
        assert!(pool.contains(&msg), "{msg}");
    }

    #[tokio::test]
    async fn generator_output_is_used_once() {
        let generator = Arc::new(Scripted::new(Ok("Pick up the phone. Teeth won't fix themselves.".into())));
        let c = catalog().with_generator(generator.clone(), GeneratorPolicy::default());
        let t = task(3, 3).with_nag_count(1);
        let msg = c.reminder_message(&t, FireKind::First, t.created_at).await;
        assert_eq!(msg, "Call dentist\n\nPick up the phone. Teeth won't fix themselves.");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generator_failure_falls_back_to_pool() {
        let generator = Arc::new(Scripted::new(Err(anyhow::anyhow!("503"))));
        let c = catalog().with_generator(generator.clone(), GeneratorPolicy::default());
        let msg = c.completion_message(&task(1, 1), Duration::minutes(10), 0).await;
        let pool = rendered_pool(templates::COMPLETION_BLAZING, "Call dentist", "10 min");
        assert!(pool.contains(&msg), "{msg}");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generator_timeout_falls_back_to_pool() {
        let mut slow = Scripted::new(Ok("too late".into()));
        slow.delay = std::time::Duration::from_millis(200);
        let policy = GeneratorPolicy {
            timeout: std::time::Duration::from_millis(10),
            ..GeneratorPolicy::default()
        };
        let c = catalog().with_generator(Arc::new(slow), policy);
        let msg = c.completion_message(&task(1, 1), Duration::minutes(10), 0).await;
        assert_ne!(msg, "too late");
    }

    #[tokio::test]
    async fn overlong_generator_output_is_rejected_not_truncated() {
        let policy = GeneratorPolicy {
            max_chars: 20,
            ..GeneratorPolicy::default()
        };
        let generator = Arc::new(Scripted::new(Ok("This answer is far longer than twenty characters.".into())));
        let c = catalog().with_generator(generator, policy);
        let msg = c.completion_message(&task(1, 1), Duration::minutes(10), 0).await;
        let pool = rendered_pool(templates::COMPLETION_BLAZING, "Call dentist", "10 min");
        assert!(pool.contains(&msg), "{msg}");
    }

    #[test]
    fn expiry_message_reports_nominal_horizon() {
        let c = MessageCatalog::new(TimeScale::new(240).unwrap());
        let msg = c.expiry_message(&task(3, 3), Duration::minutes(6));
        assert!(msg.starts_with("Task expired: Call dentist"));
        assert!(msg.contains("24 hours"));
    }
}
