//! Static message pools.
//!
//! Placeholders: `{task}`, `{elapsed}`, `{horizon}`. Reminder templates carry
//! the task name on the first line. Completion base templates are a single
//! sentence each; clauses are appended by the catalog as one more sentence.

pub const FIRM_OPENING: &[&str] = &[
    "{task}\n\n{elapsed}. Just checking in.",
    "{task}\n\nStill on the list, I see. {elapsed}.",
    "{task}\n\n{elapsed}. Small nudge: start it.",
    "{task}\n\nReminder about this one. {elapsed}.",
];

pub const FIRM_PRESSING: &[&str] = &[
    "{task}\n\n{elapsed}. The avoidance is getting noticeable.",
    "{task}\n\nStill waiting. {elapsed}. Interesting choice.",
    "{task}\n\n{elapsed}. This is starting to look like a pattern.",
    "{task}\n\n{elapsed}. My patience is wearing thin. Mildly.",
];

pub const FIRM_RELENTLESS: &[&str] = &[
    "{task}\n\n{elapsed}. Classic avoidance. Do it.",
    "{task}\n\n{elapsed}. Your commitment to delay is impressive.",
    "{task}\n\nHow long are we doing this? {elapsed}.",
    "{task}\n\n{elapsed}. Procrastination as performance art.",
];

pub const SAVAGE_OPENING: &[&str] = &[
    "{task}\n\n{elapsed}. Move.",
    "{task}\n\nSeriously? {elapsed}. Start now.",
    "{task}\n\n{elapsed}. Your excuses are noted and dismissed.",
    "{task}\n\nEnough thinking about it. {elapsed}. Do it.",
];

pub const SAVAGE_PRESSING: &[&str] = &[
    "{task}\n\n{elapsed}. This is getting pathetic.",
    "{task}\n\n{elapsed}. Zero tolerance left for this nonsense.",
    "{task}\n\n{elapsed}. Stop wasting my time and yours.",
    "{task}\n\n{elapsed}. You hate it and it is still not done.",
];

pub const SAVAGE_RELENTLESS: &[&str] = &[
    "{task}\n\n{elapsed}. Maximum dread, zero action. Classic you.",
    "{task}\n\n{elapsed}. I am documenting this for posterity.",
    "{task}\n\n{elapsed}. The universe is judging you. So am I.",
    "{task}\n\n{elapsed}. Your capacity for avoidance is breathtaking.",
];

pub const CHECKIN: &[&str] = &[
    "{task}\n\nCheck-in. {elapsed}. Still not done? Remarkable.",
    "{task}\n\nHalfway to expiry. Zero progress. On brand.",
    "{task}\n\nMidpoint reached. Achievement unlocked: procrastination.",
];

pub const FINAL: &[&str] = &[
    "{task}\n\nLast call. This expires soon and so does my patience.",
    "{task}\n\n{elapsed}. Final reminder before this quietly dies.",
    "{task}\n\nFinal warning. After this, it goes on your permanent record.",
];

pub const EXPIRED: &str = "Task expired: {task}\n\nYou didn't do it after {horizon}. Noted.";

pub const COMPLETION_BLAZING: &[&str] = &[
    "{task} done in {elapsed}, which is frankly suspicious.",
    "{task} finished in {elapsed}, faster than anyone expected.",
    "{task} done in {elapsed}, so the excuses were optional all along.",
];

pub const COMPLETION_FAST: &[&str] = &[
    "{task} done in {elapsed}, acceptable work.",
    "{task} finished in {elapsed}, not bad at all.",
    "{task} wrapped up in {elapsed}, reasonably prompt.",
];

pub const COMPLETION_NORMAL: &[&str] = &[
    "{task} done in {elapsed}, perfectly adequate.",
    "{task} took {elapsed}, thoroughly average.",
    "{task} finished in {elapsed}, which is fine, I suppose.",
];

pub const COMPLETION_SLOW: &[&str] = &[
    "{task} done after {elapsed}, taking your sweet time.",
    "{task} finally finished after {elapsed}.",
    "{task} took {elapsed}, slow but technically done.",
];

pub const COMPLETION_GLACIAL: &[&str] = &[
    "{task} done after {elapsed}, continental drift was faster.",
    "{task} finally finished after {elapsed}, glacial but done.",
    "{task} took {elapsed}, geological timescales noted.",
];

pub const CLAUSE_DREAD: &str = "you dreaded it and did it anyway";
pub const CLAUSE_URGENCY_MISMATCH: &str = "urgent task, handled at a crawl";
pub const CLAUSE_URGENCY_COMPETENCE: &str = "urgent task, handled like it was urgent";
pub const CLAUSE_NAG_EXTENSIVE: &str = "{count} reminders of extensive nagging";
pub const CLAUSE_NAG_MODERATE: &str = "{count} reminders of moderate nagging";

/// Substitute `{key}` placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
