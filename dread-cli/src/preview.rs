use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dread_core::catalog::ReminderKey;
use dread_core::time::{humanize, parse_local_to_utc};
use dread_core::{MessageCatalog, Plan, ReminderPlanner, SchedulerConfig, Task};

/// Print every reminder a task would receive if it were never completed.
pub async fn run_preview(
    cfg: &SchedulerConfig,
    name: &str,
    dread: i64,
    urgency: i64,
    at: Option<&str>,
) -> Result<()> {
    let planner = ReminderPlanner::from_config(cfg).context("invalid [scheduler] config")?;
    let created = match at {
        Some(local) => parse_local_to_utc(local, &cfg.timezone)?,
        None => Utc::now(),
    };
    let task = Task::from_request("preview", "preview", name, dread, urgency, created)?;
    let catalog = MessageCatalog::new(planner.scale());

    println!(
        "{} (dread {}, urgency {}) created {}",
        task.name,
        task.dread,
        task.urgency,
        local(created, &planner)
    );
    println!();

    let mut t = task.clone();
    for plan in planner.project(&task)? {
        match plan {
            Plan::Fire { at, kind } => {
                t.nag_count += 1;
                let key = ReminderKey::classify(t.dread.get(), t.nag_count, kind);
                let text = catalog.reminder_message(&t, kind, at).await;
                let body = text.lines().filter(|l| !l.trim().is_empty()).last().unwrap_or_default();
                println!(
                    "#{:<3} {}  +{:<8} {:<9} {:<22} {}",
                    t.nag_count,
                    local(at, &planner),
                    humanize(planner.scale().expand(at - created)),
                    kind.as_str(),
                    band_label(key),
                    body
                );
                t.last_fire_at = Some(at);
            }
            Plan::Expire { at } => {
                println!();
                println!(
                    "expires {} after {} reminders",
                    local(at, &planner),
                    t.nag_count
                );
            }
        }
    }
    Ok(())
}

fn local(at: DateTime<Utc>, planner: &ReminderPlanner) -> String {
    at.with_timezone(&planner.timezone())
        .format("%a %H:%M:%S")
        .to_string()
}

fn band_label(key: ReminderKey) -> String {
    match key {
        ReminderKey::Regular(dread, esc) => format!("{dread:?}/{esc:?}"),
        ReminderKey::CheckIn => "check-in".to_string(),
        ReminderKey::Final => "final".to_string(),
    }
}
