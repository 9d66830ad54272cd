//! Interactive session: read commands from stdin, print nags to stdout.

use anyhow::{Context, Result};
use chrono::Utc;
use dread_core::time::humanize;
use dread_core::{
    ChannelNotifier, Clock, InMemoryStore, MessageCatalog, MessageKind, NagError, OutboundMessage,
    ReminderPlanner, ScheduleStore, SchedulingEngine, SystemClock, Task, TimeScale,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::config::Config;
use crate::llm::OpenAiGenerator;
use crate::state::{read_snapshot, write_snapshot, Snapshot};

type Engine = SchedulingEngine<SystemClock, InMemoryStore>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Add { dread: i64, urgency: i64, name: String },
    Done(String),
    Cancel(String),
    List,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Err("empty command".to_string());
    };

    match verb.to_ascii_lowercase().as_str() {
        "add" => {
            let dread = parse_rating(parts.next(), "dread")?;
            let urgency = parse_rating(parts.next(), "urgency")?;
            let name = parts.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err("usage: add <dread 1-5> <urgency 1-5> <task name>".to_string());
            }
            Ok(SessionCommand::Add { dread, urgency, name })
        }
        "done" | "cancel" => {
            let id = parts
                .next()
                .ok_or_else(|| format!("usage: {verb} <task id>"))?
                .to_string();
            if verb.eq_ignore_ascii_case("done") {
                Ok(SessionCommand::Done(id))
            } else {
                Ok(SessionCommand::Cancel(id))
            }
        }
        "list" | "ls" => Ok(SessionCommand::List),
        "help" | "?" => Ok(SessionCommand::Help),
        "quit" | "exit" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command: {other} (try: help)")),
    }
}

fn parse_rating(raw: Option<&str>, field: &str) -> Result<i64, String> {
    let raw = raw.ok_or_else(|| format!("missing {field} (1-5)"))?;
    raw.parse::<i64>()
        .map_err(|_| format!("{field} must be a number 1-5 (got {raw})"))
}

const MIN_TICK: std::time::Duration = std::time::Duration::from_millis(100);

/// `tick_seconds` is nominal time, so accelerated runs tick proportionally faster.
fn tick_period(tick_seconds: u64, scale: TimeScale) -> std::time::Duration {
    let nominal = std::time::Duration::from_secs(tick_seconds.max(1));
    (nominal / scale.factor()).max(MIN_TICK)
}

const HELP: &str = "\
commands:
  add <dread 1-5> <urgency 1-5> <name>   start nagging about a task
  done <id>                              mark a task completed
  cancel <id>                            stop nagging without completing
  list                                   show active tasks
  quit                                   save and exit";

pub async fn run_session(cfg: Config) -> Result<()> {
    let planner = ReminderPlanner::from_config(&cfg.scheduler).context("invalid [scheduler] config")?;
    let scale = planner.scale();

    let mut catalog = MessageCatalog::new(scale);
    if let Some((generator, policy)) = OpenAiGenerator::from_config(&cfg.llm)? {
        info!(model = %cfg.llm.model, "generative messages enabled");
        catalog = catalog.with_generator(Arc::new(generator), policy);
    }

    let (notifier, outbound) = ChannelNotifier::new();
    let engine: Arc<Engine> = Arc::new(SchedulingEngine::new(
        SystemClock,
        InMemoryStore::new(),
        planner,
        catalog,
        Arc::new(notifier),
    ));

    let saved = read_snapshot()?;
    for task in saved.tasks {
        if let Err(e) = engine.store().insert_task(task) {
            warn!(error = %e, "skipping task from snapshot");
        }
    }
    engine.rearm().await;

    let printer = tokio::spawn(print_outbound(outbound));
    let driver = engine
        .clone()
        .spawn(tick_period(cfg.runtime.tick_seconds, scale));

    if !scale.is_real_time() {
        println!(
            "time scale {}x: 24h horizon lasts {}",
            scale.factor(),
            humanize(scale.compress(chrono::Duration::hours(24)))
        );
    }
    println!("{HELP}");

    let user = cfg.runtime.user_id.as_str();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match parse_command(&line) {
            Ok(cmd) => cmd,
            Err(msg) => {
                println!("! {msg}");
                continue;
            }
        };
        if cmd == SessionCommand::Quit {
            break;
        }
        if let Err(e) = handle(&engine, user, cmd).await {
            println!("! {e}");
        }
    }

    driver.abort();
    let _ = driver.await;
    let on_exit = snapshot(&engine);
    let count = on_exit.tasks.len();
    write_snapshot(&on_exit)?;
    info!(count, "active tasks saved");
    drop(engine);
    // The printer ends once the engine (and its notifier) is gone.
    let _ = printer.await;
    Ok(())
}

async fn handle(engine: &Engine, user: &str, cmd: SessionCommand) -> Result<(), NagError> {
    match cmd {
        SessionCommand::Add { dread, urgency, name } => {
            let task = engine.create_task(user, &name, dread, urgency)?;
            let next = engine.store().peek_fire_time(&task.id);
            println!(
                "+ [{}] {} (dread {}, urgency {}) first nag {}",
                short_id(&task.id),
                task.name,
                task.dread,
                task.urgency,
                next.map(|at| at.with_timezone(&engine.planner().timezone()).format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        SessionCommand::Done(prefix) => {
            let id = resolve(engine, user, &prefix)?;
            // The completion message is printed by the outbound printer.
            engine.complete_task(&id).await?;
        }
        SessionCommand::Cancel(prefix) => {
            let id = resolve(engine, user, &prefix)?;
            let task = engine.cancel_task(&id)?;
            println!("- [{}] {} cancelled", short_id(&task.id), task.name);
        }
        SessionCommand::List => list(engine, user),
        SessionCommand::Help => println!("{HELP}"),
        SessionCommand::Quit => {}
    }
    Ok(())
}

fn list(engine: &Engine, user: &str) {
    let now = engine.clock().now();
    let tasks: Vec<Task> = engine
        .store()
        .tasks_for_user(user)
        .into_iter()
        .filter(Task::is_active)
        .collect();
    if tasks.is_empty() {
        println!("nothing to nag about");
        return;
    }
    let tz = engine.planner().timezone();
    for t in tasks {
        let next = engine
            .store()
            .peek_fire_time(&t.id)
            .map(|at| at.with_timezone(&tz).format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "[{}] {:<30} dread {} urgency {}  nags {:<3} age {:<8} next {}",
            short_id(&t.id),
            t.name,
            t.dread,
            t.urgency,
            t.nag_count,
            humanize(now - t.created_at),
            next
        );
    }
}

/// Accept a unique id prefix, as printed by `list`.
fn resolve(engine: &Engine, user: &str, prefix: &str) -> Result<String, NagError> {
    let matches: Vec<String> = engine
        .store()
        .tasks_for_user(user)
        .into_iter()
        .filter(|t| t.is_active() && t.id.starts_with(prefix))
        .map(|t| t.id)
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        _ => Err(NagError::UnknownTask(prefix.to_string())),
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Every user's active tasks, including ones loaded but never touched this session.
fn snapshot(engine: &Engine) -> Snapshot {
    Snapshot {
        saved_at_utc: Some(Utc::now().to_rfc3339()),
        tasks: engine.store().active_tasks(),
    }
}

async fn print_outbound(mut rx: UnboundedReceiver<OutboundMessage>) {
    while let Some(msg) = rx.recv().await {
        let label = match msg.kind {
            MessageKind::Reminder(kind) => kind.as_str(),
            MessageKind::Completion => "done",
            MessageKind::Expired => "expired",
        };
        println!("\n[{} {}]\n{}\n", short_id(&msg.task_id), label, msg.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{read_snapshot_from, write_snapshot_to};

    #[test]
    fn parses_add_with_multiword_name() {
        assert_eq!(
            parse_command("add 5 4 call the IRS back").unwrap(),
            SessionCommand::Add {
                dread: 5,
                urgency: 4,
                name: "call the IRS back".to_string()
            }
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_command("add five 3 taxes").is_err());
        assert!(parse_command("add 3 3").is_err());
        assert!(parse_command("done").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn out_of_range_ratings_reach_the_engine() {
        // Range checks belong to the engine, which rejects with a clear error.
        assert!(matches!(
            parse_command("add 9 3 taxes"),
            Ok(SessionCommand::Add { dread: 9, .. })
        ));
    }

    fn engine() -> Engine {
        let (notifier, _rx) = ChannelNotifier::new();
        let planner = ReminderPlanner::from_config(&Default::default()).unwrap();
        let catalog = MessageCatalog::new(planner.scale());
        SchedulingEngine::new(SystemClock, InMemoryStore::new(), planner, catalog, Arc::new(notifier))
    }

    #[test]
    fn snapshot_keeps_other_users_tasks() {
        let engine = engine();
        engine.create_task("alice", "dentist", 4, 2).unwrap();
        engine.create_task("bob", "taxes", 5, 5).unwrap();
        let gone = engine.create_task("bob", "gym", 2, 1).unwrap();
        engine.cancel_task(&gone.id).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        write_snapshot_to(&path, &snapshot(&engine)).unwrap();

        let mut users: Vec<String> = read_snapshot_from(&path)
            .unwrap()
            .tasks
            .into_iter()
            .map(|t| t.user_id)
            .collect();
        users.sort();
        assert_eq!(users, ["alice", "bob"]);
    }

    #[test]
    fn tick_period_follows_time_scale() {
        let real = TimeScale::new(1).unwrap();
        let fast = TimeScale::new(240).unwrap();
        assert_eq!(tick_period(15, real), std::time::Duration::from_secs(15));
        assert_eq!(tick_period(60, fast), std::time::Duration::from_millis(250));
        assert_eq!(tick_period(15, fast), MIN_TICK);
        assert_eq!(tick_period(0, real), std::time::Duration::from_secs(1));
    }

    #[test]
    fn short_commands() {
        assert_eq!(parse_command("ls").unwrap(), SessionCommand::List);
        assert_eq!(parse_command("DONE 1a2b").unwrap(), SessionCommand::Done("1a2b".to_string()));
        assert_eq!(parse_command("exit").unwrap(), SessionCommand::Quit);
    }
}
