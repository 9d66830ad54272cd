use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod llm;
mod preview;
mod session;
mod state;

#[derive(Parser, Debug)]
#[command(
    name = "dread",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DREAD_BUILD_SHA"), ")"),
    about = "Nags you about the tasks you dread until you do them"
)]
struct Cli {
    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive session: add tasks, get nagged, mark them done
    Run {
        /// Compress every interval by this factor (240 turns 24h into 6 min)
        #[arg(long)]
        scale: Option<u32>,

        /// Override [runtime].user_id
        #[arg(long)]
        user: Option<String>,
    },

    /// Print the full reminder schedule a task would get if ignored
    Preview {
        /// Task name
        name: String,

        #[arg(long, default_value_t = 3)]
        dread: i64,

        #[arg(long, default_value_t = 3)]
        urgency: i64,

        /// Creation time in the configured timezone, "YYYY-MM-DD HH:MM" (default: now)
        #[arg(long)]
        at: Option<String>,

        /// Compress every interval by this factor
        #[arg(long)]
        scale: Option<u32>,
    },

    /// Manage ~/.dread/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,

    /// Print the effective config
    Show,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { scale, user } => {
            let mut cfg = config::load_config()?;
            if let Some(factor) = scale {
                cfg.scheduler.time_scale = factor;
            }
            if let Some(user) = user {
                cfg.runtime.user_id = user;
            }
            session::run_session(cfg).await?;
        }

        Command::Preview {
            name,
            dread,
            urgency,
            at,
            scale,
        } => {
            let mut cfg = config::load_config()?;
            if let Some(factor) = scale {
                cfg.scheduler.time_scale = factor;
            }
            preview::run_preview(&cfg.scheduler, &name, dread, urgency, at.as_deref()).await?;
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
    }

    Ok(())
}
