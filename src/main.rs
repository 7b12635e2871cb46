use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ironlog::{
    App, AppConfig, CacheStorage, HttpFetcher, InProgressSession, IronlogError, Request,
    SessionContext, VersionOutcome,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Read configuration from this file instead of the user config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured data directory
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the release version and apply any pending transition
    Start,
    #[command(subcommand)]
    Session(SessionCommand),
    #[command(subcommand)]
    Restore(RestoreCommand),
    #[command(subcommand)]
    Cache(CacheCommand),
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    Show,
    /// Start a new workout, replacing any in-progress one
    Begin { routine: String },
    /// Run the autosave tick on the in-progress workout
    Save,
    /// Log a set on the in-progress workout
    Record {
        exercise: String,
        weight: f64,
        reps: u32,
    },
    Complete,
    Discard,
}

#[derive(Subcommand, Debug)]
enum RestoreCommand {
    Accept,
    Decline,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Pre-cache a release without replacing the active generation
    Install {
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Make an installed release the active generation, evicting the others
    Activate {
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Install and activate in one step
    Update {
        #[arg(short, long)]
        release: Option<String>,
    },
    /// Serve a URL through the offline cache
    Fetch {
        url: String,
        #[arg(short, long)]
        release: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    /// Days of a month with a completed workout
    Month { year: i32, month: u32 },
}

fn format_timestamp(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| epoch_ms.to_string())
}

fn print_session(session: &InProgressSession) {
    println!(
        "Routine {} (saved {})",
        session.routine_id,
        format_timestamp(session.timestamp)
    );
    let ctx = SessionContext::resume(session.clone());
    for exercise in ctx.exercises() {
        let sets = ctx
            .sets(exercise)
            .iter()
            .map(|s| format!("{}x{}", s.reps, s.weight))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {exercise}: {sets}");
    }
}

fn no_session() -> IronlogError {
    IronlogError::InvalidUserInput {
        field: "session".to_string(),
        reason: "No workout in progress, run `ironlog session begin <routine>`".to_string(),
    }
}

fn start(app: &App<HttpFetcher>) -> Result<(), IronlogError> {
    let report = app.start()?;
    match &report.outcome {
        VersionOutcome::FirstInstall { version } => println!("First install at {version}"),
        VersionOutcome::Unchanged { version } => println!("Running {version}"),
        VersionOutcome::Updated {
            from,
            to,
            backed_up,
        } => {
            println!("Updated from {from} to {to}");
            if *backed_up {
                println!("In-progress workout backed up");
            }
        }
    }
    if let Some(offer) = &report.restore_offer {
        println!("A backed up workout can be restored:");
        print_session(offer);
        println!("Run `ironlog restore accept` or `ironlog restore decline`");
    }
    Ok(())
}

fn session(app: &App<HttpFetcher>, command: &SessionCommand) -> Result<(), IronlogError> {
    let sessions = app.sessions();
    match command {
        SessionCommand::Show => match sessions.load() {
            Some(session) => print_session(&session),
            None => println!("No workout in progress"),
        },
        SessionCommand::Begin { routine } => {
            let ctx = SessionContext::begin(routine)?;
            ctx.autosave(&sessions)?;
            println!("Started {routine}");
        }
        SessionCommand::Save => {
            let ctx = app.resume().ok_or_else(no_session)?;
            let saved = ctx.autosave(&sessions)?;
            println!("Saved at {}", format_timestamp(saved.timestamp));
        }
        SessionCommand::Record {
            exercise,
            weight,
            reps,
        } => {
            let mut ctx = app.resume().ok_or_else(no_session)?;
            ctx.record_set(exercise, *weight, *reps)?;
            let saved = ctx.autosave(&sessions)?;
            print_session(&saved);
        }
        SessionCommand::Complete => {
            let ctx = app.resume().ok_or_else(no_session)?;
            let done = app.complete(ctx)?;
            println!(
                "Completed {} at {}",
                done.routine_id,
                format_timestamp(done.completed_at)
            );
        }
        SessionCommand::Discard => {
            match app.resume() {
                Some(ctx) => ctx.discard(&sessions)?,
                None => sessions.clear()?,
            }
            println!("Workout discarded");
        }
    }
    Ok(())
}

fn restore(app: &App<HttpFetcher>, command: &RestoreCommand) -> Result<(), IronlogError> {
    let versions = app.versions();
    match command {
        RestoreCommand::Accept => match versions.accept_restore()? {
            Some(session) => {
                println!("Restored:");
                print_session(&session);
            }
            None => println!("Nothing to restore"),
        },
        RestoreCommand::Decline => {
            versions.decline_restore()?;
            println!("Backup discarded");
        }
    }
    Ok(())
}

fn cache(app: &App<HttpFetcher>, command: &CacheCommand) -> Result<(), IronlogError> {
    let current_version = |requested: &Option<String>| -> Result<String, IronlogError> {
        match requested {
            Some(version) => Ok(version.clone()),
            None => Ok(app
                .versions()
                .stored_version()?
                .unwrap_or_else(|| app.manifest_version())),
        }
    };

    match command {
        CacheCommand::Install { release } => {
            let version = current_version(release)?;
            app.install_offline_cache(&version)?;
            println!("Offline cache for {version} installed, run `ironlog cache activate`");
        }
        CacheCommand::Activate { release } => {
            let version = current_version(release)?;
            let evicted = app.activate_offline_cache(&version)?;
            println!("Offline cache for {version} is active");
            for bucket in evicted {
                println!("  evicted {bucket}");
            }
        }
        CacheCommand::Update { release } => {
            let version = current_version(release)?;
            let evicted = app.update_offline_cache(&version)?;
            println!("Offline cache for {version} is active");
            for bucket in evicted {
                println!("  evicted {bucket}");
            }
        }
        CacheCommand::Fetch { url, release } => {
            let version = current_version(release)?;
            let response = app.fetch(&version, &Request::get(url.as_str()))?;
            println!("{} {} ({} bytes)", response.status, url, response.body.len());
        }
        CacheCommand::List => {
            let cache = app.cache();
            for bucket in cache.bucket_names()? {
                println!("{bucket}");
                for request in cache.requests(&bucket)? {
                    println!("  {}", request.identity());
                }
            }
        }
    }
    Ok(())
}

fn history(app: &App<HttpFetcher>, command: &HistoryCommand) -> Result<(), IronlogError> {
    match command {
        HistoryCommand::List => {
            for entry in app.history().entries()? {
                println!(
                    "{}  {}",
                    format_timestamp(entry.completed_at),
                    entry.routine_id
                );
            }
        }
        HistoryCommand::Month { year, month } => {
            let days = app.history().active_days(*year, *month)?;
            let days = days
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            println!("{year}-{month:02}: {days}");
        }
    }
    Ok(())
}

fn run(cli: &Args) -> Result<(), IronlogError> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_path(path),
        None => AppConfig::from_local_file(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = Some(data_dir.clone());
    }

    let app = App::from_config(config)?;
    match &cli.command {
        Commands::Start => start(&app),
        Commands::Session(command) => session(&app, command),
        Commands::Restore(command) => restore(&app, command),
        Commands::Cache(command) => cache(&app, command),
        Commands::History(command) => history(&app, command),
    }
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    if let Err(e) = run(&cli) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
