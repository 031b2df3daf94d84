mod telemetry;

use std::error::Error;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use db_infra::config::properties::parse_assignment;
use db_infra::{
    build_connection_source, force_release_lock, keys, run_migrations, DataSourceSettings,
    DbInfraError, MigrationReport, PersistenceContext, PersistenceSettings, Properties,
    ResourceRegistry,
};
use migration::MigrationCommand;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, ValueEnum)]
enum Cmd {
    Up,
    Down,
    /// Roll back every modeler migration, then apply them all again
    Fresh,
    Reset,
    Refresh,
    Status,
}

impl From<Cmd> for MigrationCommand {
    fn from(cmd: Cmd) -> Self {
        match cmd {
            Cmd::Up => MigrationCommand::Up,
            Cmd::Down => MigrationCommand::Down,
            Cmd::Fresh => MigrationCommand::Fresh,
            Cmd::Reset => MigrationCommand::Reset,
            Cmd::Refresh => MigrationCommand::Refresh,
            Cmd::Status => MigrationCommand::Status,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved configuration (password redacted)
    Config,
    /// Run the full persistence bootstrap, then shut down
    Bootstrap,
    /// Run one changelog command under the changelog lock
    Migrate {
        #[arg(value_enum)]
        command: Cmd,
    },
    /// Clear a changelog lock left behind by a crashed process
    ReleaseLock,
}

#[derive(Parser)]
#[command(name = "modeler-db")]
#[command(about = "Modeler persistence bootstrap tool")]
struct Args {
    /// Configuration value as key=value; repeatable, wins over the environment
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    set: Vec<String>,

    /// Ignore configuration from environment variables
    #[arg(long, global = true)]
    no_env: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init_tracing(args.json_logs);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            let mut cause = e.source();
            while let Some(inner) = cause {
                eprintln!("   caused by: {inner}");
                cause = inner.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn resolve_properties(args: &Args) -> Result<Properties, DbInfraError> {
    let mut explicit = Properties::new();
    for raw in &args.set {
        let (key, value) = parse_assignment(raw)?;
        if !keys::ALL.contains(&key.as_str()) {
            warn!(key = %key, "config=unknown_key");
        }
        explicit.set(key, value);
    }

    let base = if args.no_env {
        Properties::new()
    } else {
        Properties::from_env()
    };
    Ok(base.merge(explicit))
}

/// Cancelled on the first Ctrl-C.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("signal=ctrl_c cancelling");
            trigger.cancel();
        }
    });
    token
}

fn warn_if_ephemeral(settings: &PersistenceSettings) {
    if let DataSourceSettings::Pooled(pool) = &settings.datasource {
        if pool.url.contains(":memory:") || pool.url.contains("mode=memory") {
            warn!("db=in_memory changes are discarded when this command exits");
        }
    }
}

fn print_report(report: &MigrationReport) {
    println!("changelog:       {}", report.changelog);
    println!("command:         {:?}", report.command);
    println!("dialect:         {} ({})", report.dialect, report.version);
    println!("changelog table: {}", report.tables.changelog);
    println!("lock table:      {}", report.tables.changelog_lock);
    println!(
        "applied:         {} -> {}{}",
        report.applied_before,
        report.applied_after,
        if report.skipped { " (up to date)" } else { "" }
    );
    if !report.pending.is_empty() {
        println!("pending:         {}", report.pending.join(", "));
    }
    println!(
        "outcome:         {} (lock attempts {}, waited {}ms, body {}ms)",
        report.outcome(),
        report.stats.lock_attempts,
        report.stats.lock_wait.as_millis(),
        report.stats.body_time.as_millis()
    );
}

async fn run(args: Args) -> Result<(), DbInfraError> {
    let props = resolve_properties(&args)?;
    let settings = PersistenceSettings::from_properties(&props)?;
    let directory = ResourceRegistry::new();

    match args.command {
        Command::Config => {
            println!("{props:#?}");
            println!("{settings:#?}");
        }
        Command::Bootstrap => {
            warn_if_ephemeral(&settings);
            let token = shutdown_token();
            let ctx =
                PersistenceContext::bootstrap_with_cancellation(settings, &directory, &token)
                    .await?;
            print_report(ctx.migration_report());
            if let Some(stats) = ctx.session_factory().statistics() {
                println!("statistics:      {stats:?}");
            }
            ctx.shutdown().await?;
        }
        Command::Migrate { command } => {
            warn_if_ephemeral(&settings);
            let token = shutdown_token();
            let plan = settings.migration.with_command(command.into());
            let source = build_connection_source(&settings.datasource, &directory).await?;

            let result = run_migrations(&source, &plan, &token).await;
            source.close().await?;
            print_report(&result?);
        }
        Command::ReleaseLock => {
            let source = build_connection_source(&settings.datasource, &directory).await?;
            let result = force_release_lock(&source).await;
            source.close().await?;
            if result? {
                info!("lock=released");
                println!("✅ changelog lock released");
            } else {
                println!("changelog lock was not held");
            }
        }
    }
    Ok(())
}
