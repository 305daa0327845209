// src/main.rs

use std::path::PathBuf;
use std::process;

use clap::Parser;
use constraint_migrator::config::Config;
use constraint_migrator::migration::backup::PgDump;
use constraint_migrator::migration::{RunOptions, run};
use constraint_migrator::models::report::RunReport;
use constraint_migrator::session::Session;
use constraint_migrator::MigrationResult;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Safe PostgreSQL constraint/index migration.
///
/// Exit codes: 0 clean, 1 constraints still blocked, 2 hard failure.
#[derive(Debug, Parser)]
#[command(name = "constraint-migrator", version)]
struct Cli {
    /// Apply indexes that pass duplicate pre-checks
    #[arg(long)]
    apply: bool,

    /// Automatically dedupe duplicate rows using deterministic keep/delete rules
    #[arg(long)]
    auto_fix: bool,

    /// Path (file or directory) for a pg_dump backup taken before auto-fix
    #[arg(long, value_name = "PATH")]
    backup_file: Option<PathBuf>,

    /// Allow auto-fix to run without a backup
    #[arg(long)]
    skip_backup: bool,

    /// Overrides DATABASE_URL
    #[arg(long, value_name = "URL")]
    database_url: Option<String>,

    /// Overrides MIGRATION_SCHEMA
    #[arg(long, value_name = "NAME")]
    schema: Option<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = execute(cli).await;
    process::exit(code);
}

/// Runs one invocation and returns the exit code.
/// Log writer and database session are released before returning.
async fn execute(cli: Cli) -> i32 {
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return e.exit_code();
        }
    };
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(schema) = cli.schema {
        config.schema = schema;
    }

    let _guard = init_tracing(&config);

    let options = RunOptions {
        apply: cli.apply,
        auto_fix: cli.auto_fix,
        backup_file: cli.backup_file,
        skip_backup: cli.skip_backup,
    };
    if let Err(e) = options.validate() {
        tracing::error!("{}", e);
        return e.exit_code();
    }

    let session = match Session::connect(&config).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("{}", e);
            return e.exit_code();
        }
    };

    let backup = PgDump::new(config.pg_dump_bin.clone());
    let outcome = run(&session, &options, &backup).await;
    session.close().await;

    match outcome.and_then(|report| emit(&report, cli.json).map(|_| report)) {
        Ok(report) => report.exit_code(),
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

fn emit(report: &RunReport, json: bool) -> MigrationResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

fn init_tracing(config: &Config) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "migration.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    // stderr keeps stdout clean for --json
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}
