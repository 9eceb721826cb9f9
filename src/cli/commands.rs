//! CLI command definitions for svc-launch.
//!
//! This module maps the launcher's three roles onto subcommands: `serve`
//! for the API server, `workers` for the consumer pool, `flush` for the
//! standalone cache clear, plus `status` for queue introspection.

use std::path::PathBuf;

use clap::Parser;

use crate::flush::CacheFlusher;
use crate::launcher::{PoolConfig, ServerLaunch, ServerStyle, WorkerPool};
use crate::profile::{FlushTarget, LaunchProfile, DEFAULT_QUEUE};
use crate::status::QueueInspector;

/// Deployment supervisor for the API server and its worker pool.
#[derive(Parser)]
#[command(name = "svc-launch")]
#[command(about = "Flush the cache, launch the API server and run job-queue worker pools")]
#[command(version)]
#[command(
    long_about = "svc-launch replaces the deployment's shell launcher scripts.\n\nIt clears the configured cache databases, starts the HTTP application server in the foreground under a named profile, and runs pools of job-queue consumer processes.\n\nExample usage:\n  svc-launch serve --profile licensed\n  svc-launch workers -c .config.licensed.toml -p 6379 -d 0"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Flush the cache, then run the API server in the foreground.
    Serve(ServeArgs),

    /// Run a pool of job-queue consumer processes until all exit.
    Workers(WorkersArgs),

    /// Clear cache databases without starting anything.
    Flush(FlushArgs),

    /// Report the pending job count of a queue.
    Status(StatusArgs),
}

/// Arguments for `svc-launch serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Deployment profile (licensed, open, default).
    #[arg(long, default_value = "default")]
    pub profile: String,

    /// Server launch style (gunicorn, uvicorn).
    #[arg(long, default_value = "gunicorn")]
    pub style: String,

    /// Configuration file override for the downstream application.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Bind host override.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port override.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Server worker count override.
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Request timeout override, in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Application target override (`module:attribute`).
    #[arg(long)]
    pub app: Option<String>,

    /// Access-log destination for the gunicorn style ("-" for stdout).
    #[arg(long)]
    pub access_log: Option<String>,

    /// Server executable override (e.g. a virtualenv's gunicorn).
    #[arg(long)]
    pub server_bin: Option<String>,

    /// Enable auto-reload (uvicorn style only).
    #[arg(long)]
    pub reload: bool,

    /// Keep the cache warm: skip the pre-launch flush.
    #[arg(long)]
    pub skip_flush: bool,
}

/// Arguments for `svc-launch workers`.
#[derive(Parser, Debug)]
pub struct WorkersArgs {
    /// Configuration file for the consumer processes.
    #[arg(short = 'c', long, default_value = ".config.toml")]
    pub config: PathBuf,

    /// Cache store host.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Cache store port.
    #[arg(short = 'p', long, default_value = "6379")]
    pub port: u16,

    /// Store database index holding the queue.
    #[arg(short = 'd', long, default_value = "0")]
    pub db: u8,

    /// Queue to consume from.
    #[arg(short = 'q', long, default_value = DEFAULT_QUEUE)]
    pub queue: String,

    /// Number of consumer processes.
    #[arg(short = 'n', long, default_value = "5")]
    pub count: usize,
}

/// Arguments for `svc-launch flush`.
#[derive(Parser, Debug)]
pub struct FlushArgs {
    /// Cache store host.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Cache store port.
    #[arg(short = 'p', long, default_value = "6379")]
    pub port: u16,

    /// Database index to clear; repeat for several. Defaults to 1, 2, 3.
    #[arg(short = 'd', long = "db", value_name = "DB")]
    pub databases: Vec<u8>,

    /// Output the flush report as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `svc-launch status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Cache store host.
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Cache store port.
    #[arg(short = 'p', long, default_value = "6379")]
    pub port: u16,

    /// Store database index holding the queue.
    #[arg(short = 'd', long, default_value = "0")]
    pub db: u8,

    /// Queue to inspect.
    #[arg(short = 'q', long, default_value = DEFAULT_QUEUE)]
    pub queue: String,

    /// Output the snapshot as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before
/// running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
///
/// This is the main entry point for the svc-launch CLI.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Workers(args) => run_workers_command(args).await,
        Commands::Flush(args) => run_flush_command(args).await,
        Commands::Status(args) => run_status_command(args).await,
    }
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let mut profile = LaunchProfile::preset(&args.profile)?;

    if let Some(config) = args.config {
        profile = profile.with_config_path(config);
    }
    if let Some(host) = args.host {
        profile = profile.with_host(host);
    }
    if let Some(port) = args.port {
        profile = profile.with_port(port);
    }
    if let Some(workers) = args.workers {
        profile = profile.with_workers(workers);
    }
    if let Some(timeout) = args.timeout {
        profile = profile.with_timeout_secs(timeout);
    }
    if let Some(app) = args.app {
        profile = profile.with_app_module(app);
    }

    let style = ServerStyle::parse(&args.style)?;
    let mut launch = ServerLaunch::new(profile, style)
        .with_reload(args.reload)
        .with_skip_flush(args.skip_flush);
    if let Some(dest) = args.access_log {
        launch = launch.with_access_log(dest);
    }
    if let Some(bin) = args.server_bin {
        launch = launch.with_server_program(bin);
    }

    let status = launch.launch().await?;
    if !status.success() {
        anyhow::bail!("API server exited with {}", status);
    }
    Ok(())
}

async fn run_workers_command(args: WorkersArgs) -> anyhow::Result<()> {
    let config = PoolConfig::default()
        .with_config_path(args.config)
        .with_host(args.host)
        .with_port(args.port)
        .with_db(args.db)
        .with_queue_name(args.queue)
        .with_count(args.count);

    let pool = WorkerPool::new(config);
    let outcome = pool.launch().await?;

    if !outcome.all_clean() {
        anyhow::bail!(
            "{} of {} consumers exited abnormally",
            outcome.failed(),
            outcome.exit_codes.len()
        );
    }
    Ok(())
}

async fn run_flush_command(args: FlushArgs) -> anyhow::Result<()> {
    let databases = if args.databases.is_empty() {
        FlushTarget::default().databases
    } else {
        args.databases
    };

    let target = FlushTarget::new(args.host, args.port, databases);
    let report = CacheFlusher::new(target).flush().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for db in &report.databases {
            println!("db {}: {} keys removed", db.db, db.keys_removed);
        }
        println!("total: {} keys removed", report.total_keys_removed());
    }
    Ok(())
}

async fn run_status_command(args: StatusArgs) -> anyhow::Result<()> {
    let url = format!("redis://{}:{}/{}", args.host, args.port, args.db);
    let inspector = QueueInspector::connect(&url, &args.queue).await?;
    let status = inspector.status().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("queue '{}': {} pending jobs", status.queue, status.pending);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let args = vec!["svc-launch", "serve"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.profile, "default");
                assert_eq!(args.style, "gunicorn");
                assert!(args.config.is_none());
                assert!(args.port.is_none());
                assert!(!args.reload);
                assert!(!args.skip_flush);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_serve_with_all_options() {
        let args = vec![
            "svc-launch",
            "serve",
            "--profile",
            "licensed",
            "--style",
            "uvicorn",
            "-c",
            "/etc/api/.config.licensed.toml",
            "--host",
            "0.0.0.0",
            "-p",
            "9032",
            "-w",
            "4",
            "--timeout",
            "60",
            "--app",
            "api.main:app",
            "--access-log",
            "/var/log/api/access.log",
            "--server-bin",
            "/opt/venv/bin/gunicorn",
            "--reload",
            "--skip-flush",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.profile, "licensed");
                assert_eq!(args.style, "uvicorn");
                assert_eq!(
                    args.config,
                    Some(PathBuf::from("/etc/api/.config.licensed.toml"))
                );
                assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
                assert_eq!(args.port, Some(9032));
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.timeout, Some(60));
                assert_eq!(args.app.as_deref(), Some("api.main:app"));
                assert_eq!(args.access_log.as_deref(), Some("/var/log/api/access.log"));
                assert_eq!(args.server_bin.as_deref(), Some("/opt/venv/bin/gunicorn"));
                assert!(args.reload);
                assert!(args.skip_flush);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_workers_short_options() {
        let args = vec![
            "svc-launch",
            "workers",
            "-c",
            ".config.licensed.toml",
            "-p",
            "5379",
            "-d",
            "2",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Workers(args) => {
                assert_eq!(args.config, PathBuf::from(".config.licensed.toml"));
                assert_eq!(args.port, 5379);
                assert_eq!(args.db, 2);
                assert_eq!(args.queue, "default");
                assert_eq!(args.count, 5);
            }
            _ => panic!("Expected Workers command"),
        }
    }

    #[test]
    fn test_flush_repeated_databases() {
        let args = vec!["svc-launch", "flush", "-p", "5379", "-d", "1", "-d", "2", "-d", "3"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Flush(args) => {
                assert_eq!(args.port, 5379);
                assert_eq!(args.databases, vec![1, 2, 3]);
                assert!(!args.json);
            }
            _ => panic!("Expected Flush command"),
        }
    }

    #[test]
    fn test_flush_databases_default_empty() {
        let args = vec!["svc-launch", "flush"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            // Defaulting to {1, 2, 3} happens at run time so the report
            // reflects what was actually requested.
            Commands::Flush(args) => assert!(args.databases.is_empty()),
            _ => panic!("Expected Flush command"),
        }
    }

    #[test]
    fn test_status_parses() {
        let args = vec!["svc-launch", "status", "-q", "default", "-d", "0", "-j"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Status(args) => {
                assert_eq!(args.queue, "default");
                assert_eq!(args.db, 0);
                assert!(args.json);
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_global_log_level() {
        let args = vec!["svc-launch", "serve", "--log-level", "debug"];
        let cli = Cli::try_parse_from(args).expect("should parse");
        assert_eq!(cli.log_level, "debug");
    }
}
