use anyhow::{bail, Result};
use std::path::PathBuf;

use mediatheca::backup::BackupManager;
use mediatheca::config::Config;
use mediatheca::db::Database;
use mediatheca::error::StartError;
use mediatheca::library;
use mediatheca::logging;
use mediatheca::provider::ProviderClient;
use mediatheca::scan::{FifoJobQueue, Orchestrator, ScanMode, ScanSession};

struct Cli {
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut command = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mediatheca {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                command.push(other.to_string());
            }
        }
        i += 1;
    }

    Cli {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"mediatheca - AI-assisted media library organizer

USAGE:
    mediatheca [OPTIONS] <COMMAND>

COMMANDS:
    import <DIR>                Register media files under DIR
    status                      Show the current scan session
    scan --mode MODE [--dry-run]
                                Start a scan (organize-unassigned,
                                reanalyze-all, reorganize-all)
    cancel                      Cancel the running scan
    reset                       Return a finished scan to idle
    apply-cached --mode MODE    Apply a cached dry run for real
    cached-count --mode MODE    Count cached dry-run decisions
    folders                     List the folder tree
    backup info|restore|cleanup Manage the folder snapshot
    provider test|models        Probe the configured provider

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIATHECA_LOG      Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/mediatheca/config.toml"#
    );
}

/// Pull the value following a `--flag` out of the command tail.
fn flag_value(command: &[String], flag: &str) -> Option<String> {
    command
        .iter()
        .position(|a| a == flag)
        .and_then(|i| command.get(i + 1))
        .cloned()
}

fn parse_mode(command: &[String]) -> Result<ScanMode> {
    let raw = match flag_value(command, "--mode") {
        Some(raw) => raw,
        None => bail!("--mode is required (organize-unassigned, reanalyze-all, reorganize-all)"),
    };
    match ScanMode::parse(&raw) {
        Some(mode) => Ok(mode),
        None => bail!("unknown mode {raw:?}"),
    }
}

fn print_session(session: &ScanSession) {
    println!("status:     {}", session.status.as_str());
    println!("mode:       {}", session.mode.as_str());
    println!("dry run:    {}", session.dry_run);
    println!(
        "progress:   {}/{} ({}%)",
        session.processed,
        session.total,
        session.percentage()
    );
    println!("applied:    {}", session.applied);
    println!("failed:     {}", session.failed);
    if let Some(started) = session.started_at {
        println!("started:    {started}");
    }
    if let Some(completed) = session.completed_at {
        println!("completed:  {completed}");
    }
    if let Some(ref error) = session.error {
        println!("error:      {error}");
    }
    if !session.results.is_empty() {
        println!("recent decisions:");
        for entry in session.results.iter().rev().take(10) {
            println!(
                "  {} -> {:?} ({})",
                entry.filename,
                entry.decision.action,
                entry.decision.reason
            );
        }
    }
}

fn main() -> Result<()> {
    let cli = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match cli.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;

    let client = ProviderClient::from_config(&config.provider);
    let orchestrator = Orchestrator::new(&db, &client, &config);

    let command: Vec<&str> = cli.command.iter().map(|s| s.as_str()).collect();
    match command.as_slice() {
        ["import", dir, ..] => {
            let summary = library::import_directory(
                &db,
                std::path::Path::new(dir),
                &config.library.media_extensions,
            )?;
            println!(
                "{} files discovered, {} registered",
                summary.discovered, summary.imported
            );
        }
        ["status", ..] => {
            print_session(&orchestrator.status()?);
        }
        ["scan", rest @ ..] => {
            let mode = parse_mode(&cli.command)?;
            let dry_run = rest.contains(&"--dry-run");
            let mut queue = FifoJobQueue::new();

            match orchestrator.start(mode, dry_run, &mut queue) {
                Ok(()) => {}
                Err(StartError::AlreadyRunning) => bail!("a scan is already running"),
                Err(e) => return Err(e.into()),
            }

            let session = orchestrator.status()?;
            let mut state = orchestrator.hierarchy_state(&session)?;
            while let Some(chunk) = queue.next() {
                orchestrator.process_chunk(&chunk, &mut state)?;
            }

            print_session(&orchestrator.status()?);
        }
        ["cancel", ..] => {
            let mut queue = FifoJobQueue::new();
            let session = orchestrator.cancel(&mut queue)?;
            println!("scan is now {}", session.status.as_str());
        }
        ["reset", ..] => {
            orchestrator.reset()?;
            println!("scan session reset");
        }
        ["apply-cached", ..] => {
            let mode = parse_mode(&cli.command)?;
            let report = orchestrator.apply_cached(mode)?;
            println!("{} applied, {} failed", report.applied, report.failed);
        }
        ["cached-count", ..] => {
            let mode = parse_mode(&cli.command)?;
            println!("{}", orchestrator.get_cached_count(mode)?);
        }
        ["folders", ..] => {
            let tree = db.folder_tree()?;
            if tree.is_empty() {
                println!("no folders yet");
            }
            for node in tree {
                let count = db.assignments(node.id)?.len();
                println!("{} ({count})", node.path);
            }
        }
        ["backup", "info", ..] | ["backup"] => {
            let backups = BackupManager::new(&db);
            match backups.get_backup_info()? {
                Some(info) => println!(
                    "snapshot from {}: {} folders, {} assignments",
                    info.timestamp, info.folder_count, info.assignment_count
                ),
                None => println!("no backup snapshot"),
            }
        }
        ["backup", "restore", ..] => {
            let backups = BackupManager::new(&db);
            let report = backups.restore()?;
            println!(
                "{} folders and {} assignments restored",
                report.folders_restored, report.assignments_restored
            );
            backups.cleanup()?;
        }
        ["backup", "cleanup", ..] => {
            BackupManager::new(&db).cleanup()?;
            println!("backup snapshot deleted");
        }
        ["provider", "test", ..] => match client.test() {
            None => println!("{}: ok", client.name()),
            Some(diagnostic) => println!("{}: {diagnostic}", client.name()),
        },
        ["provider", "models", ..] => {
            for model in client.available_models() {
                println!("{model}");
            }
        }
        [] => {
            print_help();
        }
        other => {
            bail!("unknown command {:?}; see --help", other.join(" "));
        }
    }

    Ok(())
}
