//! `perftags` command server.
//!
//! Serves the command protocol over stdin/stdout for one database directory.
//!
//! ```bash
//! perftags write-in.bin write-out.bin read-in.bin read-out.bin ./db ./archive
//! perftags in.bin out.bin ./db ./archive --log-level debug
//! ```

use clap::Parser;
use log::error;
use perftags_core::{default_log_level, flush_logging, init_logging, Server, ServerConfig};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Persistent tag/taggable index driven over stdin.
#[derive(Parser, Debug)]
#[command(name = "perftags")]
#[command(version)]
struct Args {
    /// `writeIn writeOut readIn readOut databaseDir archiveDir`, or
    /// `in out databaseDir archiveDir`.
    #[arg(required = true, num_args = 4..=6)]
    paths: Vec<PathBuf>,

    /// trace|debug|info|warn|error; defaults by build mode.
    #[arg(long, env = "PERFTAGS_LOG")]
    log_level: Option<String>,

    /// Defaults to `<databaseDir>/logs`.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Bucket shards per direction; only used when creating a database.
    #[arg(long)]
    shard_count: Option<usize>,

    /// Journal size that triggers an automatic flush.
    #[arg(long)]
    flush_threshold_bytes: Option<u64>,

    /// Accept the `override` command.
    #[arg(long)]
    enable_fault_injection: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=process_exit module=cli status=error error={}", err);
            flush_logging();
            eprintln!("perftags: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = ServerConfig::from_paths(args.paths)?;
    if let Some(shard_count) = args.shard_count {
        config.engine = config.engine.with_shard_count(shard_count);
    }
    if let Some(bytes) = args.flush_threshold_bytes {
        config.engine = config.engine.with_journal_flush_threshold(bytes);
    }
    config.engine = config
        .engine
        .with_fault_injection(args.enable_fault_injection);

    let log_dir = match args.log_dir {
        Some(dir) => absolute(&dir)?,
        None => absolute(&config.engine.database_dir.join("logs"))?,
    };
    let level = args.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, &log_dir)?;

    let mut server = Server::open(config)?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    server.run(stdin.lock(), stdout.lock())?;
    flush_logging();
    Ok(())
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
