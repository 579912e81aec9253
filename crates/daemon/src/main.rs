use std::path::PathBuf;

use clap::Parser;

use bucketfs_daemon::state::{AppState, LOG_DIR_NAME};

mod cli;
mod logging;

use cli::op::{Op, OpContext};
use cli::Command;

#[derive(Parser, Debug)]
#[command(name = "bucketfs", version, about = "Object storage buckets as a cached filesystem")]
struct Cli {
    /// Work directory holding config.toml, the cache and reports
    #[arg(long, global = true, env = "BUCKETFS_WORK_DIR")]
    work_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();

    // file logging only once the work directory exists
    let log_dir = AppState::work_dir(cli.work_dir.clone())
        .ok()
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.join(LOG_DIR_NAME));
    let logging_guard = match logging::init_logging(log_dir.as_deref()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e}");
            logging::init_logging(None).ok()
        }
    };

    let ctx = OpContext::new(cli.work_dir);
    match cli.command.execute(&ctx) {
        Ok(output) => {
            let rendered = output.to_string();
            if !rendered.is_empty() {
                println!("{rendered}");
            }
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            drop(logging_guard);
            std::process::exit(1);
        }
    }
}
