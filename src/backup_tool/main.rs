//! Standalone backup tool for the bot database.
//!
//! Writes a `VACUUM INTO` copy next to the other backups and prints a short
//! summary of what the copy contains.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use media_saver_bot::storage::{Database, create_database_backup};

/// Database backup tool.
#[derive(Parser, Debug)]
#[command(name = "backup_database")]
#[command(about = "Creates a consistent copy of the media saver bot database")]
#[command(version)]
struct Args {
    /// Path to the SQLite database.
    #[arg(short, long, default_value = "data/bot.db")]
    database: PathBuf,

    /// Directory the backup is written to.
    #[arg(short, long, default_value = "backups")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if !args.database.exists() {
        eprintln!("✗ Database not found: {}", args.database.display());
        return ExitCode::FAILURE;
    }

    let db = match Database::open(&args.database).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("✗ Failed to open database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = match create_database_backup(&db, &args.out).await {
        Ok(path) => {
            println!("✓ Backup written to: {}", path.display());
            match db.user_counts().await {
                Ok(counts) => {
                    println!("  Users:     {}", counts.total_users);
                    println!("  Downloads: {}", counts.total_downloads);
                }
                Err(e) => eprintln!("  ⚠ Could not read counters: {e}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Backup failed: {e}");
            ExitCode::FAILURE
        }
    };

    db.close().await;
    code
}
