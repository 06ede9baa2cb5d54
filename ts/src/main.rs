//! Inspect a taskstore directory from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "taskstore", about = "Inspect a taskstore directory")]
struct Cli {
    /// Path to the store directory
    #[arg(long, default_value = ".")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print raw JSON rows for a collection
    Dump { collection: String },
    /// Force a git snapshot commit of the store directory
    Sync,
}

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let conn = rusqlite::Connection::open(cli.store.join("store.db"))?;

    match cli.command {
        Command::Dump { collection } => {
            let mut stmt = conn.prepare("SELECT id, data FROM records WHERE collection = ?1")?;
            let rows = stmt.query_map([&collection], |row| {
                let id: String = row.get(0)?;
                let data: String = row.get(1)?;
                Ok((id, data))
            })?;
            for row in rows {
                let (id, data) = row?;
                println!("{} {}", id.green(), data);
            }
        }
        Command::Sync => {
            taskstore::Store::open(&cli.store)?.sync()?;
            println!("{}", "synced".green());
        }
    }

    Ok(())
}
