#![allow(clippy::collapsible_if)]
#![allow(clippy::too_many_arguments)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod utils;

pub use config::{ANALYSIS, Granularity, InstrumentPair, PERSISTENCE};
pub use data::{CalendarWindowProvider, MemoryStore, SnapshotStorage, SqliteStorage};
pub use engine::{Pipeline, RunMode, RunReport};

// CLI argument parsing
use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// SQLite database. Defaults to the per-granularity file under the data directory.
    #[arg(long)]
    pub db: Option<String>,

    /// Candle resolution of the dataset: 1m or 4h
    #[arg(long, default_value = "1m")]
    pub granularity: Granularity,

    #[arg(long, default_value = config::DEFAULT_PRIMARY)]
    pub primary: String,

    #[arg(long, default_value = config::DEFAULT_SECONDARY)]
    pub secondary: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create sessions, scan the pair and rebuild swings
    Run {
        /// Reset every lifecycle and rescan from each true open
        #[arg(long, default_value_t = false)]
        full: bool,
    },
    /// Roll back resolutions recorded at or before the first return
    Repair {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Check range symmetry, timestamp order and swing structure
    Verify,
    /// Print session, event and swing counts
    Summary,
}

impl Cli {
    pub fn pair(&self) -> InstrumentPair {
        InstrumentPair::new(&self.primary, &self.secondary)
    }

    pub fn db_path(&self) -> String {
        self.db
            .clone()
            .unwrap_or_else(|| config::database_path(self.granularity))
    }
}
