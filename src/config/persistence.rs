//! File persistence configuration
use crate::config::Granularity;

/// The Master Persistence Configuration
pub struct PersistenceConfig {
    /// Directory holding the per-granularity databases
    pub directory: &'static str,
    /// Base filename (without interval suffix or extension)
    pub filename_base: &'static str,
    /// Bound parameters per multi-value INSERT. SQLite caps this at 32766.
    pub max_bind_params: usize,
}

pub const PERSISTENCE: PersistenceConfig = PersistenceConfig {
    directory: "data",
    filename_base: "echo",
    max_bind_params: 30_000,
};

/// Example: "data/echo_4h.sqlite"
pub fn database_path(granularity: Granularity) -> String {
    format!(
        "{}/{}_{}.sqlite",
        PERSISTENCE.directory, PERSISTENCE.filename_base, granularity
    )
}
