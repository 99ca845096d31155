//! Configuration module for the session echo engine.

mod analysis;
mod debug;
mod granularity;
mod instruments;
mod persistence;

pub use analysis::{ANALYSIS, AnalysisConfig, MinCandles};
pub use debug::DF;
pub use granularity::{Granularity, SwingPolicy};
pub use instruments::{DEFAULT_PRIMARY, DEFAULT_SECONDARY, InstrumentPair};
pub use persistence::{PERSISTENCE, database_path};
