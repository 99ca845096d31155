mod affected_sessions;
mod pipeline;
mod poi_engine;
mod repair;
mod report;
mod session_builder;
mod swing_runner;
mod verify;

use strum_macros::{Display, EnumString};

pub use affected_sessions::{AffectedSessionDetector, AffectedSessions, DataRange};
pub use pipeline::Pipeline;
pub use poi_engine::{PairOutcome, PoiEventEngine};
pub use repair::{RepairedSession, repair_resolution_timing};
pub use report::{Failure, RunReport, Skip, SkipReason, store_summary};
pub use session_builder::{RangeOutcome, SessionBuilder};
pub use swing_runner::SwingRunner;
pub use verify::{IntegrityIssue, lifecycle_problems, verify_store};

/// Full rebuilds every lifecycle from its true open. Incremental resumes each
/// session from its last scanned candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum RunMode {
    Full,
    Incremental,
}
