//! Debugging feature flags.

pub struct LogFlags {
    /// Activate trace_time macro (for cool scope-level timing)
    pub log_performance: bool,

    /// New-period discovery and recompute selection per symbol.
    pub log_detector: bool,

    /// Range (re)computation, including lifecycle resets on level changes.
    pub log_session_builder: bool,

    /// Every accepted lifecycle transition and the event it upserts.
    pub log_poi_engine: bool,

    pub log_swings: bool,

    /// Row counts on snapshot load and commit.
    pub log_storage: bool,
}

pub const DF: LogFlags = LogFlags {
    log_performance: false,

    log_detector: false,
    log_session_builder: false,
    log_poi_engine: false,
    log_swings: false,

    log_storage: true,
};
