use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessKind {
    Sessions,
    PoiEvents,
    Swings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessStatus {
    Completed,
    /// Some units were skipped or failed; `error_message` says why.
    Partial,
}

/// Progress marker of one process for one symbol. Incremental runs start after
/// `last_processed_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingMetadata {
    pub symbol: String,
    pub process: ProcessKind,
    pub last_processed_time: Option<i64>,
    pub records_processed: usize,
    pub status: ProcessStatus,
    pub error_message: Option<String>,
    pub updated_at: i64,
}
