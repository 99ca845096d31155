mod calendar;
mod memory;
mod repository;
mod storage;

pub use {
    calendar::CalendarWindowProvider,
    memory::MemoryStore,
    repository::{
        CandleRepository, MetadataRepository, PoiEventRepository, SessionRepository,
        SessionWindowProvider, Store, SwingRepository,
    },
    storage::{SnapshotStorage, SqliteStorage},
};
