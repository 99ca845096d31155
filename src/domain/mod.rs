// Domain types and value objects
mod candle;
mod metadata;
mod period;
mod poi_event;
mod session;
mod swing;

pub use candle::Candle;
pub use metadata::{ProcessKind, ProcessStatus, ProcessingMetadata};
pub use period::{DayPart, MinorSlot, PeriodId, PeriodKind};
pub use poi_event::{EventType, Leader, PoiEvent, PoiEventId, PoiEventKey, Role};
pub use session::{
    Level, Lifecycle, NewSession, PriceLevels, ResolutionType, Session, SessionId, SessionStatus,
    SessionWindow, Side, TrueOpenSource,
};
pub use swing::{Direction, NewSwing, Swing, SwingId};
