//! Core tracking layer: session normalization, per-broadcaster aggregation,
//! and the population-wide collection with its bulk queries.

pub mod broadcaster;
pub mod population;
pub mod session;

pub use broadcaster::{
    AudienceSample, Broadcaster, FollowerSample, SessionDates, TitleHistoryEntry, SECONDS_PER_DAY,
};
pub use population::Population;
pub use session::{MalformedRecordError, RawRecord, Session, SessionKind, TitleKey};
