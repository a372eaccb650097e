pub mod analytics;
pub mod api;
pub mod config;
pub mod io;
pub mod tracking;

// Re-export the main error types for convenience
pub use api::ApiError;
pub use io::StoreError;
pub use tracking::MalformedRecordError;

// Re-export the tracking core
pub use tracking::{
    AudienceSample, Broadcaster, FollowerSample, Population, RawRecord, Session, SessionDates,
    SessionKind, TitleHistoryEntry, TitleKey, SECONDS_PER_DAY,
};

// Re-export analytics entry points
pub use analytics::{population_report, summarize, HistorySummary, PopulationReport, QuantityStats};

// Re-export population persistence
pub use io::{load_population, load_population_or_default, save_population};

// Re-export API collaborators
pub use api::{HelixClient, HelixCredentials, RequestTimings};

pub use config::DatasetConfig;
