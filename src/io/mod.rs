//! I/O utilities for persisting and restoring tracked data.
//!
//! The population lives on disk as a CSV file with JSON blob columns for
//! the per-broadcaster sequences; see [`csv_store`].

pub mod csv_store;

// Re-export commonly used types and functions
pub use csv_store::{load_population, load_population_or_default, save_population, StoreError};
