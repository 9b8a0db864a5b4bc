//! Core domain types and logic.

pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod ingest;
pub mod merge;
pub mod ml;
pub mod ohlcv;
pub mod table;
