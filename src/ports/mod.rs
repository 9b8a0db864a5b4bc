//! Port traits the domain depends on; implementations live in [`crate::adapters`].

pub mod config_port;
pub mod market_data_port;
pub mod report_port;
pub mod table_store;
