pub mod activity;
pub mod db;
pub mod derive;
pub mod domain;
pub mod error;
pub mod estimate;
pub mod meter;
pub mod timestamp;

pub use error::MeterError;
pub use meter::{GasMeter, HistorySource, LogStore};
