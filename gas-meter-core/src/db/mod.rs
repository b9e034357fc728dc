pub mod state_history_queries;

pub use state_history_queries::RecorderHistorySource;
