pub mod command;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod state_board;
pub mod store;
pub mod transform;

pub use command::ReadingCommand;
pub use pipeline::{Envelope, Pipeline};
