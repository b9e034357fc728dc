pub mod activity_event;
pub mod reading;
pub mod update;

pub use activity_event::ActivityEvent;
pub use reading::{DerivedMetrics, Reading, ReadingLog};
pub use update::{ConsumptionEstimate, ReadingUpdate};
