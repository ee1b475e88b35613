pub mod store;

pub use store::{AggregationStore, UpdateOutcome};
