pub mod batch_runner;

pub use batch_runner::{App, BatchSummary};
