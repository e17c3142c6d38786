pub mod project_store;

pub use project_store::{ProjectStore, ResponseSnapshots};
