pub mod batch;
pub mod project;
pub mod style;

pub use batch::{BatchConfig, ItemConfig};
pub use project::{GenStatus, Project, Stage, VideoResult};
pub use style::VideoStyle;
