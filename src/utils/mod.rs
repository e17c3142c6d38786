pub mod download;
pub mod logging;
pub mod text;
