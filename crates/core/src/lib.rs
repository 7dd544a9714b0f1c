pub mod cache;
pub mod config;
pub mod finding;
pub mod pipeline;
pub mod report;
pub mod sandbox;
pub mod tool;
pub mod version;
