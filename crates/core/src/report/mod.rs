pub mod aggregate;
pub mod builder;
pub mod types;

pub use builder::ReportBuilder;
pub use types::*;
