pub mod display;
pub mod taxonomy;
pub mod types;

pub use types::*;
