pub mod container;
pub mod error;
pub mod parse;
pub mod registry;
pub mod result;
pub mod traits;

pub use container::ContainerTool;
pub use error::ToolError;
pub use parse::{ParseOutcome, ParseStrategy, Parsed};
pub use registry::AdapterRegistry;
pub use result::{ToolResult, ToolStatus};
pub use traits::{ResolvedTarget, ToolAdapter, ToolDriver};
