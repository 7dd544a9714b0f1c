use std::path::{Path, PathBuf};

use crate::config::{AnalysisLayer, ToolConfig};
use crate::sandbox::{ExecutionContext, SandboxOutput};

use super::error::ToolError;
use super::parse::{ParseStrategy, Parsed};
use super::result::ToolResult;

/// Core trait for all analysis tools.
/// The pipeline drives tools only through this interface.
pub trait ToolAdapter: Send + Sync {
    /// Unique identifier (e.g., "slither")
    fn name(&self) -> &str;

    fn layer(&self) -> AnalysisLayer;

    /// Human-readable description of the tool
    fn description(&self) -> &str;

    /// Stable description of everything that changes the tool's output for a
    /// given input (image, arguments, limits). Used as part of cache keys.
    fn fingerprint(&self) -> String {
        self.name().to_string()
    }

    /// Make the tool ready to run within the run's deadline. Idempotent.
    fn initialize(&self, ctx: &ExecutionContext) -> Result<(), ToolError>;

    /// Analyze `path` (a file or a directory). Never panics on tool failure:
    /// every outcome is reported through the returned result.
    fn analyze(&self, path: &Path, ctx: &ExecutionContext) -> ToolResult;

    /// Release anything `initialize` acquired. Idempotent.
    fn cleanup(&self);

    fn is_available(&self) -> bool;
}

/// Concrete input chosen for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    /// Host directory mounted read-only into the sandbox.
    pub mount_dir: PathBuf,
    /// Tool argument, relative to the mount.
    pub target: String,
    /// Source files the invocation covers.
    pub sources: Vec<PathBuf>,
}

/// Tool-specific conventions plugged into [`ContainerTool::run`](super::ContainerTool::run).
pub trait ToolDriver: Send + Sync {
    /// Pick the concrete input for `path`. Errors here mean no sandbox is launched.
    fn resolve(&self, path: &Path) -> Result<ResolvedTarget, ToolError>;

    /// Full command line, first element being the executable.
    fn command(&self, target: &ResolvedTarget, config: &ToolConfig) -> Vec<String>;

    fn needs_network(&self) -> bool {
        false
    }

    /// Parsers tried in order.
    fn strategies(&self) -> &[Box<dyn ParseStrategy>];

    /// Whether this output counts as a completed run. Tools exiting non-zero
    /// because they found something are accepted when their output parsed.
    fn accepts(&self, _output: &SandboxOutput, parsed: Option<&Parsed>) -> bool {
        parsed.is_some()
    }
}
