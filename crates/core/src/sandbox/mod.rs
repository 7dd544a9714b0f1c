pub mod container;
pub mod context;
pub mod process;

use std::path::PathBuf;
use std::time::Duration;

pub use container::ContainerSandbox;
pub use context::{CancelToken, ExecutionContext};

/// Where the analyzed artifact is mounted inside every sandbox.
pub const ARTIFACT_MOUNT: &str = "/contracts";

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("sandbox precondition failed: {0}")]
    Precondition(String),
    #[error("timed out after {}s", .limit.as_secs_f64())]
    Timeout { limit: Duration },
    #[error("cancelled before completion")]
    Cancelled,
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("image {image} could not be prepared: {reason}")]
    Image { image: String, reason: String },
}

/// Additional host path exposed to the sandbox. Read-only unless `writable`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub writable: bool,
}

impl Mount {
    pub fn read_only(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            writable: false,
        }
    }
}

/// One command to run against a read-only snapshot of the artifact.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub tool: String,
    pub image: String,
    pub command: Vec<String>,
    pub artifact: PathBuf,
    pub working_dir: String,
    pub mounts: Vec<Mount>,
    pub env: Vec<(String, String)>,
    pub network_enabled: bool,
    pub memory_mb: u64,
    pub cpus: f64,
    pub timeout: Duration,
}

impl SandboxRequest {
    pub fn new(
        tool: impl Into<String>,
        image: impl Into<String>,
        command: Vec<String>,
        artifact: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tool: tool.into(),
            image: image.into(),
            command,
            artifact: artifact.into(),
            working_dir: ARTIFACT_MOUNT.to_string(),
            mounts: Vec::new(),
            env: Vec::new(),
            network_enabled: false,
            memory_mb: 4096,
            cpus: 2.0,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_limits(mut self, memory_mb: u64, cpus: f64, timeout: Duration) -> Self {
        self.memory_mb = memory_mb;
        self.cpus = cpus;
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl SandboxOutput {
    /// Stdout and stderr joined, as kept for audit in tool results.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Isolation substrate able to run one bounded command at a time per call.
pub trait Sandbox: Send + Sync {
    /// Run the request to completion, timeout, or cancellation. The isolated
    /// environment is gone by the time this returns, whatever the outcome.
    fn run(
        &self,
        request: &SandboxRequest,
        ctx: &ExecutionContext,
    ) -> Result<SandboxOutput, SandboxError>;

    /// Cheap, side-effect-free reachability probe.
    fn is_available(&self) -> bool;

    /// Make sure `image` is present locally, pulling it if absent. The pull
    /// is bounded by the context's deadline and stops when it is cancelled.
    fn ensure_image(&self, image: &str, ctx: &ExecutionContext) -> Result<(), SandboxError>;
}
