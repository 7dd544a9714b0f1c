use std::path::Path;
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::context::ExecutionContext;
use super::process::{run_bounded, run_command, WaitOutcome};
use super::{Sandbox, SandboxError, SandboxOutput, SandboxRequest, ARTIFACT_MOUNT};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const HOUSEKEEPING_TIMEOUT: Duration = Duration::from_secs(15);
const PULL_TIMEOUT: Duration = Duration::from_secs(900);

/// Runs requests through a docker-compatible container CLI (`docker`, `podman`).
#[derive(Debug, Clone)]
pub struct ContainerSandbox {
    runtime: String,
}

impl ContainerSandbox {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }

    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    fn kill(&self, name: &str) {
        match run_command(&self.runtime, &["kill", name], HOUSEKEEPING_TIMEOUT) {
            Ok(out) if out.exit_code == 0 => debug!(container = name, "killed container"),
            Ok(out) => debug!(container = name, stderr = %out.stderr.trim(), "kill returned non-zero"),
            Err(e) => warn!(container = name, error = %e, "failed to kill container"),
        }
    }
}

impl Default for ContainerSandbox {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Removes the named container on drop, on every exit path.
struct ContainerGuard<'a> {
    runtime: &'a str,
    name: String,
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        match run_command(self.runtime, &["rm", "-f", &self.name], HOUSEKEEPING_TIMEOUT) {
            Ok(_) => debug!(container = %self.name, "container removed"),
            Err(e) => warn!(container = %self.name, error = %e, "container cleanup failed"),
        }
    }
}

impl Sandbox for ContainerSandbox {
    fn run(
        &self,
        request: &SandboxRequest,
        ctx: &ExecutionContext,
    ) -> Result<SandboxOutput, SandboxError> {
        if request.timeout.is_zero() {
            return Err(SandboxError::Precondition("timeout must be positive".into()));
        }
        if ctx.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        let timeout = ctx.effective_timeout(request.timeout);
        if timeout.is_zero() {
            return Err(SandboxError::Timeout { limit: timeout });
        }

        let name = container_name(&request.tool);
        let args = run_args(request, &name)?;
        debug!(container = %name, image = %request.image, ?args, "launching sandbox");

        let _guard = ContainerGuard {
            runtime: &self.runtime,
            name: name.clone(),
        };

        let mut command = Command::new(&self.runtime);
        command.args(&args);
        let outcome = run_bounded(&mut command, timeout, Some(&ctx.cancel), || self.kill(&name))?;

        match outcome {
            WaitOutcome::Exited(out) => {
                debug!(container = %name, exit_code = out.exit_code, "sandbox exited");
                Ok(SandboxOutput {
                    stdout: out.stdout,
                    stderr: out.stderr,
                    exit_code: out.exit_code,
                })
            }
            WaitOutcome::TimedOut => {
                warn!(container = %name, limit = ?timeout, "sandbox timed out");
                Err(SandboxError::Timeout { limit: timeout })
            }
            WaitOutcome::Cancelled => {
                info!(container = %name, "sandbox cancelled");
                Err(SandboxError::Cancelled)
            }
        }
    }

    fn is_available(&self) -> bool {
        match run_command(&self.runtime, &["info"], PROBE_TIMEOUT) {
            Ok(out) => out.exit_code == 0,
            Err(e) => {
                debug!(runtime = %self.runtime, error = %e, "runtime probe failed");
                false
            }
        }
    }

    fn ensure_image(&self, image: &str, ctx: &ExecutionContext) -> Result<(), SandboxError> {
        if ctx.cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(SandboxError::Timeout { limit: Duration::ZERO });
        }
        let listed = run_command(
            &self.runtime,
            &["images", "-q", image],
            ctx.effective_timeout(HOUSEKEEPING_TIMEOUT),
        )
        .map_err(|e| match e {
            SandboxError::Timeout { .. } => e,
            other => SandboxError::Unavailable(other.to_string()),
        })?;
        if listed.exit_code != 0 {
            return Err(SandboxError::Unavailable(listed.stderr.trim().to_string()));
        }
        if !listed.stdout.trim().is_empty() {
            return Ok(());
        }

        let timeout = ctx.effective_timeout(PULL_TIMEOUT);
        if timeout.is_zero() {
            return Err(SandboxError::Timeout { limit: timeout });
        }
        info!(image, limit = ?timeout, "pulling image");
        let mut command = Command::new(&self.runtime);
        command.args(["pull", image]);
        let outcome = run_bounded(&mut command, timeout, Some(&ctx.cancel), || {}).map_err(|e| {
            SandboxError::Image {
                image: image.to_string(),
                reason: e.to_string(),
            }
        })?;
        match outcome {
            WaitOutcome::Exited(out) if out.exit_code == 0 => Ok(()),
            WaitOutcome::Exited(out) => Err(SandboxError::Image {
                image: image.to_string(),
                reason: out.stderr.trim().to_string(),
            }),
            WaitOutcome::TimedOut => {
                warn!(image, limit = ?timeout, "image pull timed out");
                Err(SandboxError::Timeout { limit: timeout })
            }
            WaitOutcome::Cancelled => {
                info!(image, "image pull cancelled");
                Err(SandboxError::Cancelled)
            }
        }
    }
}

/// `vulnhunter-<tool>-<unix micros>-<8 random hex>`; unique across concurrent runs.
pub fn container_name(tool: &str) -> String {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    let tool: String = tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("vulnhunter-{tool}-{micros}-{}", &suffix[..8])
}

/// Arguments to the runtime CLI for one request (everything after the program name).
pub fn run_args(request: &SandboxRequest, name: &str) -> Result<Vec<String>, SandboxError> {
    let (entrypoint, rest) = request
        .command
        .split_first()
        .ok_or_else(|| SandboxError::Precondition("empty command".into()))?;
    let artifact = absolute(&request.artifact)?;

    let mut args: Vec<String> = vec![
        "run".into(),
        "--rm".into(),
        "--name".into(),
        name.into(),
        "--workdir".into(),
        request.working_dir.clone(),
        "--volume".into(),
        format!("{}:{ARTIFACT_MOUNT}:ro", artifact.display()),
    ];

    for mount in &request.mounts {
        let host = absolute(&mount.host)?;
        let mode = if mount.writable { "rw" } else { "ro" };
        args.push("--volume".into());
        args.push(format!("{}:{}:{mode}", host.display(), mount.container));
    }

    for (key, value) in &request.env {
        args.push("--env".into());
        args.push(format!("{key}={value}"));
    }

    args.extend([
        "--memory".into(),
        format!("{}m", request.memory_mb),
        "--cpus".into(),
        format!("{}", request.cpus),
        "--security-opt".into(),
        "no-new-privileges".into(),
        "--cap-drop".into(),
        "ALL".into(),
    ]);

    if !request.network_enabled {
        args.push("--network".into());
        args.push("none".into());
    }

    args.push("--entrypoint".into());
    args.push(entrypoint.clone());
    args.push(request.image.clone());
    args.extend(rest.iter().cloned());
    Ok(args)
}

fn absolute(path: &Path) -> Result<std::path::PathBuf, SandboxError> {
    std::fs::canonicalize(path).map_err(|e| {
        SandboxError::Precondition(format!("{} is not accessible: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::Mount;

    fn request(dir: &Path) -> SandboxRequest {
        SandboxRequest::new(
            "slither",
            "trailofbits/eth-security-toolbox",
            vec!["slither".into(), ".".into(), "--json".into(), "-".into()],
            dir,
        )
    }

    #[test]
    fn test_container_names_are_unique() {
        let a = container_name("slither");
        let b = container_name("slither");
        assert_ne!(a, b);
        assert!(a.starts_with("vulnhunter-slither-"));
    }

    #[test]
    fn test_container_name_sanitizes_tool() {
        let name = container_name("my tool/v2");
        assert!(name.starts_with("vulnhunter-my-tool-v2-"));
    }

    #[test]
    fn test_run_args_are_locked_down_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(&request(dir.path()), "c1").unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--cap-drop ALL"));
        assert!(joined.contains("--security-opt no-new-privileges"));
        assert!(joined.contains(":/contracts:ro"));
        assert!(joined.contains("--memory 4096m"));
        assert!(joined.ends_with("--entrypoint slither trailofbits/eth-security-toolbox . --json -"));
    }

    #[test]
    fn test_run_args_network_and_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        let req = request(dir.path())
            .with_network(true)
            .with_env("SOLC_VERSION", "0.8.19")
            .with_mount(Mount::read_only(extra.path(), "/deps"))
            .with_mount(Mount {
                host: extra.path().to_path_buf(),
                container: "/out".into(),
                writable: true,
            });
        let joined = run_args(&req, "c2").unwrap().join(" ");
        assert!(!joined.contains("--network none"));
        assert!(joined.contains("--env SOLC_VERSION=0.8.19"));
        assert!(joined.contains(":/deps:ro"));
        assert!(joined.contains(":/out:rw"));
    }

    #[test]
    fn test_run_args_rejects_missing_artifact_and_empty_command() {
        let missing = request(Path::new("/definitely/not/here"));
        assert!(matches!(
            run_args(&missing, "c3"),
            Err(SandboxError::Precondition(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let mut empty = request(dir.path());
        empty.command.clear();
        assert!(matches!(
            run_args(&empty, "c4"),
            Err(SandboxError::Precondition(_))
        ));
    }

    #[test]
    fn test_unreachable_runtime_is_unavailable() {
        let sandbox = ContainerSandbox::new("/nonexistent/container-runtime");
        assert!(!sandbox.is_available());
    }

    #[test]
    fn test_zero_timeout_rejected_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = ContainerSandbox::new("/nonexistent/container-runtime");
        let mut req = request(dir.path());
        req.timeout = Duration::ZERO;
        let err = sandbox.run(&req, &ExecutionContext::unbounded()).unwrap_err();
        assert!(matches!(err, SandboxError::Precondition(_)));
    }
}
