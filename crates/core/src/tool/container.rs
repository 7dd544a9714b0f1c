use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::ToolConfig;
use crate::sandbox::{ExecutionContext, Sandbox, SandboxRequest};

use super::error::ToolError;
use super::parse::parse_chain;
use super::result::ToolResult;
use super::traits::ToolDriver;

/// Environment variable carrying the resolved compiler version.
pub const COMPILER_VERSION_ENV: &str = "SOLC_VERSION";

/// Shared machinery for tools that run inside a container image.
pub struct ContainerTool {
    name: String,
    config: ToolConfig,
    sandbox: Arc<dyn Sandbox>,
    initialized: AtomicBool,
}

impl ContainerTool {
    pub fn new(name: impl Into<String>, config: ToolConfig, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            name: name.into(),
            config,
            sandbox,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    pub fn fingerprint(&self) -> String {
        let args: Vec<String> = self
            .config
            .extra_args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}|{}|{}", self.name, self.config.image, args.join(","))
    }

    pub fn is_available(&self) -> bool {
        self.sandbox.is_available()
    }

    /// Pull the image if needed. Only the first successful call does work.
    pub fn initialize(&self, ctx: &ExecutionContext) -> Result<(), ToolError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !self.sandbox.is_available() {
            return Err(ToolError::Unavailable("container runtime is not reachable".into()));
        }
        self.sandbox.ensure_image(&self.config.image, ctx)?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(tool = %self.name, image = %self.config.image, "tool initialized");
        Ok(())
    }

    pub fn cleanup(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            debug!(tool = %self.name, "tool cleaned up");
        }
    }

    /// Resolve, run, parse and classify one invocation.
    pub fn run<D: ToolDriver + ?Sized>(
        &self,
        driver: &D,
        path: &Path,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let started = Instant::now();
        let elapsed = || started.elapsed().as_secs_f64();

        let target = match driver.resolve(path) {
            Ok(target) => target,
            Err(e) => {
                warn!(tool = %self.name, path = %path.display(), error = %e, "no usable input");
                return ToolResult::failure(&self.name, &e, elapsed());
            }
        };

        let command = driver.command(&target, &self.config);
        let mut request = SandboxRequest::new(
            self.name.clone(),
            self.config.image.clone(),
            command,
            &target.mount_dir,
        )
        .with_limits(
            self.config.max_memory_mb,
            self.config.cpus,
            Duration::from_secs(self.config.timeout),
        )
        .with_network(driver.needs_network());
        if let Some(version) = &ctx.compiler_version {
            request = request.with_env(COMPILER_VERSION_ENV, version.clone());
        }

        info!(tool = %self.name, target = %target.target, "running analysis");
        let output = match self.sandbox.run(&request, ctx) {
            Ok(output) => output,
            Err(e) => {
                let err = ToolError::from(e);
                warn!(tool = %self.name, error = %err, "sandbox run failed");
                return self.annotate(ToolResult::failure(&self.name, &err, elapsed()), ctx);
            }
        };

        let exit_code = output.exit_code;
        let raw = output.combined();
        let result = match parse_chain(driver.strategies(), &output) {
            Ok(parsed) if driver.accepts(&output, Some(&parsed)) => {
                debug!(
                    tool = %self.name,
                    parser = parsed.strategy,
                    findings = parsed.findings.len(),
                    exit_code,
                    "output parsed"
                );
                let strategy = parsed.strategy;
                ToolResult::success(&self.name, parsed.findings, elapsed())
                    .with_metadata("parser", strategy)
            }
            Ok(parsed) => {
                let err = ToolError::Execution(format!(
                    "exit code {exit_code}; output rejected after parsing with {}",
                    parsed.strategy
                ));
                ToolResult::failure(&self.name, &err, elapsed())
            }
            Err(_) if driver.accepts(&output, None) => {
                debug!(tool = %self.name, exit_code, "completed without reportable output");
                ToolResult::success(&self.name, Vec::new(), elapsed()).with_metadata("parser", "marker")
            }
            Err(parse_err) => {
                let err = if exit_code != 0 {
                    ToolError::Execution(format!("exit code {exit_code}: {}", tail(&output.stderr)))
                } else {
                    parse_err
                };
                warn!(tool = %self.name, error = %err, "analysis failed");
                ToolResult::failure(&self.name, &err, elapsed())
            }
        };

        self.annotate(result.with_raw_output(raw), ctx)
            .with_metadata("exit_code", exit_code)
    }

    fn annotate(&self, result: ToolResult, ctx: &ExecutionContext) -> ToolResult {
        let result = result.with_metadata("image", self.config.image.clone());
        match &ctx.compiler_version {
            Some(v) => result.with_metadata("compiler_version", v.clone()),
            None => result,
        }
    }
}

/// Last non-empty line of `text`, for compact error messages.
fn tail(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no diagnostic output")
}
