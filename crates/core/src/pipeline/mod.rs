//! Orchestration: pick adapters, run them in isolation from each other,
//! and fold their results into one report.

pub mod selection;
pub mod target;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::config::{Config, ConfigError};
use crate::report::{AnalysisReport, AnalysisStatus, ReportBuilder, ReportError};
use crate::sandbox::{CancelToken, ExecutionContext};
use crate::tool::{ToolAdapter, ToolError, ToolResult, ToolStatus};
use crate::version::{PragmaResolver, VersionResolver};

pub use selection::AnalysisRequest;
pub use target::{solidity_sources, AnalysisTarget};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
    #[error("invalid target: {0}")]
    Target(String),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// What happened to one selected adapter.
enum Outcome {
    Ran(ToolResult),
    Skipped(String),
}

/// Per-run values shared by every adapter task.
struct RunContext<'a> {
    path: &'a Path,
    ctx: ExecutionContext,
    artifact_hash: String,
    early_exit: &'a AtomicBool,
}

pub struct Pipeline {
    config: Arc<Config>,
    registry: crate::tool::AdapterRegistry,
    resolver: Box<dyn VersionResolver>,
    cache: Option<Mutex<CacheManager>>,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, registry: crate::tool::AdapterRegistry) -> Self {
        Self {
            config,
            registry,
            resolver: Box::new(PragmaResolver),
            cache: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn VersionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Reuse successful results across runs. Ignored unless `cache_results` is on.
    pub fn with_cache(mut self, cache: CacheManager) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &crate::tool::AdapterRegistry {
        &self.registry
    }

    /// Handle that aborts the whole run, including running containers.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn analyze(
        &self,
        target: &AnalysisTarget,
        request: &AnalysisRequest,
    ) -> Result<AnalysisReport, PipelineError> {
        self.config.validate()?;
        let selection = selection::select(&self.registry, &self.config, request)?;
        let contracts = target.contracts()?;
        let artifact_hash = AnalysisTarget::fingerprint(&contracts, &target.path);

        let mut builder = ReportBuilder::new(target.name.clone())
            .contract_address(target.address.clone())
            .contracts(contracts);
        builder.start()?;
        for note in selection.notes {
            builder.note(note);
        }

        let budget = Duration::from_secs(self.config.pipeline.max_analysis_time);
        let ctx = ExecutionContext::unbounded()
            .with_deadline(Instant::now() + budget)
            .with_cancel(self.cancel.clone())
            .with_compiler_version(Some(self.compiler_version(target)));

        let adapters = selection.adapters;
        info!(
            target = %target.path.display(),
            tools = ?adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
            parallel = self.config.pipeline.parallel_tools,
            "starting analysis"
        );
        if adapters.is_empty() {
            builder.note("no tools selected");
        }

        let early_exit = AtomicBool::new(false);
        let run = RunContext {
            path: &target.path,
            ctx,
            artifact_hash,
            early_exit: &early_exit,
        };

        let outcomes: Vec<Outcome> = if self.config.pipeline.parallel_tools && adapters.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.pipeline.max_workers.min(adapters.len()))
                .build()
                .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
            pool.install(|| adapters.par_iter().map(|a| self.run_adapter(*a, &run)).collect())
        } else {
            adapters.iter().map(|a| self.run_adapter(*a, &run)).collect()
        };

        for outcome in outcomes {
            match outcome {
                Outcome::Ran(result) => builder.record(result),
                Outcome::Skipped(note) => builder.note(note),
            }
        }
        self.flush_cache();

        let status = self.final_status(builder.results(), &run.ctx);
        let report = builder.finish(status)?;
        info!(
            status = %report.status,
            vulnerabilities = report.metrics.total_vulnerabilities,
            risk_score = report.metrics.risk_score,
            "analysis finished"
        );
        Ok(report)
    }

    fn compiler_version(&self, target: &AnalysisTarget) -> String {
        let fallback = &self.config.pipeline.default_compiler_version;
        let Some(source) = target.main_source() else {
            return fallback.clone();
        };
        match self.resolver.resolve(source) {
            Ok(version) => {
                debug!(version = %version, source = %source.display(), "compiler version resolved");
                version
            }
            Err(e) => {
                warn!(error = %e, fallback = %fallback, "could not resolve compiler version");
                fallback.clone()
            }
        }
    }

    fn run_adapter(&self, adapter: &dyn ToolAdapter, run: &RunContext<'_>) -> Outcome {
        let name = adapter.name();
        if run.early_exit.load(Ordering::SeqCst) {
            info!(tool = name, "skipped after critical finding");
            return Outcome::Skipped(format!("{name}: skipped, critical finding reported earlier"));
        }
        if run.ctx.cancel.is_cancelled() {
            return Outcome::Ran(ToolResult::failure(name, &ToolError::Cancelled, 0.0));
        }
        if run.ctx.is_expired() {
            return Outcome::Ran(ToolResult::failure(
                name,
                &ToolError::Timeout(Duration::from_secs(self.config.pipeline.max_analysis_time)),
                0.0,
            ));
        }

        let key = CacheManager::key(
            &adapter.fingerprint(),
            run.ctx.compiler_version.as_deref(),
            &run.artifact_hash,
        );
        if let Some(hit) = self.cache_lookup(&key) {
            info!(tool = name, "using cached result");
            self.note_critical(&hit, run);
            return Outcome::Ran(hit);
        }

        let started = Instant::now();
        if let Err(e) = adapter.initialize(&run.ctx) {
            warn!(tool = name, error = %e, "initialization failed, skipping");
            adapter.cleanup();
            let result = ToolResult::failure(name, &e, started.elapsed().as_secs_f64())
                .with_metadata("skipped", true);
            return Outcome::Ran(result);
        }

        let analyzed = catch_unwind(AssertUnwindSafe(|| adapter.analyze(run.path, &run.ctx)));
        adapter.cleanup();
        let result = match analyzed {
            Ok(result) => result,
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(tool = name, panic = %msg, "adapter panicked");
                ToolResult::failure(
                    name,
                    &ToolError::Execution(format!("adapter panicked: {msg}")),
                    started.elapsed().as_secs_f64(),
                )
            }
        };

        info!(
            tool = name,
            status = %result.status,
            findings = result.findings.len(),
            seconds = result.execution_time,
            "tool finished"
        );
        self.note_critical(&result, run);
        self.cache_store(&key, &result);
        Outcome::Ran(result)
    }

    fn note_critical(&self, result: &ToolResult, run: &RunContext<'_>) {
        if self.config.pipeline.early_exit_on_critical && result.has_critical() {
            run.early_exit.store(true, Ordering::SeqCst);
        }
    }

    /// Tools skipped because they could not be prepared (runtime or image
    /// unavailable) were never attempted and do not fail the run.
    fn final_status(&self, results: &[ToolResult], ctx: &ExecutionContext) -> AnalysisStatus {
        let attempted: Vec<&ToolResult> = results
            .iter()
            .filter(|r| !(r.is_skipped() && r.status == ToolStatus::Failed))
            .collect();
        let succeeded = attempted.iter().filter(|r| r.is_success()).count();
        if ctx.cancel.is_cancelled() {
            AnalysisStatus::Cancelled
        } else if attempted.is_empty() || succeeded > 0 {
            AnalysisStatus::Completed
        } else if ctx.is_expired() {
            AnalysisStatus::Timeout
        } else {
            AnalysisStatus::Failed
        }
    }

    fn cache_enabled(&self) -> bool {
        self.config.pipeline.cache_results && self.cache.is_some()
    }

    fn cache_lookup(&self, key: &str) -> Option<ToolResult> {
        if !self.cache_enabled() {
            return None;
        }
        let cache = self.cache.as_ref()?.lock().ok()?;
        cache.lookup(key)
    }

    fn cache_store(&self, key: &str, result: &ToolResult) {
        if !self.cache_enabled() {
            return;
        }
        let Some(Ok(mut cache)) = self.cache.as_ref().map(|c| c.lock()) else {
            return;
        };
        if let Err(e) = cache.store(key, result) {
            warn!(tool = %result.tool_name, error = %e, "failed to cache result");
        }
    }

    fn flush_cache(&self) {
        if !self.cache_enabled() {
            return;
        }
        if let Some(Ok(cache)) = self.cache.as_ref().map(|c| c.lock()) {
            if let Err(e) = cache.flush() {
                warn!(error = %e, "failed to flush result cache");
            }
        }
    }
}
