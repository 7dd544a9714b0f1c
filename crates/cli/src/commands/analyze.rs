use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use vulnhunter::cache::CacheManager;
use vulnhunter::config::{Config, DEFAULT_CONFIG_FILE};
use vulnhunter::finding::Severity;
use vulnhunter::pipeline::{AnalysisRequest, AnalysisTarget, Pipeline};
use vulnhunter::sandbox::{ContainerSandbox, Sandbox};

use crate::output;
use crate::{AnalyzeArgs, OutputFormat};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    // 1. Configuration: file, environment, then command-line overrides
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = Config::load(&config_path)?;
    if args.no_cache {
        config.pipeline.cache_results = false;
    }
    if let Some(timeout) = args.timeout {
        config.pipeline.max_analysis_time = timeout;
    }
    if args.serial {
        config.pipeline.parallel_tools = false;
    }
    config.validate()?;
    let min_severity = args
        .severity
        .map(Severity::from)
        .unwrap_or(config.report.min_severity);

    // 2. Target
    let target = AnalysisTarget::from_path(&args.path)?.with_address(args.address.clone());
    if !args.quiet {
        eprintln!(
            "Analyzing {} ({} source files)...",
            target.path.display(),
            target.sources().len()
        );
    }

    // 3. Adapters and pipeline
    let sandbox: Arc<dyn Sandbox> = Arc::new(ContainerSandbox::new(config.sandbox.runtime.clone()));
    let registry = vulnhunter_adapters::default_registry(&config, sandbox);
    let cache = if config.pipeline.cache_results {
        match CacheManager::open(config.pipeline.cache_dir.clone()) {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "result cache unavailable, continuing without it");
                None
            }
        }
    } else {
        None
    };
    let mut pipeline = Pipeline::new(Arc::new(config), registry);
    if let Some(cache) = cache {
        pipeline = pipeline.with_cache(cache);
    }

    // Ctrl-C cancels the run so running containers go through cleanup;
    // a second Ctrl-C exits immediately.
    let cancel = pipeline.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        eprintln!("Interrupted, stopping running tools...");
        cancel.cancel();
    }) {
        warn!(error = %e, "could not install interrupt handler");
    }

    // 4. Run
    let request = AnalysisRequest {
        layers: args.layers.clone(),
        tools: args.tools.clone(),
    };
    let mut report = pipeline.analyze(&target, &request)?;

    // 5. Filter by severity
    report.retain_at_least(min_severity);

    // 6. Output
    let plain = args.no_color || args.output.is_some();
    let rendered = match args.format {
        OutputFormat::Json => output::json::render(&report)?,
        OutputFormat::Sarif => output::sarif::render(&report)?,
        OutputFormat::Text => output::text::render(&report, args.quiet, plain),
    };
    match &args.output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            if !args.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => print!("{rendered}"),
    }

    // 7. Exit code
    if !report.vulnerabilities.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}
