mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vulnhunter::config::AnalysisLayer;
use vulnhunter::finding::Severity;

#[derive(Parser)]
#[command(name = "vulnhunter")]
#[command(about = "Run smart contract security tools in sandboxes and merge their findings")]
#[command(version)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a Solidity file or project directory
    Analyze(AnalyzeArgs),
    /// List the analysis tools and their configuration
    Tools {
        /// Path to config file (default: .vulnhunter.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Also probe the container runtime
        #[arg(long)]
        check: bool,
    },
    /// Generate a default .vulnhunter.toml config file
    Init,
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    /// Path to a .sol file or a directory of contracts
    pub path: PathBuf,

    /// Analysis layers to run (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    pub layers: Vec<AnalysisLayer>,

    /// Run only these tools (comma-separated); overrides --layers
    #[arg(short, long, value_delimiter = ',')]
    pub tools: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Minimum severity to report (default: report.min_severity from config)
    #[arg(short, long)]
    pub severity: Option<SeverityFilter>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to config file (default: .vulnhunter.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Deployed address of the contract, recorded in the report
    #[arg(long)]
    pub address: Option<String>,

    /// Maximum analysis time in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Disable result caching
    #[arg(long)]
    pub no_cache: bool,

    /// Run tools one after another
    #[arg(long)]
    pub serial: bool,

    /// Suppress banner and summary
    #[arg(short, long)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(ValueEnum, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Sarif,
}

#[derive(ValueEnum, Clone, Copy)]
pub enum SeverityFilter {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl From<SeverityFilter> for Severity {
    fn from(filter: SeverityFilter) -> Self {
        match filter {
            SeverityFilter::Critical => Severity::Critical,
            SeverityFilter::High => Severity::High,
            SeverityFilter::Medium => Severity::Medium,
            SeverityFilter::Low => Severity::Low,
            SeverityFilter::Info => Severity::Info,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("vulnhunter=debug,vulnhunter_adapters=debug")
    } else {
        EnvFilter::new("vulnhunter=info,vulnhunter_adapters=info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
    debug!(verbose = cli.verbose, "logging initialized");

    match cli.command {
        Commands::Analyze(args) => commands::analyze::run(args),
        Commands::Tools { config, check } => commands::tools::run(config, check),
        Commands::Init => commands::init::run(),
    }
}
