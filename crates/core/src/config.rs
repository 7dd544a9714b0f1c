use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::finding::Severity;

/// Default location of the project configuration file.
pub const DEFAULT_CONFIG_FILE: &str = ".vulnhunter.toml";

/// Prefix for environment overrides (`VULNHUNTER_MAX_WORKERS=8`, ...).
pub const ENV_PREFIX: &str = "VULNHUNTER_";

/// Family of techniques a tool belongs to; used to derive default tool sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisLayer {
    Static,
    Fuzzing,
    Symbolic,
    Formal,
    Ai,
    All,
}

impl AnalysisLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisLayer::Static => "static",
            AnalysisLayer::Fuzzing => "fuzzing",
            AnalysisLayer::Symbolic => "symbolic",
            AnalysisLayer::Formal => "formal",
            AnalysisLayer::Ai => "ai",
            AnalysisLayer::All => "all",
        }
    }
}

impl fmt::Display for AnalysisLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisLayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" => Ok(AnalysisLayer::Static),
            "fuzzing" => Ok(AnalysisLayer::Fuzzing),
            "symbolic" => Ok(AnalysisLayer::Symbolic),
            "formal" => Ok(AnalysisLayer::Formal),
            "ai" => Ok(AnalysisLayer::Ai),
            "all" => Ok(AnalysisLayer::All),
            other => Err(format!(
                "unknown analysis layer: {other} (expected static|fuzzing|symbolic|formal|ai|all)"
            )),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid value for {key}: {reason}")]
    Env { key: String, reason: String },
}

/// Effective configuration: built-in defaults, then the TOML file, then environment.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub sandbox: SandboxConfig,
    pub report: ReportConfig,
    pub tools: BTreeMap<String, ToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub parallel_tools: bool,
    pub cache_results: bool,
    pub early_exit_on_critical: bool,
    /// Request-wide budget in seconds.
    pub max_analysis_time: u64,
    pub max_workers: usize,
    pub default_tools: Vec<String>,
    pub default_layers: Vec<AnalysisLayer>,
    pub default_compiler_version: String,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxConfig {
    /// Docker-compatible CLI used to run containers.
    pub runtime: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub min_severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfig {
    pub enabled: bool,
    /// Per-invocation timeout in seconds.
    pub timeout: u64,
    pub max_memory_mb: u64,
    pub cpus: f64,
    pub image: String,
    pub extra_args: BTreeMap<String, String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: 300,
            max_memory_mb: 4096,
            cpus: 2.0,
            image: String::new(),
            extra_args: BTreeMap::new(),
        }
    }
}

impl ToolConfig {
    fn with_image(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Self::default()
        }
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.extra_args.get(key).map(String::as_str)
    }

    /// Numeric extra argument, or `default` when absent or not a number.
    pub fn arg_or(&self, key: &str, default: u64) -> u64 {
        self.arg(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Remaining extra arguments as CLI flags, skipping keys a tool already
    /// consumed. An empty or `true` value yields a bare `--key`.
    pub fn extra_flags(&self, consumed: &[&str]) -> Vec<String> {
        let mut flags = Vec::new();
        for (key, value) in &self.extra_args {
            if consumed.contains(&key.as_str()) || value == "false" {
                continue;
            }
            flags.push(format!("--{key}"));
            if !value.is_empty() && value != "true" {
                flags.push(value.clone());
            }
        }
        flags
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut tools = BTreeMap::new();
        tools.insert(
            "slither".to_string(),
            ToolConfig::with_image("trailofbits/eth-security-toolbox:latest"),
        );
        tools.insert(
            "mythril".to_string(),
            ToolConfig {
                timeout: 600,
                max_memory_mb: 8192,
                ..ToolConfig::with_image("mythril/myth:latest")
            },
        );
        tools.insert(
            "echidna".to_string(),
            ToolConfig {
                timeout: 900,
                extra_args: BTreeMap::from([("test-limit".to_string(), "50000".to_string())]),
                ..ToolConfig::with_image("ghcr.io/crytic/echidna/echidna:latest")
            },
        );

        Self {
            pipeline: PipelineConfig {
                parallel_tools: true,
                cache_results: true,
                early_exit_on_critical: false,
                max_analysis_time: 1800,
                max_workers: 4,
                default_tools: Vec::new(),
                default_layers: vec![AnalysisLayer::Static, AnalysisLayer::Fuzzing],
                default_compiler_version: "0.8.19".to_string(),
                cache_dir: PathBuf::from(".vulnhunter_cache"),
            },
            sandbox: SandboxConfig {
                runtime: "docker".to_string(),
            },
            report: ReportConfig {
                min_severity: Severity::Low,
            },
            tools,
            config_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    pipeline: Option<RawPipelineConfig>,
    sandbox: Option<RawSandboxConfig>,
    report: Option<RawReportConfig>,
    tools: BTreeMap<String, RawToolConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPipelineConfig {
    parallel_tools: Option<bool>,
    cache_results: Option<bool>,
    early_exit_on_critical: Option<bool>,
    max_analysis_time: Option<u64>,
    max_workers: Option<usize>,
    default_tools: Option<Vec<String>>,
    default_layers: Option<Vec<AnalysisLayer>>,
    default_compiler_version: Option<String>,
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSandboxConfig {
    runtime: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReportConfig {
    min_severity: Option<Severity>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawToolConfig {
    enabled: Option<bool>,
    timeout: Option<u64>,
    max_memory_mb: Option<u64>,
    cpus: Option<f64>,
    image: Option<String>,
    extra_args: Option<BTreeMap<String, String>>,
}

impl Config {
    /// Load config from a TOML file path, then apply `VULNHUNTER_*` overrides.
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let mut config = Self::from_toml(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            config.config_path = Some(path.display().to_string());
            config
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the given TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw: RawConfig = toml::from_str(content)?;
        let mut config = Self::default();
        config.apply_raw(raw);
        Ok(config)
    }

    fn apply_raw(&mut self, raw: RawConfig) {
        if let Some(p) = raw.pipeline {
            let cfg = &mut self.pipeline;
            if let Some(v) = p.parallel_tools {
                cfg.parallel_tools = v;
            }
            if let Some(v) = p.cache_results {
                cfg.cache_results = v;
            }
            if let Some(v) = p.early_exit_on_critical {
                cfg.early_exit_on_critical = v;
            }
            if let Some(v) = p.max_analysis_time {
                cfg.max_analysis_time = v;
            }
            if let Some(v) = p.max_workers {
                cfg.max_workers = v;
            }
            if let Some(v) = p.default_tools {
                cfg.default_tools = v;
            }
            if let Some(v) = p.default_layers {
                cfg.default_layers = v;
            }
            if let Some(v) = p.default_compiler_version {
                cfg.default_compiler_version = v;
            }
            if let Some(v) = p.cache_dir {
                cfg.cache_dir = v;
            }
        }

        if let Some(runtime) = raw.sandbox.and_then(|s| s.runtime) {
            self.sandbox.runtime = runtime;
        }

        if let Some(min) = raw.report.and_then(|r| r.min_severity) {
            self.report.min_severity = min;
        }

        for (name, t) in raw.tools {
            let tool = self.tools.entry(name).or_default();
            if let Some(v) = t.enabled {
                tool.enabled = v;
            }
            if let Some(v) = t.timeout {
                tool.timeout = v;
            }
            if let Some(v) = t.max_memory_mb {
                tool.max_memory_mb = v;
            }
            if let Some(v) = t.cpus {
                tool.cpus = v;
            }
            if let Some(v) = t.image {
                tool.image = v;
            }
            if let Some(v) = t.extra_args {
                tool.extra_args = v;
            }
        }
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|v| (key, v))
        };

        if let Some((key, v)) = var("PARALLEL_TOOLS") {
            self.pipeline.parallel_tools = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = var("CACHE_RESULTS") {
            self.pipeline.cache_results = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = var("EARLY_EXIT_ON_CRITICAL") {
            self.pipeline.early_exit_on_critical = parse_bool(&key, &v)?;
        }
        if let Some((key, v)) = var("MAX_ANALYSIS_TIME") {
            self.pipeline.max_analysis_time = parse_number(&key, &v)?;
        }
        if let Some((key, v)) = var("MAX_WORKERS") {
            self.pipeline.max_workers = parse_number(&key, &v)?;
        }
        if let Some((_, v)) = var("DEFAULT_COMPILER_VERSION") {
            if !v.trim().is_empty() {
                self.pipeline.default_compiler_version = v.trim().to_string();
            }
        }
        if let Some((_, v)) = var("CACHE_DIR") {
            if !v.trim().is_empty() {
                self.pipeline.cache_dir = PathBuf::from(v.trim());
            }
        }
        if let Some((_, v)) = var("RUNTIME") {
            if !v.trim().is_empty() {
                self.sandbox.runtime = v.trim().to_string();
            }
        }
        Ok(())
    }

    /// Reject values no run could honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_workers == 0 {
            return Err(ConfigError::Invalid("pipeline.max_workers must be at least 1".into()));
        }
        if self.pipeline.max_analysis_time == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_analysis_time must be positive".into(),
            ));
        }
        if self.sandbox.runtime.trim().is_empty() {
            return Err(ConfigError::Invalid("sandbox.runtime must not be empty".into()));
        }
        for (name, tool) in &self.tools {
            if tool.timeout == 0 {
                return Err(ConfigError::Invalid(format!("tools.{name}.timeout must be positive")));
            }
            if tool.max_memory_mb == 0 {
                return Err(ConfigError::Invalid(format!(
                    "tools.{name}.max_memory_mb must be positive"
                )));
            }
            if !(tool.cpus.is_finite() && tool.cpus > 0.0) {
                return Err(ConfigError::Invalid(format!("tools.{name}.cpus must be positive")));
            }
            for key in tool.extra_args.keys() {
                if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(ConfigError::Invalid(format!(
                        "tools.{name}.extra_args key `{key}` must be alphanumeric or '-'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Configuration for a tool, falling back to defaults for unknown names.
    pub fn tool(&self, name: &str) -> ToolConfig {
        self.tools.get(name).cloned().unwrap_or_default()
    }

    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.enabled).unwrap_or(true)
    }

    /// Generate default config file content.
    pub fn default_toml() -> &'static str {
        r#"# vulnhunter configuration

[pipeline]
# Run tools concurrently (false forces serial execution)
parallel_tools = true
# Reuse successful tool results for unchanged sources
cache_results = true
# Stop launching tools once one reports a critical finding
early_exit_on_critical = false
# Budget for the whole analysis, in seconds
max_analysis_time = 1800
max_workers = 4
# Used when no tools or layers are requested: explicit tools win over layers
default_tools = []
default_layers = ["static", "fuzzing"]
# Fallback when the compiler version can't be read from the sources
default_compiler_version = "0.8.19"
cache_dir = ".vulnhunter_cache"

[sandbox]
# Any docker-compatible CLI (docker, podman)
runtime = "docker"

[report]
# Minimum severity to report: "critical", "high", "medium", "low", "info"
min_severity = "low"

[tools.slither]
timeout = 300
max_memory_mb = 4096
image = "trailofbits/eth-security-toolbox:latest"

[tools.mythril]
timeout = 600
max_memory_mb = 8192
image = "mythril/myth:latest"
extra_args = { max-depth = "22" }

[tools.echidna]
timeout = 900
image = "ghcr.io/crytic/echidna/echidna:latest"
extra_args = { test-limit = "50000" }
"#
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Env {
            key: key.to_string(),
            reason: format!("`{other}` is not a boolean (true|false|1|0|yes|no|on|off)"),
        }),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        reason: format!("`{}` is not a valid number", value.trim()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.pipeline.parallel_tools);
        assert_eq!(config.pipeline.max_workers, 4);
        assert_eq!(config.tool("mythril").timeout, 600);
        assert!(config.is_tool_enabled("any-tool"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config_overlays_defaults() {
        let toml = r#"
[pipeline]
parallel_tools = false
default_tools = ["slither"]

[tools.mythril]
timeout = 60

[tools.echidna]
enabled = false
"#;
        let config = Config::from_toml(toml).unwrap();
        assert!(!config.pipeline.parallel_tools);
        assert_eq!(config.pipeline.default_tools, vec!["slither"]);
        // Partial tool sections keep the other defaults.
        let mythril = config.tool("mythril");
        assert_eq!(mythril.timeout, 60);
        assert_eq!(mythril.max_memory_mb, 8192);
        assert_eq!(mythril.image, "mythril/myth:latest");
        assert!(!config.is_tool_enabled("echidna"));
    }

    #[test]
    fn test_default_toml_parses() {
        let config = Config::from_toml(Config::default_toml()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.tool("mythril").extra_args.get("max-depth").map(String::as_str),
            Some("22")
        );
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(Config::from_toml("[pipeline]\nparalel_tools = true\n").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("VULNHUNTER_PARALLEL_TOOLS", "off"),
            ("VULNHUNTER_MAX_WORKERS", "8"),
            ("VULNHUNTER_RUNTIME", "podman"),
        ]);
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(!config.pipeline.parallel_tools);
        assert_eq!(config.pipeline.max_workers, 8);
        assert_eq!(config.sandbox.runtime, "podman");
    }

    #[test]
    fn test_bad_env_value_is_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "VULNHUNTER_MAX_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("VULNHUNTER_MAX_WORKERS"));
    }

    #[test]
    fn test_validate_rejects_malformed_values() {
        let mut config = Config::default();
        config.pipeline.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.tools.get_mut("slither").unwrap().timeout = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .tools
            .get_mut("echidna")
            .unwrap()
            .extra_args
            .insert("x; rm -rf /".into(), "1".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extra_flags_skip_consumed_keys() {
        let tool = ToolConfig {
            extra_args: BTreeMap::from([
                ("test-limit".to_string(), "100".to_string()),
                ("exclude-informational".to_string(), "true".to_string()),
                ("seq-len".to_string(), "50".to_string()),
                ("disabled".to_string(), "false".to_string()),
            ]),
            ..ToolConfig::default()
        };
        assert_eq!(tool.arg_or("test-limit", 1), 100);
        assert_eq!(tool.arg_or("missing", 7), 7);
        assert_eq!(
            tool.extra_flags(&["test-limit"]),
            vec!["--exclude-informational", "--seq-len", "50"]
        );
    }

    #[test]
    fn test_layer_from_str() {
        assert_eq!("Static".parse::<AnalysisLayer>(), Ok(AnalysisLayer::Static));
        assert!("quantum".parse::<AnalysisLayer>().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert!(config.config_path.is_none());
    }
}
