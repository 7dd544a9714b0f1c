use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

/// Finds the compiler version a source file expects.
pub trait VersionResolver: Send + Sync {
    fn resolve(&self, source: &Path) -> Result<String>;
}

/// Reads the first `pragma solidity` directive and returns the first
/// concrete `x.y.z` version it mentions (`^0.8.19` gives `0.8.19`).
#[derive(Debug, Default, Clone, Copy)]
pub struct PragmaResolver;

fn pragma_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pragma\s+solidity\s+([^;]+);").expect("valid regex"))
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("valid regex"))
}

impl PragmaResolver {
    pub fn from_source(source: &str) -> Option<String> {
        let pragma = pragma_regex().captures(source)?.get(1)?.as_str();
        version_regex()
            .find(pragma)
            .map(|m| m.as_str().to_string())
    }
}

impl VersionResolver for PragmaResolver {
    fn resolve(&self, source: &Path) -> Result<String> {
        let content = std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read {}", source.display()))?;
        match Self::from_source(&content) {
            Some(version) => Ok(version),
            None => bail!("no concrete `pragma solidity` version in {}", source.display()),
        }
    }
}
