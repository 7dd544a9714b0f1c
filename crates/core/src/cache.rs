use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::tool::ToolResult;

/// Schema version; bump when the cached result layout changes
const SCHEMA_VERSION: u32 = 1;

/// Cache manifest tracking stored results
#[derive(Serialize, Deserialize)]
struct Manifest {
    schema_version: u32,
    entries: HashMap<String, Entry>,
}

impl Manifest {
    fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            entries: HashMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Entry {
    tool: String,
    result_file: String,
    stored_at: DateTime<Utc>,
}

/// On-disk cache of successful tool results, keyed by everything that can
/// change a tool's output.
pub struct CacheManager {
    cache_dir: PathBuf,
    manifest: Manifest,
}

impl CacheManager {
    /// Open or create a cache in the given directory
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        let results_dir = cache_dir.join("results");
        fs::create_dir_all(&results_dir)
            .with_context(|| format!("Failed to create cache dir: {}", results_dir.display()))?;

        let manifest_path = cache_dir.join("manifest.json");
        let manifest = if manifest_path.exists() {
            let data = fs::read_to_string(&manifest_path)?;
            match serde_json::from_str::<Manifest>(&data) {
                // Invalidate if schema version changed
                Ok(m) if m.schema_version == SCHEMA_VERSION => m,
                _ => Manifest::empty(),
            }
        } else {
            Manifest::empty()
        };

        Ok(Self {
            cache_dir,
            manifest,
        })
    }

    /// Compute SHA256 hash of file contents
    pub fn hash_contents(contents: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(contents);
        format!("{:x}", hasher.finalize())
    }

    /// Cache key for one tool invocation.
    pub fn key(fingerprint: &str, compiler_version: Option<&str>, artifact_hash: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [fingerprint, compiler_version.unwrap_or("-"), artifact_hash] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Look up a cached result. Hits are marked with `metadata.cached = true`.
    pub fn lookup(&self, key: &str) -> Option<ToolResult> {
        let entry = self.manifest.entries.get(key)?;
        let path = self.cache_dir.join("results").join(&entry.result_file);
        let data = fs::read_to_string(path).ok()?;
        let result: ToolResult = serde_json::from_str(&data).ok()?;
        Some(result.with_metadata("cached", true))
    }

    /// Store a result. Only successful results are cached.
    pub fn store(&mut self, key: &str, result: &ToolResult) -> Result<bool> {
        if !result.is_success() {
            return Ok(false);
        }
        let result_file = format!("{key}.json");
        let path = self.cache_dir.join("results").join(&result_file);
        let data = serde_json::to_string(result)?;
        fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;

        self.manifest.entries.insert(
            key.to_string(),
            Entry {
                tool: result.tool_name.clone(),
                result_file,
                stored_at: Utc::now(),
            },
        );
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.manifest.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.entries.is_empty()
    }

    /// Number of cached results per tool.
    pub fn tools(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for entry in self.manifest.entries.values() {
            *counts.entry(entry.tool.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Flush manifest to disk
    pub fn flush(&self) -> Result<()> {
        let manifest_path = self.cache_dir.join("manifest.json");
        let data = serde_json::to_string_pretty(&self.manifest)?;
        fs::write(manifest_path, data)?;
        Ok(())
    }

    /// Clear all cached results
    pub fn clear(&mut self) -> Result<()> {
        let results_dir = self.cache_dir.join("results");
        if results_dir.exists() {
            fs::remove_dir_all(&results_dir)?;
            fs::create_dir_all(&results_dir)?;
        }
        self.manifest.entries.clear();
        self.flush()
    }
}
