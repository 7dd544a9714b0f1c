use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::cache::CacheManager;
use crate::report::AnalyzedContract;

use super::PipelineError;

const SOURCE_EXTENSION: &str = "sol";

/// Directories never searched for sources.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "out", "cache"];

/// What a run analyzes: one source file or a source tree.
#[derive(Debug, Clone)]
pub struct AnalysisTarget {
    pub path: PathBuf,
    pub name: String,
    pub address: Option<String>,
    sources: Vec<PathBuf>,
}

impl AnalysisTarget {
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        if !path.exists() {
            return Err(PipelineError::Target(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        let name = canonical
            .file_stem()
            .or_else(|| path.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty() && n != ".")
            .unwrap_or_else(|| "contracts".to_string());
        let sources = solidity_sources(&path);
        Ok(Self {
            path,
            name,
            address: None,
            sources,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_address(mut self, address: Option<String>) -> Self {
        self.address = address;
        self
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// The file compiler settings are read from.
    pub fn main_source(&self) -> Option<&Path> {
        if self.path.is_file() {
            Some(self.path.as_path())
        } else {
            self.sources.first().map(PathBuf::as_path)
        }
    }

    /// Every source with its content hash.
    pub fn contracts(&self) -> Result<Vec<AnalyzedContract>, PipelineError> {
        self.sources
            .iter()
            .map(|path| {
                let content = std::fs::read(path).map_err(|e| {
                    PipelineError::Target(format!("cannot read {}: {e}", path.display()))
                })?;
                Ok(AnalyzedContract {
                    name: path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    path: path.clone(),
                    content_hash: CacheManager::hash_contents(&content),
                })
            })
            .collect()
    }

    /// One hash over all sources and their relative paths.
    pub fn fingerprint(contracts: &[AnalyzedContract], root: &Path) -> String {
        let joined: Vec<String> = contracts
            .iter()
            .map(|c| {
                let rel = c.path.strip_prefix(root).unwrap_or(&c.path);
                format!("{}={}", rel.display(), c.content_hash)
            })
            .collect();
        CacheManager::hash_contents(joined.join("\n").as_bytes())
    }
}

/// Solidity sources under `path`, sorted. A file path is returned as is when
/// it has the source extension.
pub fn solidity_sources(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if has_source_extension(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_source_extension(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&&*name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discovers_sorted_sources_and_skips_vendor_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::write(dir.path().join("src/B.sol"), "contract B {}").unwrap();
        fs::write(dir.path().join("A.sol"), "contract A {}").unwrap();
        fs::write(dir.path().join("node_modules/dep/C.sol"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let target = AnalysisTarget::from_path(dir.path()).unwrap();
        let names: Vec<String> = target
            .sources()
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["A.sol", "src/B.sol"]);
        assert_eq!(target.main_source().unwrap(), dir.path().join("A.sol"));
    }

    #[test]
    fn test_single_file_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Vault.sol");
        fs::write(&file, "contract Vault {}").unwrap();
        let target = AnalysisTarget::from_path(&file).unwrap();
        assert_eq!(target.name, "Vault");
        let contracts = target.contracts().unwrap();
        assert_eq!(contracts.len(), 1);
        assert_eq!(contracts[0].content_hash.len(), 64);
    }

    #[test]
    fn test_missing_target_is_error() {
        assert!(matches!(
            AnalysisTarget::from_path("/no/such/contract.sol"),
            Err(PipelineError::Target(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("A.sol");
        fs::write(&file, "contract A {}").unwrap();
        let t = AnalysisTarget::from_path(dir.path()).unwrap();
        let before = AnalysisTarget::fingerprint(&t.contracts().unwrap(), dir.path());
        fs::write(&file, "contract A { uint x; }").unwrap();
        let after = AnalysisTarget::fingerprint(&t.contracts().unwrap(), dir.path());
        assert_ne!(before, after);
    }
}
