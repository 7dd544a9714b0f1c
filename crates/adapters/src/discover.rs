//! Input selection helpers shared by the adapters.

use std::path::{Path, PathBuf};

use vulnhunter::pipeline::solidity_sources;
use vulnhunter::tool::{ResolvedTarget, ToolError};

/// Mount the file's directory and point the tool at the file name.
pub(crate) fn file_target(file: &Path) -> Result<ResolvedTarget, ToolError> {
    let name = file
        .file_name()
        .ok_or_else(|| ToolError::Execution(format!("{} has no file name", file.display())))?
        .to_string_lossy()
        .into_owned();
    let mount_dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(ResolvedTarget {
        mount_dir,
        target: name,
        sources: vec![file.to_path_buf()],
    })
}

/// Single Solidity file passthrough; anything else is rejected.
pub(crate) fn solidity_file(file: &Path) -> Result<ResolvedTarget, ToolError> {
    if file.extension().is_some_and(|ext| ext == "sol") {
        file_target(file)
    } else {
        Err(ToolError::Execution(format!(
            "{} is not a Solidity source file",
            file.display()
        )))
    }
}

/// Solidity sources directly inside `dir` (not recursive), sorted.
pub(crate) fn top_level_sources(dir: &Path) -> Vec<PathBuf> {
    solidity_sources(dir)
        .into_iter()
        .filter(|p| p.parent() == Some(dir))
        .collect()
}

pub(crate) fn missing(path: &Path) -> ToolError {
    ToolError::Execution(format!("{} does not exist", path.display()))
}
