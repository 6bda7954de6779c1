use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PipelineError, Result};

/// File extension recognized as generated binding source.
pub const SOURCE_EXTENSION: &str = "rs";

/// An immutable, deterministically ordered set of generated source files
/// rooted under one directory.
#[derive(Debug, Clone)]
pub struct SourceSet {
    root: PathBuf,
    files: Vec<PathBuf>,
}

impl SourceSet {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Enumerates the generated-source directory recursively, keeping only
/// recognized source files. Non-source entries are expected next to
/// generated code (sidecar metadata, depfiles) and are skipped silently.
pub fn locate(source_dir: &Path) -> Result<SourceSet> {
    if !source_dir.is_dir() {
        return Err(PipelineError::DirectoryNotFound {
            path: source_dir.to_path_buf(),
        });
    }

    // Canonical root so the collected paths stay valid from any working
    // directory the toolchain later runs in.
    let root = fs::canonicalize(source_dir).map_err(|source| PipelineError::Io {
        op: "failed to resolve source directory",
        path: source_dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    collect_sources(&root, &mut files)?;
    files.sort();

    debug!(root = %root.display(), count = files.len(), "located generated sources");

    Ok(SourceSet { root, files })
}

fn collect_sources(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::Io {
        op: "failed to read source directory",
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io {
            op: "failed to read source directory entry in",
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_sources(&path, files)?;
        } else if path
            .extension()
            .map_or(false, |ext| ext == SOURCE_EXTENSION)
        {
            files.push(path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_directory_is_reported() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");

        let err = locate(&missing).unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryNotFound { .. }));
    }

    #[test]
    fn keeps_only_recognized_sources() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bindings.rs"), "// generated").unwrap();
        fs::write(temp.path().join("bindings.d"), "depfile").unwrap();
        fs::write(temp.path().join("metadata.json"), "{}").unwrap();

        let sources = locate(temp.path()).unwrap();
        assert_eq!(sources.len(), 1);
        assert!(sources.files()[0].ends_with("bindings.rs"));
    }

    #[test]
    fn recurses_into_subdirectories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("gsl").join("specfunc");
        fs::create_dir_all(&nested).unwrap();
        fs::write(temp.path().join("a.rs"), "// generated").unwrap();
        fs::write(nested.join("b.rs"), "// generated").unwrap();

        let sources = locate(temp.path()).unwrap();
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn discovery_order_is_deterministic() {
        let temp = TempDir::new().unwrap();
        for name in ["c.rs", "a.rs", "b.rs"] {
            fs::write(temp.path().join(name), "// generated").unwrap();
        }

        let first = locate(temp.path()).unwrap();
        let second = locate(temp.path()).unwrap();
        assert_eq!(first.files(), second.files());

        let stems: Vec<_> = first
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(stems, ["a.rs", "b.rs", "c.rs"]);
    }

    #[test]
    fn empty_directory_yields_empty_set() {
        let temp = TempDir::new().unwrap();
        let sources = locate(temp.path()).unwrap();
        assert!(sources.is_empty());
    }
}
