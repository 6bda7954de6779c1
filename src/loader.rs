use std::collections::BTreeMap;
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::fs;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// One compiled artifact resolved into memory.
#[derive(Debug)]
pub struct LoadedArtifact {
    name: String,
    path: PathBuf,
    library: Library,
}

impl LoadedArtifact {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a typed entry point out of this artifact.
    ///
    /// # Safety
    ///
    /// The caller asserts that `T` matches the actual signature of the
    /// exported symbol; a mismatch is undefined behavior at call time.
    pub unsafe fn symbol<T>(&self, symbol: &str) -> Result<Symbol<'_, T>> {
        unsafe { self.library.get(symbol.as_bytes()) }.map_err(|source| {
            PipelineError::MissingSymbol {
                artifact: self.name.clone(),
                symbol: symbol.to_string(),
                source,
            }
        })
    }
}

/// Resolution scope over exactly one output directory.
///
/// The context owns its library handles and its lookup table is built fresh
/// per pipeline run; there is no shared or static registry, so same-named
/// artifacts from different runs can never shadow one another. Names resolve
/// only against artifacts rooted at this context's directory.
#[derive(Debug)]
pub struct IsolatedContext {
    root: PathBuf,
    artifacts: BTreeMap<String, LoadedArtifact>,
}

impl IsolatedContext {
    pub(crate) fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            artifacts: BTreeMap::new(),
        }
    }

    /// The output directory this context is scoped to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Artifact names resolvable through this context, in stable order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&LoadedArtifact> {
        self.artifacts.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&LoadedArtifact> {
        self.artifacts
            .get(name)
            .ok_or_else(|| PipelineError::MissingArtifact {
                name: name.to_string(),
            })
    }

    /// Releases the underlying library handles. Dropping the context does
    /// the same; this form surfaces unload errors instead of ignoring them.
    pub fn close(self) -> Result<()> {
        for (_, artifact) in self.artifacts {
            artifact
                .library
                .close()
                .map_err(|source| PipelineError::ArtifactUnloadable {
                    path: artifact.path,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Loads every compiled artifact in the output directory into a fresh
/// isolated context. The directory must hold the output of a prior
/// successful compile; a missing or artifact-free directory is a caller
/// ordering bug and fails with [`PipelineError::NoArtifactsToLoad`].
pub fn load(output_dir: &Path) -> Result<IsolatedContext> {
    if !output_dir.is_dir() {
        return Err(PipelineError::NoArtifactsToLoad {
            path: output_dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(output_dir).map_err(|source| PipelineError::Io {
        op: "failed to read output directory",
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut artifacts = BTreeMap::new();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::Io {
            op: "failed to read output directory entry in",
            path: output_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.extension().map_or(false, |ext| ext == DLL_EXTENSION) {
            continue;
        }

        let name = artifact_name(&path);
        let library = unsafe { Library::new(&path) }.map_err(|source| {
            PipelineError::ArtifactUnloadable {
                path: path.clone(),
                source,
            }
        })?;

        debug!(artifact = %name, path = %path.display(), "loaded artifact");
        artifacts.insert(name.clone(), LoadedArtifact { name, path, library });
    }

    if artifacts.is_empty() {
        return Err(PipelineError::NoArtifactsToLoad {
            path: output_dir.to_path_buf(),
        });
    }

    Ok(IsolatedContext {
        root: output_dir.to_path_buf(),
        artifacts,
    })
}

fn artifact_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_prefix(DLL_PREFIX)
        .map(str::to_owned)
        .unwrap_or(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_output_dir_is_a_load_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("never-compiled");

        let err = load(&missing).unwrap_err();
        assert!(matches!(err, PipelineError::NoArtifactsToLoad { .. }));
    }

    #[test]
    fn artifact_free_dir_is_a_load_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("notes.txt"), "not an artifact").unwrap();

        let err = load(temp.path()).unwrap_err();
        assert!(matches!(err, PipelineError::NoArtifactsToLoad { .. }));
    }

    #[test]
    fn artifact_names_drop_the_platform_prefix() {
        let filename = libloading::library_filename("specfunc");
        let name = artifact_name(Path::new(&filename));
        assert_eq!(name, "specfunc");
    }

    #[test]
    fn empty_context_resolves_nothing() {
        let context = IsolatedContext::empty("/tmp/out");
        assert!(context.is_empty());
        let err = context.resolve("anything").unwrap_err();
        assert!(matches!(err, PipelineError::MissingArtifact { .. }));
    }
}
