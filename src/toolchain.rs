use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::locator::SourceSet;

/// Options for one rustc invocation over a source set.
#[derive(Clone, Debug)]
pub struct ToolchainOptions {
    /// Name of the produced artifact (`lib<name>.so` and friends).
    pub crate_name: String,
    /// Edition the generated sources target.
    pub edition: String,
    /// Native libraries to link (`-l dylib=<lib>` each).
    pub libraries: Vec<String>,
    /// Extra flags passed through to rustc verbatim.
    pub extra_flags: Vec<String>,
    /// Clear the output directory before compiling so stale artifacts from
    /// an earlier run never leak into the loaded context.
    pub clear_output: bool,
}

impl Default for ToolchainOptions {
    fn default() -> Self {
        Self {
            crate_name: "bindings".to_string(),
            edition: "2021".to_string(),
            libraries: Vec::new(),
            extra_flags: Vec::new(),
            clear_output: true,
        }
    }
}

/// One compile of one source set into one output directory. Built once per
/// pipeline run and never mutated afterwards.
#[derive(Debug)]
pub struct CompilationRequest {
    sources: SourceSet,
    output_dir: PathBuf,
    options: ToolchainOptions,
}

impl CompilationRequest {
    pub fn new(
        sources: SourceSet,
        output_dir: impl Into<PathBuf>,
        options: ToolchainOptions,
    ) -> Self {
        Self {
            sources,
            output_dir: output_dir.into(),
            options,
        }
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &ToolchainOptions {
        &self.options
    }
}

/// Terminal outcome of a compile. Failure travels on the error channel
/// with the raw diagnostics attached.
#[derive(Debug)]
pub enum CompilationResult {
    /// Empty source set: nothing to verify, which is not an error. This is
    /// what distinguishes "no generated bindings" from "broken generated
    /// bindings".
    Skipped,
    /// The whole set compiled into one shared library.
    Compiled { library: PathBuf },
}

/// Compiles the full source set as a single shared-library crate in one
/// atomic rustc invocation. There is no partial success: generated sources
/// may reference each other, so either the whole set compiles or the whole
/// invocation fails.
pub fn compile(request: &CompilationRequest) -> Result<CompilationResult> {
    let sources = request.sources();
    let options = request.options();

    if sources.is_empty() {
        debug!(root = %sources.root().display(), "no generated sources, skipping compile");
        return Ok(CompilationResult::Skipped);
    }

    prepare_output_dir(request.output_dir(), options.clear_output)?;

    // Scratch crate root mounting every source file as a module, so
    // cross-file references resolve within one compilation unit.
    let root_path = request
        .output_dir()
        .join(format!("{}_root.rs", options.crate_name));
    fs::write(&root_path, synthesize_root(sources.files())).map_err(|source| {
        PipelineError::Io {
            op: "failed to write crate root",
            path: root_path.clone(),
            source,
        }
    })?;

    let mut cmd = Command::new("rustc");
    cmd.arg("--edition")
        .arg(&options.edition)
        .arg("--crate-type")
        .arg("cdylib")
        .arg("--crate-name")
        .arg(&options.crate_name)
        .arg("--out-dir")
        .arg(request.output_dir())
        .arg(&root_path);
    for lib in &options.libraries {
        cmd.arg("-l").arg(format!("dylib={lib}"));
    }
    for flag in &options.extra_flags {
        cmd.arg(flag);
    }

    debug!(
        crate_name = %options.crate_name,
        sources = sources.len(),
        out = %request.output_dir().display(),
        "invoking rustc"
    );

    let output = cmd
        .output()
        .map_err(|source| PipelineError::ToolchainUnavailable { source })?;

    fs::remove_file(&root_path).ok();

    if !output.status.success() {
        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        if diagnostics.trim().is_empty() {
            diagnostics = format!("rustc exited with {}", output.status);
        }
        return Err(PipelineError::CompilationFailed { diagnostics });
    }

    let library = request
        .output_dir()
        .join(libloading::library_filename(&options.crate_name));
    if !library.exists() {
        return Err(PipelineError::CompilationFailed {
            diagnostics: format!(
                "expected compiled library `{}` not found",
                library.display()
            ),
        });
    }

    Ok(CompilationResult::Compiled { library })
}

fn prepare_output_dir(dir: &Path, clear: bool) -> Result<()> {
    if clear && dir.exists() {
        fs::remove_dir_all(dir).map_err(|source| PipelineError::Io {
            op: "failed to clear output directory",
            path: dir.to_path_buf(),
            source,
        })?;
    }
    fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
        op: "failed to create output directory",
        path: dir.to_path_buf(),
        source,
    })
}

fn synthesize_root(files: &[PathBuf]) -> String {
    let mut root = String::from("// generated crate root, do not edit\n");
    let mut seen = HashSet::new();

    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut ident = module_ident(&stem);
        while !seen.insert(ident.clone()) {
            ident.push('_');
        }
        let path = file.to_string_lossy().replace('\\', "/").replace('"', "\\\"");
        root.push_str(&format!("#[path = \"{path}\"]\npub mod {ident};\n"));
    }

    root
}

/// Module identifiers mirror file stems so generated cross-references of
/// the form `crate::<stem>::...` keep working.
fn module_ident(stem: &str) -> String {
    let mut ident: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if ident.is_empty() || ident.starts_with(|ch: char| ch.is_ascii_digit()) {
        ident.insert(0, '_');
    }

    ident
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::locate;
    use tempfile::TempDir;

    #[test]
    fn empty_source_set_is_skipped() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let sources = locate(src.path()).unwrap();

        let request =
            CompilationRequest::new(sources, out.path(), ToolchainOptions::default());
        let result = compile(&request).unwrap();
        assert!(matches!(result, CompilationResult::Skipped));
    }

    #[test]
    fn module_idents_follow_file_stems() {
        assert_eq!(module_ident("gsl_specfunc"), "gsl_specfunc");
        assert_eq!(module_ident("vector-ops"), "vector_ops");
        assert_eq!(module_ident("2d_transforms"), "_2d_transforms");
        assert_eq!(module_ident(""), "_");
    }

    #[test]
    fn duplicate_stems_get_distinct_modules() {
        let files = [
            PathBuf::from("/gen/a/bindings.rs"),
            PathBuf::from("/gen/b/bindings.rs"),
        ];
        let root = synthesize_root(&files);
        assert!(root.contains("pub mod bindings;"));
        assert!(root.contains("pub mod bindings_;"));
    }

    #[test]
    fn root_mounts_every_source() {
        let files = [
            PathBuf::from("/gen/alpha.rs"),
            PathBuf::from("/gen/beta.rs"),
        ];
        let root = synthesize_root(&files);
        assert!(root.contains("#[path = \"/gen/alpha.rs\"]"));
        assert!(root.contains("#[path = \"/gen/beta.rs\"]"));
    }
}
