use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::loader::{self, IsolatedContext};
use crate::locator;
use crate::manifest::{self, BindingsManifest};
use crate::toolchain::{self, CompilationRequest, CompilationResult, ToolchainOptions};

/// Drives one full run over a generated-source directory: locate the
/// sources, compile them, load the artifacts.
///
/// The run is linear with no retries; a failure at any stage aborts it and
/// propagates the originating error unchanged. A failed run is restarted
/// from the beginning, never resumed. Independent runs may execute in
/// parallel as long as their source and output directories are disjoint;
/// nothing here is shared between runs.
#[derive(Debug)]
pub struct Pipeline {
    source_dir: PathBuf,
    output_dir: PathBuf,
    options: ToolchainOptions,
}

impl Pipeline {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self::with_options(source_dir, output_dir, ToolchainOptions::default())
    }

    pub fn with_options(
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        options: ToolchainOptions,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            options,
        }
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Runs the pipeline to completion and hands the isolated context to
    /// the caller, who owns its lifetime from then on.
    pub fn run(&self) -> Result<IsolatedContext> {
        let sources = locator::locate(&self.source_dir)?;

        let mut options = self.options.clone();
        if let Some(manifest) = manifest::read(&self.source_dir)? {
            if !manifest.enabled {
                debug!(
                    root = %self.source_dir.display(),
                    "bindings disabled by manifest, nothing to build"
                );
                return Ok(IsolatedContext::empty(&self.output_dir));
            }
            apply_manifest(&mut options, manifest);
        }

        let request = CompilationRequest::new(sources, &self.output_dir, options);
        match toolchain::compile(&request)? {
            CompilationResult::Skipped => Ok(IsolatedContext::empty(&self.output_dir)),
            CompilationResult::Compiled { .. } => loader::load(&self.output_dir),
        }
    }
}

/// Runs the full pipeline once with default options.
pub fn run(source_dir: &Path, output_dir: &Path) -> Result<IsolatedContext> {
    Pipeline::new(source_dir, output_dir).run()
}

/// The manifest is the generator's own declaration about its output, so its
/// name and edition override the option defaults; libraries and flags
/// accumulate on top of whatever the caller configured.
fn apply_manifest(options: &mut ToolchainOptions, manifest: BindingsManifest) {
    if let Some(name) = manifest.name {
        options.crate_name = name;
    }
    if let Some(edition) = manifest.edition {
        options.edition = edition;
    }
    options.libraries.extend(manifest.libraries);
    options.extra_flags.extend(manifest.rustc_flags);
}
