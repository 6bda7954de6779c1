use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Sidecar file the binding generator may emit next to its sources.
pub const MANIFEST_FILE: &str = "bindings.toml";

/// Build metadata for a generated binding package.
///
/// Unknown fields are tolerated so a newer generator can add keys without
/// breaking older pipelines.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BindingsManifest {
    /// Artifact name. Absent means the toolchain default.
    pub name: Option<String>,
    /// Disabled packages compile to nothing and load as an empty context.
    pub enabled: bool,
    /// Rust edition the generated sources target.
    pub edition: Option<String>,
    /// Native libraries the bindings link against.
    pub libraries: Vec<String>,
    /// Extra flags passed through to rustc verbatim.
    pub rustc_flags: Vec<String>,
}

impl Default for BindingsManifest {
    fn default() -> Self {
        Self {
            name: None,
            enabled: true,
            edition: None,
            libraries: Vec::new(),
            rustc_flags: Vec::new(),
        }
    }
}

/// Reads `bindings.toml` from the source directory, if the generator
/// emitted one. A malformed manifest is an error, not a fallback to
/// defaults: corrupt generator output has to fail the build.
pub fn read(source_dir: &Path) -> Result<Option<BindingsManifest>> {
    let path = source_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(&path).map_err(|source| PipelineError::Io {
        op: "failed to read manifest",
        path: path.clone(),
        source,
    })?;

    let manifest: BindingsManifest =
        toml::from_str(&raw).map_err(|source| PipelineError::InvalidManifest {
            path: path.clone(),
            source,
        })?;

    debug!(
        path = %path.display(),
        enabled = manifest.enabled,
        libraries = manifest.libraries.len(),
        "read bindings manifest"
    );

    Ok(Some(manifest))
}
