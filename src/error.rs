use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Everything that can abort a pipeline run.
///
/// Errors are surfaced unchanged to the caller; a broken generated binding
/// must fail the build with its diagnostics intact.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source directory not found: {}", .path.display())]
    DirectoryNotFound { path: PathBuf },

    /// The toolchain rejected the source set. Carries the raw diagnostic
    /// stream; generated sources are deterministic, so this is never retried.
    #[error("compilation failed:\n{diagnostics}")]
    CompilationFailed { diagnostics: String },

    #[error("no compiled artifacts to load in {}", .path.display())]
    NoArtifactsToLoad { path: PathBuf },

    #[error("{op} {}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to invoke rustc")]
    ToolchainUnavailable {
        #[source]
        source: io::Error,
    },

    #[error("invalid bindings manifest {}", .path.display())]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to load artifact {}", .path.display())]
    ArtifactUnloadable {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("no artifact named `{name}` in this context")]
    MissingArtifact { name: String },

    #[error("artifact `{artifact}` does not export symbol `{symbol}`")]
    MissingSymbol {
        artifact: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },
}
