use std::path::PathBuf;

use thiserror::Error;

/// Fatal bundle-emission error.
///
/// Every failure in this subsystem aborts the whole `save()` pipeline;
/// there is no recoverable-error channel and no partial-artifact
/// cleanup. Re-running the pipeline is the only recovery path.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("could not open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid allocation plan: {0}")]
    Plan(String),

    #[error("expected module artifact '{0}' was never emitted")]
    MissingModuleArtifact(String),

    #[error("codegen error: {0}")]
    Codegen(String),

    #[error("external compiler failed ({status}): {command}")]
    ExternalCompiler { command: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BundleError>;

impl BundleError {
    /// Wrap an IO error with the output path it occurred on.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Open {
            path: path.into(),
            source,
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Write {
            path: path.into(),
            source,
        }
    }
}
