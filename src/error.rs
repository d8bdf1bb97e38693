use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("icon extraction is only supported for AppImage files: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("error extracting icon: {message}")]
    ExtractionFailure { message: String, scratch: Option<PathBuf> },
    #[error("no icon found in {}", bundle.display())]
    NotFound { bundle: PathBuf, scratch: PathBuf },
}

impl ResolveError {
    /// Scratch directory left behind by a failed attempt, if one was created.
    pub fn scratch_dir(&self) -> Option<&PathBuf> {
        match self {
            ResolveError::UnsupportedFormat(_) => None,
            ResolveError::ExtractionFailure { scratch, .. } => scratch.as_ref(),
            ResolveError::NotFound { scratch, .. } => Some(scratch),
        }
    }
}

/// Failure of a single filesystem step, direct or elevated.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{command}` failed: {reason}")]
    Elevation { command: String, reason: String },
}

impl OpsError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        OpsError::Io { path: path.into(), source }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid install request: {0}")]
    InvalidRequest(String),
    #[error("error installing application: {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error installing application: `{command}` failed: {reason}")]
    Elevation { command: String, reason: String },
}

impl From<OpsError> for InstallError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::Io { path, source } => InstallError::Io { path, source },
            OpsError::Elevation { command, reason } => InstallError::Elevation { command, reason },
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("could not find executable in {}", .0.display())]
    MissingExec(PathBuf),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("permission denied removing {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to remove {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("privileged step failed: {0}")]
    Elevation(String),
}

impl From<OpsError> for RemoveError {
    fn from(err: OpsError) -> Self {
        match err {
            OpsError::Io { path, source } => match source.kind() {
                io::ErrorKind::NotFound => RemoveError::NotFound(path),
                io::ErrorKind::PermissionDenied => RemoveError::PermissionDenied(path),
                _ => RemoveError::Io { path, source },
            },
            elevation @ OpsError::Elevation { .. } => RemoveError::Elevation(elevation.to_string()),
        }
    }
}
