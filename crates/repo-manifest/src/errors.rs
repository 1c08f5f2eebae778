use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },
    #[error("{} is empty (expected a JSON array with a plugin entry)", path.display())]
    EmptyManifest { path: PathBuf },
    #[error("invalid manifest {}: {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },
    #[error("malformed JSON in {}: {source}", path.display())]
    MalformedJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode manifest {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("another update of {} is running ({source})", path.display())]
    Locked {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid --{flag}: {message}")]
    InvalidArgument { flag: &'static str, message: String },
}

impl ManifestError {
    /// Stable machine-readable code, logged alongside the diagnostic.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "manifest.not_found",
            Self::EmptyManifest { .. } => "manifest.empty",
            Self::InvalidManifest { .. } => "manifest.invalid",
            Self::MalformedJson { .. } => "manifest.malformed_json",
            Self::Read { .. } => "manifest.read_failed",
            Self::Write { .. } => "manifest.write_failed",
            Self::Encode { .. } => "manifest.encode_failed",
            Self::Locked { .. } => "manifest.locked",
            Self::InvalidArgument { .. } => "args.invalid",
        }
    }

    /// Usage errors share exit code 2 with flag parsing; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidArgument { .. } => 2,
            _ => 1,
        }
    }
}

/// Structural problem found in an in-memory manifest, before a file path is known.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("manifest is empty")]
    Empty,
    #[error("{0}")]
    Invalid(String),
}

impl ShapeError {
    pub fn at(self, path: &Path) -> ManifestError {
        match self {
            Self::Empty => ManifestError::EmptyManifest {
                path: path.to_path_buf(),
            },
            Self::Invalid(message) => ManifestError::InvalidManifest {
                path: path.to_path_buf(),
                message,
            },
        }
    }
}
