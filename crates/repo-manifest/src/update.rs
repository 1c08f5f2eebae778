use crate::errors::ManifestError;
use crate::manifest::{self, ImageSource, RepoId, VersionRecord};
use crate::store::{self, ManifestLock};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Validated input of one manifest update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub repo: RepoId,
    pub version: String,
    pub zip_url: String,
    pub checksum: String,
    pub target_abi: String,
    pub file: PathBuf,
    pub changelog: Option<String>,
    pub image: ImageSource,
    pub dry_run: bool,
}

impl UpdateRequest {
    /// Checks every argument before anything touches the file.
    pub fn new(
        repo: &str,
        version: &str,
        zip_url: &str,
        checksum: &str,
        target_abi: &str,
        file: PathBuf,
    ) -> Result<Self, ManifestError> {
        Ok(Self {
            repo: RepoId::new(repo),
            version: required("version", version)?,
            zip_url: required("zip-url", zip_url)?,
            checksum: required("checksum", checksum)?,
            target_abi: required("target-abi", target_abi)?,
            file,
            changelog: None,
            image: ImageSource::default(),
            dry_run: false,
        })
    }
}

/// Rejects blank values; anything else is kept exactly as given.
fn required(flag: &'static str, value: &str) -> Result<String, ManifestError> {
    if value.trim().is_empty() {
        return Err(ManifestError::InvalidArgument {
            flag,
            message: "must not be empty".to_string(),
        });
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub file: PathBuf,
    pub version: String,
    pub replaced: bool,
    pub version_count: usize,
    pub written: bool,
    pub rendered: String,
}

pub fn update(req: &UpdateRequest) -> Result<UpdateOutcome, ManifestError> {
    update_at(req, Utc::now())
}

/// [`update`] with an explicit release time.
pub fn update_at(
    req: &UpdateRequest,
    released_at: DateTime<Utc>,
) -> Result<UpdateOutcome, ManifestError> {
    if !manifest::checksum_looks_like_digest(&req.checksum) {
        tracing::warn!(
            checksum = %req.checksum,
            "checksum does not look like a hex digest; writing it as given"
        );
    }

    let _lock = ManifestLock::acquire(&req.file)?;
    let mut doc = store::read_manifest(&req.file)?;

    let record = VersionRecord::new(
        &req.version,
        req.changelog.as_deref(),
        &req.zip_url,
        &req.checksum,
        &req.target_abi,
        released_at,
    );
    let applied = manifest::apply_release(&mut doc, &req.repo, &req.image, &record)
        .map_err(|e| e.at(&req.file))?;
    tracing::info!(
        file = %req.file.display(),
        version = %req.version,
        replaced = applied.replaced,
        versions = applied.version_count,
        "applied release"
    );

    let rendered = store::render_manifest(&req.file, &doc)?;
    if req.dry_run {
        tracing::info!(file = %req.file.display(), "dry run, manifest not written");
    } else {
        store::write_manifest_atomic(&req.file, rendered.as_bytes())?;
    }

    Ok(UpdateOutcome {
        file: req.file.clone(),
        version: req.version.clone(),
        replaced: applied.replaced,
        version_count: applied.version_count,
        written: !req.dry_run,
        rendered,
    })
}
