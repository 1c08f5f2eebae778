use clap::Parser;
use repo_manifest::manifest::{
    DEFAULT_BRANCH, DEFAULT_IMAGE_NAME, DEFAULT_MANIFEST_FILE, DEFAULT_TARGET_ABI, ImageSource,
};
use repo_manifest::{ManifestError, UpdateRequest};
use std::path::PathBuf;

pub(crate) const FILE_ENV: &str = "REPO_MANIFEST_FILE";
pub(crate) const TARGET_ABI_ENV: &str = "REPO_MANIFEST_TARGET_ABI";
pub(crate) const LOG_ENV: &str = "REPO_MANIFEST_LOG";

/// Prepend a release to a plugin repository manifest.
///
/// The first plugin entry gets its owner and image URL pointed at --repo, and a new
/// version record is placed first in its version list, replacing any record with the
/// same version.
// `--version` names the release, so clap's own version flag is off.
#[derive(Debug, Parser)]
#[command(name = "repo-manifest", disable_version_flag = true)]
pub(crate) struct Cli {
    /// Repository as owner/name, e.g. user/repo
    #[arg(long)]
    repo: String,
    /// Release version, e.g. 1.0.0.6
    #[arg(long)]
    version: String,
    /// URL of the release zip
    #[arg(long)]
    zip_url: String,
    /// Checksum of the release zip (e.g. MD5 hex digest)
    #[arg(long)]
    checksum: String,
    /// Target ABI of the host application
    #[arg(long, env = TARGET_ABI_ENV, default_value = DEFAULT_TARGET_ABI)]
    target_abi: String,
    /// Path to the manifest
    #[arg(long, env = FILE_ENV, default_value = DEFAULT_MANIFEST_FILE)]
    file: PathBuf,
    /// Changelog text [default: "Automated release <VERSION>"]
    #[arg(long)]
    changelog: Option<String>,
    /// Branch the plugin image is served from
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,
    /// File name of the plugin image at the repository root
    #[arg(long, default_value = DEFAULT_IMAGE_NAME)]
    image_name: String,
    /// Print the updated manifest instead of writing it
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    pub(crate) fn into_request(self) -> Result<UpdateRequest, ManifestError> {
        let mut req = UpdateRequest::new(
            &self.repo,
            &self.version,
            &self.zip_url,
            &self.checksum,
            &self.target_abi,
            self.file,
        )?;
        req.changelog = self.changelog.filter(|c| !c.trim().is_empty());
        req.image = ImageSource {
            branch: non_empty("branch", self.branch)?,
            file_name: non_empty("image-name", self.image_name)?,
        };
        req.dry_run = self.dry_run;
        Ok(req)
    }
}

fn non_empty(flag: &'static str, value: String) -> Result<String, ManifestError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::InvalidArgument {
            flag,
            message: "must not be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}
