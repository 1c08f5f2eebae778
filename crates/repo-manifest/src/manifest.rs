use crate::errors::ShapeError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

pub const DEFAULT_MANIFEST_FILE: &str = "repository.json";
pub const DEFAULT_TARGET_ABI: &str = "10.11.0.0";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_IMAGE_NAME: &str = "jfresolve.png";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

fn checksum_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{32,128}$").expect("static regex is valid"))
}

/// True when `checksum` looks like a hex digest (MD5 through SHA-512).
pub fn checksum_looks_like_digest(checksum: &str) -> bool {
    checksum_regex().is_match(checksum)
}

/// Repository identifier, normally `owner/name`. Taken as given: an identifier without
/// a `/` is all owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    raw: String,
    owner_len: usize,
}

impl RepoId {
    pub fn new(raw: &str) -> Self {
        let owner_len = raw.find('/').unwrap_or(raw.len());
        Self {
            raw: raw.to_string(),
            owner_len,
        }
    }

    /// Everything before the first `/`.
    pub fn owner(&self) -> &str {
        &self.raw[..self.owner_len]
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Where the plugin image is served from: a file on a branch of the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub branch: String,
    pub file_name: String,
}

impl Default for ImageSource {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            file_name: DEFAULT_IMAGE_NAME.to_string(),
        }
    }
}

impl ImageSource {
    pub fn url_for(&self, repo: &RepoId) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}",
            repo.as_str(),
            self.branch,
            self.file_name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    pub changelog: String,
    pub source_url: String,
    pub checksum: String,
    pub target_abi: String,
    pub timestamp: String,
}

impl VersionRecord {
    pub fn new(
        version: &str,
        changelog: Option<&str>,
        source_url: &str,
        checksum: &str,
        target_abi: &str,
        released_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: version.to_string(),
            changelog: changelog
                .map(str::to_string)
                .unwrap_or_else(|| default_changelog(version)),
            source_url: source_url.to_string(),
            checksum: checksum.to_string(),
            target_abi: target_abi.to_string(),
            timestamp: format_timestamp(released_at),
        }
    }

    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("version".into(), Value::String(self.version.clone()));
        map.insert("changelog".into(), Value::String(self.changelog.clone()));
        map.insert("sourceUrl".into(), Value::String(self.source_url.clone()));
        map.insert("checksum".into(), Value::String(self.checksum.clone()));
        map.insert("targetAbi".into(), Value::String(self.target_abi.clone()));
        map.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        Value::Object(map)
    }
}

pub fn default_changelog(version: &str) -> String {
    format!("Automated release {version}")
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// The whole manifest document. Only the first entry is ever touched; everything else,
/// including unknown keys and their order, is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<Value>,
}

impl Manifest {
    pub fn from_value(value: Value) -> Result<Self, ShapeError> {
        if is_falsy(&value) {
            return Err(ShapeError::Empty);
        }
        match value {
            Value::Array(entries) => Ok(Self { entries }),
            other => Err(ShapeError::Invalid(format!(
                "top-level value must be an array, found {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn descriptor(&self) -> Result<&Map<String, Value>, ShapeError> {
        self.entries
            .first()
            .ok_or(ShapeError::Empty)?
            .as_object()
            .ok_or_else(|| ShapeError::Invalid("first entry must be an object".to_string()))
    }

    fn descriptor_mut(&mut self) -> Result<&mut Map<String, Value>, ShapeError> {
        self.entries
            .first_mut()
            .ok_or(ShapeError::Empty)?
            .as_object_mut()
            .ok_or_else(|| ShapeError::Invalid("first entry must be an object".to_string()))
    }

    /// Version strings of the descriptor, newest first; records without a string
    /// `version` are skipped.
    pub fn versions(&self) -> Result<Vec<&str>, ShapeError> {
        let descriptor = self.descriptor()?;
        let Some(versions) = descriptor.get("versions") else {
            return Ok(Vec::new());
        };
        let versions = versions
            .as_array()
            .ok_or_else(|| ShapeError::Invalid("`versions` must be an array".to_string()))?;
        Ok(versions
            .iter()
            .filter_map(|v| v.get("version").and_then(Value::as_str))
            .collect())
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// A record with the same version existed and was dropped.
    pub replaced: bool,
    pub version_count: usize,
}

/// Points the descriptor at `repo`, drops any record sharing `record.version`, and puts
/// `record` first.
pub fn apply_release(
    manifest: &mut Manifest,
    repo: &RepoId,
    image: &ImageSource,
    record: &VersionRecord,
) -> Result<ApplyOutcome, ShapeError> {
    let descriptor = manifest.descriptor_mut()?;

    let mut versions = match descriptor.get_mut("versions") {
        None => Vec::new(),
        Some(Value::Array(existing)) => std::mem::take(existing),
        Some(other) => {
            return Err(ShapeError::Invalid(format!(
                "`versions` must be an array, found {}",
                json_kind(other)
            )));
        }
    };

    descriptor.insert("owner".into(), Value::String(repo.owner().to_string()));
    descriptor.insert("imageUrl".into(), Value::String(image.url_for(repo)));

    let before = versions.len();
    versions.retain(|v| v.get("version").and_then(Value::as_str) != Some(record.version.as_str()));
    let replaced = versions.len() != before;
    versions.insert(0, record.to_value());
    let version_count = versions.len();

    descriptor.insert("versions".into(), Value::Array(versions));

    Ok(ApplyOutcome {
        replaced,
        version_count,
    })
}
