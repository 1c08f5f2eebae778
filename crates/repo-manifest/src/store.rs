use crate::errors::ManifestError;
use crate::manifest::Manifest;
use fs4::fs_std::FileExt;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// Exclusive advisory lock on the manifest file, held until dropped.
#[derive(Debug)]
pub struct ManifestLock {
    file: fs::File,
    path: PathBuf,
}

impl ManifestLock {
    /// Fails fast with [`ManifestError::Locked`] when another process holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, ManifestError> {
        let file = fs::File::open(path).map_err(|source| open_error(path, source))?;
        FileExt::try_lock_exclusive(&file).map_err(|source| ManifestError::Locked {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(file = %path.display(), "acquired manifest lock");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(file = %self.path.display(), "released manifest lock");
    }
}

fn open_error(path: &Path, source: std::io::Error) -> ManifestError {
    if source.kind() == ErrorKind::NotFound {
        ManifestError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        ManifestError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub fn read_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|source| open_error(path, source))?;
    parse_manifest(path, &raw)
}

pub fn parse_manifest(path: &Path, raw: &str) -> Result<Manifest, ManifestError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|source| ManifestError::MalformedJson {
            path: path.to_path_buf(),
            source,
        })?;
    Manifest::from_value(value).map_err(|e| e.at(path))
}

/// Two-space indented JSON followed by exactly one newline.
pub fn render_manifest(path: &Path, manifest: &Manifest) -> Result<String, ManifestError> {
    let mut out =
        serde_json::to_string_pretty(manifest).map_err(|source| ManifestError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    out.push('\n');
    Ok(out)
}

/// Writes a sibling temp file and renames it over `path`.
///
/// A symlinked manifest is followed, so the link survives and its target is replaced.
/// The replaced file's permissions are carried over to the new one.
pub fn write_manifest_atomic(path: &Path, bytes: &[u8]) -> Result<(), ManifestError> {
    let write_err = |source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    };
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => path.to_path_buf(),
        Err(e) => return Err(write_err(e)),
    };
    let permissions = match fs::metadata(&target) {
        Ok(md) => Some(md.permissions()),
        Err(e) if e.kind() == ErrorKind::NotFound => None,
        Err(e) => return Err(write_err(e)),
    };
    let file_name = target
        .file_name()
        .ok_or_else(|| {
            write_err(std::io::Error::new(
                ErrorKind::InvalidInput,
                "path has no file name",
            ))
        })?
        .to_string_lossy()
        .to_string();
    let tmp = target.with_file_name(format!(".{file_name}.tmp.{}", std::process::id()));

    let result = fs::write(&tmp, bytes)
        .and_then(|()| match permissions {
            Some(perms) => fs::set_permissions(&tmp, perms),
            None => Ok(()),
        })
        .and_then(|()| fs::rename(&tmp, &target));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repository.json");

        let err = read_manifest(&path).expect_err("must fail");
        assert!(matches!(err, ManifestError::NotFound { .. }), "{err:?}");

        let err = ManifestLock::acquire(&path).expect_err("must fail");
        assert!(matches!(err, ManifestError::NotFound { .. }), "{err:?}");
    }

    #[test]
    fn malformed_json_is_reported_with_path() {
        let err = parse_manifest(Path::new("repository.json"), "[{").expect_err("must fail");
        assert_eq!(err.code(), "manifest.malformed_json");
        assert!(err.to_string().starts_with("malformed JSON in repository.json"));
    }

    #[test]
    fn empty_array_is_empty_manifest() {
        let err = parse_manifest(Path::new("repository.json"), "[]\n").expect_err("must fail");
        assert!(matches!(err, ManifestError::EmptyManifest { .. }), "{err:?}");
    }

    #[test]
    fn render_uses_two_space_indent_and_one_newline() {
        let manifest =
            Manifest::from_value(json!([{"owner": "o", "versions": []}])).expect("manifest");
        let rendered = render_manifest(Path::new("r.json"), &manifest).expect("render");
        assert_eq!(
            rendered,
            "[\n  {\n    \"owner\": \"o\",\n    \"versions\": []\n  }\n]\n"
        );
    }

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repository.json");
        fs::write(&path, "old").expect("seed");

        write_manifest_atomic(&path, b"new\n").expect("write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "new\n");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");
    }

    #[test]
    fn render_keeps_non_ascii_and_big_numbers_verbatim() {
        let manifest = parse_manifest(
            Path::new("r.json"),
            r#"[{"name":"Résolveur 日本","size":123456789012345678901234567890}]"#,
        )
        .expect("manifest");
        let rendered = render_manifest(Path::new("r.json"), &manifest).expect("render");
        assert!(rendered.contains("\"name\": \"Résolveur 日本\""), "{rendered}");
        assert!(!rendered.contains("\\u"), "{rendered}");
        assert!(
            rendered.contains("\"size\": 123456789012345678901234567890"),
            "{rendered}"
        );
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repository.json");
        fs::write(&path, "old").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("chmod");

        write_manifest_atomic(&path, b"new\n").expect("write");

        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn atomic_write_replaces_symlink_target_not_the_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real.json");
        let link = dir.path().join("repository.json");
        fs::write(&real, "old").expect("seed");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        write_manifest_atomic(&link, b"new\n").expect("write");

        assert!(
            fs::symlink_metadata(&link)
                .expect("link metadata")
                .file_type()
                .is_symlink()
        );
        assert_eq!(fs::read_to_string(&real).expect("read target"), "new\n");
    }

    #[test]
    fn second_lock_fails_while_first_is_held() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("repository.json");
        fs::write(&path, "[]").expect("seed");

        let held = ManifestLock::acquire(&path).expect("first lock");
        let err = ManifestLock::acquire(&path).expect_err("second lock must fail");
        assert!(matches!(err, ManifestError::Locked { .. }), "{err:?}");

        drop(held);
        ManifestLock::acquire(&path).expect("lock after release");
    }
}
