//! Small async filesystem helpers shared by the node and controller paths.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::CsiError;

pub(crate) const MODE_PRIVATE: u32 = 0o700;
pub(crate) const MODE_VOLUME_DIR: u32 = 0o755;
pub(crate) const MODE_TARGET_DIR: u32 = 0o750;

/// `mkdir -p` with `mode` applied to every created component.
pub(crate) async fn create_dir_all(path: &Path, mode: u32) -> Result<(), CsiError> {
    tokio::fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .await
        .map_err(|e| CsiError::io(path, e))
}

/// `mkdir`; fails if `path` already exists.
pub(crate) async fn create_dir(path: &Path, mode: u32) -> Result<(), CsiError> {
    tokio::fs::DirBuilder::new()
        .mode(mode)
        .create(path)
        .await
        .map_err(|e| CsiError::io(path, e))
}

pub(crate) async fn exists(path: &Path) -> Result<bool, CsiError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| CsiError::io(path, e))
}

/// `rm -rf`, treating an absent path as success.
pub(crate) async fn remove_dir_all(path: &Path) -> Result<(), CsiError> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(CsiError::io(path, e)),
        _ => Ok(()),
    }
}

/// `rmdir`, treating an absent path as success.
pub(crate) async fn remove_dir(path: &Path) -> Result<(), CsiError> {
    match tokio::fs::remove_dir(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(CsiError::io(path, e)),
        _ => Ok(()),
    }
}

/// Join a caller-supplied path segment under `root`.
///
/// Root and `.` components are dropped, so `/kube` and `kube` both land in
/// `<root>/kube`.  A `..` component is rejected.
pub(crate) fn join_under(root: &Path, segment: &str) -> Result<PathBuf, CsiError> {
    let mut out = root.to_path_buf();
    for component in Path::new(segment).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                return Err(CsiError::InvalidArgument(format!(
                    "path {segment:?} must not contain '..'"
                )));
            }
        }
    }
    Ok(out)
}

/// Reject names that are not exactly one plain path component.
pub(crate) fn check_name(name: &str, what: &str) -> Result<(), CsiError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(CsiError::InvalidArgument(format!(
            "{what} {name:?} is not a plain file name"
        ))),
    }
}
