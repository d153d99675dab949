//! Volume backend capability.
//!
//! [`ExternalVolumeBackend`] hides the disk-image format: allocating an
//! image, attaching it to a directory, detaching and destroying it, plus
//! the cluster-side attribute tagging and lease revoke applied to the
//! directories that hold it.  [`ploop::PloopBackend`] implements it with
//! the `ploop`, `ploop-volume` and `vstorage` tools.

pub mod ploop;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::PlacementAttribute;

/// An opened backend volume: its metadata directory and descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub dir: PathBuf,
    pub descriptor: PathBuf,
}

impl ImageHandle {
    /// Open the volume at `dir`, failing with [`CsiError::BackendError`]
    /// when it has no descriptor.
    pub async fn open(dir: &Path, descriptor_name: &str) -> Result<Self, CsiError> {
        let descriptor = dir.join(descriptor_name);
        match tokio::fs::metadata(&descriptor).await {
            Ok(meta) if meta.is_file() => Ok(Self {
                dir: dir.to_path_buf(),
                descriptor,
            }),
            Ok(_) => Err(CsiError::BackendError(format!(
                "bad volume path {}: {} is not a file",
                dir.display(),
                descriptor.display()
            ))),
            Err(e) => Err(CsiError::BackendError(format!(
                "bad volume path {}: {e}",
                dir.display()
            ))),
        }
    }
}

#[async_trait]
pub trait ExternalVolumeBackend: Send + Sync {
    /// Allocate a `size_kib` image at `image`, recording its metadata in `dir`.
    async fn create(&self, dir: &Path, size_kib: u64, image: &Path) -> Result<(), CsiError>;

    async fn open(&self, dir: &Path) -> Result<ImageHandle, CsiError>;

    /// Whether the image is attached anywhere on this node.
    async fn is_mounted(&self, image: &ImageHandle) -> Result<bool, CsiError>;

    async fn mount(
        &self,
        image: &ImageHandle,
        target: &Path,
        read_only: bool,
    ) -> Result<(), CsiError>;

    /// Detach whatever image is mounted at `mount_dir`.
    async fn unmount(&self, mount_dir: &Path) -> Result<(), CsiError>;

    /// Destroy the volume, its metadata directory included.
    async fn destroy(&self, image: &ImageHandle) -> Result<(), CsiError>;

    async fn set_attribute(
        &self,
        dir: &Path,
        attr: PlacementAttribute,
        value: &str,
    ) -> Result<(), CsiError>;

    /// Drop any lease the cluster still holds on files under `dir`.
    async fn revoke_lease(&self, dir: &Path) -> Result<(), CsiError>;
}
