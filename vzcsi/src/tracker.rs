//! Node-side attach/detach of volume images.
//!
//! Publishing a volume attaches its image to a private mount under the
//! working directory and bind-mounts that onto the caller's target path.
//! Unpublish only receives the target path, so publish also leaves an
//! indirection link from the target path back to the private mount.
//!
//! # On-disk layout
//!
//! ```text
//! <working_dir>/mounts/
//!   ploop-<hash(image dir)>/      # private mount state directory
//!     mnt/                        # the image is attached here
//!   kube-<hash(target path)>      # symlink -> ploop-<hash(image dir)>
//! ```
//!
//! Both hashes are SHA-256 over the lexically cleaned path, so the same
//! image or target maps to the same entry across calls and restarts.
//!
//! All state lives in that tree; nothing is cached in memory.  Requests for
//! the same target or image must be serialized by the caller.

use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::backend::{ExternalVolumeBackend, ImageHandle};
use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::fsutil;
use crate::mounter::{MountOptions, Mounter};
use crate::rollback::StepLog;
use crate::types::MountState;

const PRIVATE_PREFIX: &str = "ploop-";
const LINK_PREFIX: &str = "kube-";
const MNT_DIR: &str = "mnt";

/// Lexically normalize `path`: drop `.` components, apply `..` to the
/// preceding component, collapse repeated separators.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Stable hex key for `path`.
pub fn path_key(path: &Path) -> String {
    let cleaned = clean_path(path);
    hex::encode(Sha256::digest(cleaned.as_os_str().as_bytes()))
}

/// Arguments of [`MountStateTracker::publish`].
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub target_path: &'a Path,
    /// Metadata directory of the backend volume.
    pub image_dir: &'a Path,
    pub read_only: bool,
    pub mount_flags: &'a [String],
}

#[derive(Debug)]
enum PublishStep {
    TargetCreated(PathBuf),
    PrivateMountCreated(PathBuf),
    ImageMounted(PathBuf),
    LinkCreated(PathBuf),
}

pub struct MountStateTracker {
    config: Arc<DriverConfig>,
    backend: Arc<dyn ExternalVolumeBackend>,
    mounter: Arc<dyn Mounter>,
}

impl MountStateTracker {
    pub fn new(
        config: Arc<DriverConfig>,
        backend: Arc<dyn ExternalVolumeBackend>,
        mounter: Arc<dyn Mounter>,
    ) -> Self {
        Self {
            config,
            backend,
            mounter,
        }
    }

    /// Private mount state directory for an image.
    pub fn private_mount_dir(&self, image_dir: &Path) -> PathBuf {
        self.config
            .mounts_dir()
            .join(format!("{PRIVATE_PREFIX}{}", path_key(image_dir)))
    }

    /// Indirection link for a target path.
    pub fn link_path(&self, target_path: &Path) -> PathBuf {
        self.config
            .mounts_dir()
            .join(format!("{LINK_PREFIX}{}", path_key(target_path)))
    }

    /// Attach the image and expose it at the target path.
    ///
    /// A target that is already a mount point counts as published.  An
    /// image that is attached anywhere else is a
    /// [`CsiError::AlreadyMounted`] conflict.  Any failure after the image
    /// was opened undoes the completed steps before returning.
    #[instrument(skip(self, req), fields(
        target = %req.target_path.display(),
        image = %req.image_dir.display(),
        read_only = req.read_only,
    ))]
    pub async fn publish(&self, req: PublishRequest<'_>) -> Result<(), CsiError> {
        let target = clean_path(req.target_path);
        let image_dir = clean_path(req.image_dir);

        if self.mounter.is_mount_point(&target).await? {
            debug!("target already mounted, assuming idempotent retry");
            return Ok(());
        }

        let private_dir = self.private_mount_dir(&image_dir);
        let link = self.link_path(&target);

        let image = self.backend.open(&image_dir).await?;
        if self.backend.is_mounted(&image).await? {
            return Err(CsiError::AlreadyMounted(image_dir.display().to_string()));
        }

        debug!(state = ?MountState::Publishing, private = %private_dir.display(), "attaching");
        let mut log = StepLog::new();
        let attached = self
            .attach(&mut log, &image, &target, &private_dir, &link, &req)
            .await;
        if let Err(e) = attached {
            return Err(log.fail(e, |step| self.undo(step)).await);
        }

        info!(state = ?MountState::Published, link = %link.display(), "volume published");
        Ok(())
    }

    async fn attach(
        &self,
        log: &mut StepLog<PublishStep>,
        image: &ImageHandle,
        target: &Path,
        private_dir: &Path,
        link: &Path,
        req: &PublishRequest<'_>,
    ) -> Result<(), CsiError> {
        if !fsutil::exists(target).await? {
            fsutil::create_dir_all(target, fsutil::MODE_TARGET_DIR).await?;
            log.record(PublishStep::TargetCreated(target.to_path_buf()));
        }

        fsutil::create_dir_all(&self.config.mounts_dir(), fsutil::MODE_PRIVATE).await?;

        let mnt = private_dir.join(MNT_DIR);
        fsutil::create_dir_all(&mnt, fsutil::MODE_PRIVATE).await?;
        log.record(PublishStep::PrivateMountCreated(private_dir.to_path_buf()));

        self.backend.mount(image, &mnt, req.read_only).await?;
        log.record(PublishStep::ImageMounted(mnt.clone()));

        tokio::fs::symlink(private_dir, link)
            .await
            .map_err(|e| CsiError::io(link, format!("symlink: {e}")))?;
        log.record(PublishStep::LinkCreated(link.to_path_buf()));

        let mut flags = req.mount_flags.to_vec();
        if req.read_only && !flags.iter().any(|f| f == "ro") {
            flags.push("ro".to_owned());
        }
        let options = MountOptions {
            read_only: req.read_only,
            flags,
        };
        self.mounter.bind_mount(&mnt, target, &options).await
    }

    async fn undo(&self, step: PublishStep) -> Result<(), CsiError> {
        match step {
            PublishStep::TargetCreated(target) => fsutil::remove_dir(&target).await,
            PublishStep::PrivateMountCreated(dir) => {
                // Never recurse here: a still-attached image would be wiped.
                fsutil::remove_dir(&dir.join(MNT_DIR)).await?;
                fsutil::remove_dir(&dir).await
            }
            PublishStep::ImageMounted(mnt) => self.backend.unmount(&mnt).await,
            PublishStep::LinkCreated(link) => tokio::fs::remove_file(&link)
                .await
                .map_err(|e| CsiError::io(&link, e)),
        }
    }

    /// Remove the bind mount at the target path and detach the image behind
    /// it.
    ///
    /// Returns [`CsiError::NotFound`] if the target is not mounted.  A
    /// missing or dangling indirection link is [`CsiError::CorruptState`];
    /// it is reported, not repaired.
    #[instrument(skip(self), fields(target = %target_path.display()))]
    pub async fn unpublish(&self, target_path: &Path) -> Result<(), CsiError> {
        let target = clean_path(target_path);
        if !self.mounter.is_mount_point(&target).await? {
            return Err(CsiError::NotFound(format!(
                "{} is not mounted",
                target.display()
            )));
        }

        debug!(state = ?MountState::Unpublishing, "detaching");
        self.mounter.unmount(&target).await?;

        let link = self.link_path(&target);
        let private_dir = self.resolve_link(&link).await?;

        let mnt = private_dir.join(MNT_DIR);
        self.backend.unmount(&mnt).await?;
        tokio::fs::remove_dir(&mnt)
            .await
            .map_err(|e| CsiError::io(&mnt, e))?;
        tokio::fs::remove_dir(&private_dir)
            .await
            .map_err(|e| CsiError::io(&private_dir, e))?;
        tokio::fs::remove_file(&link)
            .await
            .map_err(|e| CsiError::io(&link, e))?;

        info!(state = ?MountState::Unmounted, "volume unpublished");
        Ok(())
    }

    async fn resolve_link(&self, link: &Path) -> Result<PathBuf, CsiError> {
        let private_dir = tokio::fs::read_link(link)
            .await
            .map_err(|e| CsiError::corrupt(link, format!("readlink: {e}")))?;
        match tokio::fs::metadata(&private_dir).await {
            Ok(meta) if meta.is_dir() => Ok(private_dir),
            Ok(_) => Err(CsiError::corrupt(
                link,
                format!("{} is not a directory", private_dir.display()),
            )),
            Err(e) => {
                warn!(link = %link.display(), private = %private_dir.display(), "dangling indirection link");
                Err(CsiError::corrupt(link, e))
            }
        }
    }
}
