//! Controller-side volume provisioning.
//!
//! # On-disk layout
//!
//! ```text
//! <cluster mount>/
//!   <volume path>/
//!     <id>/                  # metadata directory, DiskDescriptor.xml inside
//!     <id>.deleted/          # transient, only while a delete is in flight
//!   <deltas path>/
//!     <id>.image/            # image directory
//!       root.hds             # image file
//! ```
//!
//! The `.image` suffix keeps a volume's image directory from colliding with
//! its own metadata directory when both path segments are the same.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::ExternalVolumeBackend;
use crate::config::DriverConfig;
use crate::descriptor::DiskDescriptor;
use crate::error::CsiError;
use crate::fsutil;
use crate::rollback::StepLog;
use crate::types::{PlacementAttribute, Volume, VolumeId};

/// Native allocation unit of the backend.
const KIB: u64 = 1024;

/// Paths of one volume, relative to a cluster mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    pub metadata_dir: PathBuf,
    /// Sibling the metadata directory is renamed to while being deleted.
    pub deleted_dir: PathBuf,
    pub image_dir: PathBuf,
    pub image_file: PathBuf,
}

impl VolumeLayout {
    /// An empty `deltas_path` falls back to `volume_path`.  Both segments
    /// are kept under `root` even when given with a leading `/`.
    pub fn resolve(
        root: &Path,
        id: &VolumeId,
        volume_path: &str,
        deltas_path: &str,
        image_file_name: &str,
    ) -> Result<Self, CsiError> {
        fsutil::check_name(id.as_str(), "volume id")?;
        let deltas_path = if deltas_path.is_empty() {
            volume_path
        } else {
            deltas_path
        };
        let volume_dir = fsutil::join_under(root, volume_path)?;
        let image_dir = fsutil::join_under(root, deltas_path)?.join(format!("{id}.image"));
        Ok(Self {
            metadata_dir: volume_dir.join(id.as_str()),
            deleted_dir: volume_dir.join(format!("{id}.deleted")),
            image_file: image_dir.join(image_file_name),
            image_dir,
        })
    }
}

/// Arguments of [`VolumeProvisioner::create_volume`].
#[derive(Debug, Clone)]
pub struct ProvisionRequest<'a> {
    /// Cluster mount point the path segments are relative to.
    pub root: &'a Path,
    pub id: &'a VolumeId,
    pub capacity_bytes: u64,
    pub volume_path: &'a str,
    pub deltas_path: &'a str,
    pub attributes: &'a [(PlacementAttribute, String)],
    /// Returned as the descriptor's volume context.
    pub context: HashMap<String, String>,
}

#[derive(Debug)]
enum CreateStep {
    DirCreated(PathBuf),
}

pub struct VolumeProvisioner {
    config: Arc<DriverConfig>,
    backend: Arc<dyn ExternalVolumeBackend>,
}

impl VolumeProvisioner {
    pub fn new(config: Arc<DriverConfig>, backend: Arc<dyn ExternalVolumeBackend>) -> Self {
        Self { config, backend }
    }

    pub fn layout(
        &self,
        root: &Path,
        id: &VolumeId,
        volume_path: &str,
        deltas_path: &str,
    ) -> Result<VolumeLayout, CsiError> {
        VolumeLayout::resolve(
            root,
            id,
            volume_path,
            deltas_path,
            &self.config.image_file_name,
        )
    }

    /// Create the volume, or return it unchanged if a volume with the same
    /// name and at least the requested capacity already exists.
    #[instrument(skip(self, req), fields(id = %req.id, capacity = req.capacity_bytes))]
    pub async fn create_volume(&self, req: ProvisionRequest<'_>) -> Result<Volume, CsiError> {
        if req.id.is_empty() {
            return Err(CsiError::InvalidArgument("volume id missing".into()));
        }
        if req.volume_path.is_empty() {
            return Err(CsiError::InvalidArgument("volumePath isn't specified".into()));
        }

        let layout = self.layout(req.root, req.id, req.volume_path, req.deltas_path)?;
        let size_kib = req.capacity_bytes / KIB;
        let descriptor = Volume {
            volume_id: req.id.clone(),
            capacity_bytes: req.capacity_bytes,
            volume_context: req.context.clone(),
        };

        if fsutil::exists(&layout.metadata_dir).await? {
            let dd =
                DiskDescriptor::load(&layout.metadata_dir, &self.config.descriptor_name).await?;
            let existing = dd.capacity_bytes();
            // Compare in the unit the image was allocated in, so a request that
            // was truncated on first create still matches on retry.
            if existing / KIB >= size_kib {
                debug!(existing, "volume exists with sufficient capacity");
                return Ok(descriptor);
            }
            return Err(CsiError::VolumeConflict {
                name: req.id.to_string(),
                existing_bytes: existing,
                requested_bytes: req.capacity_bytes,
            });
        }

        let mut log = StepLog::new();
        let allocated = self
            .allocate(&layout, size_kib, req.attributes, &mut log)
            .await;
        if let Err(e) = allocated {
            return Err(log.fail(e, undo_create).await);
        }

        info!(
            metadata_dir = %layout.metadata_dir.display(),
            image_dir = %layout.image_dir.display(),
            size_kib,
            "volume created",
        );
        Ok(descriptor)
    }

    async fn allocate(
        &self,
        layout: &VolumeLayout,
        size_kib: u64,
        attributes: &[(PlacementAttribute, String)],
        log: &mut StepLog<CreateStep>,
    ) -> Result<(), CsiError> {
        for dir in [&layout.metadata_dir, &layout.image_dir] {
            if let Some(parent) = dir.parent() {
                fsutil::create_dir_all(parent, fsutil::MODE_VOLUME_DIR).await?;
            }
        }

        fsutil::create_dir(&layout.metadata_dir, fsutil::MODE_VOLUME_DIR).await?;
        log.record(CreateStep::DirCreated(layout.metadata_dir.clone()));
        fsutil::create_dir(&layout.image_dir, fsutil::MODE_VOLUME_DIR).await?;
        log.record(CreateStep::DirCreated(layout.image_dir.clone()));

        for dir in [&layout.metadata_dir, &layout.image_dir] {
            for (attr, value) in attributes {
                self.backend
                    .set_attribute(dir, *attr, value)
                    .await
                    .map_err(|e| {
                        CsiError::Internal(format!(
                            "unable to set {attr} to {value} for {}: {e}",
                            dir.display()
                        ))
                    })?;
            }
        }

        self.backend
            .create(&layout.metadata_dir, size_kib, &layout.image_file)
            .await
    }

    /// Delete the volume.  Absent volumes are already deleted.
    ///
    /// The metadata directory is renamed to `<id>.deleted` before anything
    /// is destroyed, so the live name never refers to a half-deleted volume.
    /// If the backend fails to destroy the renamed volume it stays on disk
    /// and the error is returned.
    #[instrument(skip(self, root))]
    pub async fn delete_volume(
        &self,
        root: &Path,
        id: &VolumeId,
        volume_path: &str,
        deltas_path: &str,
    ) -> Result<(), CsiError> {
        if id.is_empty() {
            return Err(CsiError::InvalidArgument("volume id missing".into()));
        }
        // An empty segment would resolve to `<root>/<id>`, a directory this
        // driver never creates.
        if volume_path.is_empty() {
            return Err(CsiError::InvalidArgument("volumePath isn't specified".into()));
        }
        let layout = self.layout(root, id, volume_path, deltas_path)?;

        if !fsutil::exists(&layout.metadata_dir).await? {
            debug!(path = %layout.metadata_dir.display(), "volume absent, nothing to delete");
            return Ok(());
        }

        if fsutil::exists(&layout.deleted_dir).await? {
            return Err(CsiError::Internal(format!(
                "{} is left over from an earlier delete",
                layout.deleted_dir.display()
            )));
        }
        tokio::fs::rename(&layout.metadata_dir, &layout.deleted_dir)
            .await
            .map_err(|e| CsiError::io(&layout.metadata_dir, format!("rename: {e}")))?;

        if let Err(e) = self.backend.revoke_lease(&layout.image_dir).await {
            warn!(path = %layout.image_dir.display(), error = %e, "unable to revoke lease");
        }

        let image = self.backend.open(&layout.deleted_dir).await?;
        info!(path = %layout.deleted_dir.display(), "destroying volume");
        self.backend.destroy(&image).await?;

        fsutil::remove_dir_all(&layout.image_dir).await?;
        // The backend normally removes the metadata directory itself.
        fsutil::remove_dir_all(&layout.deleted_dir).await?;

        info!(%id, "volume deleted");
        Ok(())
    }
}

async fn undo_create(step: CreateStep) -> Result<(), CsiError> {
    match step {
        CreateStep::DirCreated(dir) => fsutil::remove_dir_all(&dir).await,
    }
}
