//! ploop backend for Virtuozzo Storage.
//!
//! [`PloopBackend`] implements [`ExternalVolumeBackend`] by driving the
//! ploop command-line tools through a [`CommandRunner`]:
//!
//! | Operation | Command |
//! |---|---|
//! | create | `ploop-volume create -s <N>K --image <image> <dir>` |
//! | destroy | `ploop-volume delete <dir>` |
//! | mount | `ploop mount [-r] -m <target> <dir>/DiskDescriptor.xml` |
//! | unmount | `ploop umount -m <mount_dir>` |
//! | is_mounted | `ploop list`, matched against the descriptor's image files |
//! | set_attribute | `vstorage set-attr -R <dir> <attr>=<value>` |
//! | revoke_lease | `vstorage revoke -R <dir>` |

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::backend::{ExternalVolumeBackend, ImageHandle};
use crate::config::DriverConfig;
use crate::descriptor::DiskDescriptor;
use crate::error::CsiError;
use crate::exec::{CommandRunner, CommandSpec};
use crate::types::PlacementAttribute;

pub struct PloopBackend {
    config: Arc<DriverConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl PloopBackend {
    pub fn new(config: Arc<DriverConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    async fn ploop(&self, spec: CommandSpec) -> Result<String, CsiError> {
        let out = self.runner.run(&spec).await.map_err(|e| match e {
            CsiError::CommandFailed { command, reason } => {
                CsiError::BackendError(format!("{command}: {reason}"))
            }
            other => other,
        })?;
        Ok(out.stdout)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl ExternalVolumeBackend for PloopBackend {
    #[instrument(skip(self))]
    async fn create(&self, dir: &Path, size_kib: u64, image: &Path) -> Result<(), CsiError> {
        let spec = CommandSpec::new(&self.config.ploop_volume_tool)
            .args(["create", "-s"])
            .arg(format!("{size_kib}K"))
            .arg("--image")
            .arg(path_arg(image))
            .arg(path_arg(dir));
        self.ploop(spec).await?;
        info!(dir = %dir.display(), size_kib, "ploop volume created");
        Ok(())
    }

    async fn open(&self, dir: &Path) -> Result<ImageHandle, CsiError> {
        ImageHandle::open(dir, &self.config.descriptor_name).await
    }

    async fn is_mounted(&self, image: &ImageHandle) -> Result<bool, CsiError> {
        let dd = DiskDescriptor::load(&image.dir, &self.config.descriptor_name).await?;
        let files = dd.image_files(&image.dir);
        let listing = self
            .ploop(CommandSpec::new(&self.config.ploop_tool).arg("list"))
            .await?;

        // Each line is `<device> <image file>`.
        let mounted = listing.lines().any(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|f| files.iter().any(|img| img == Path::new(f)))
        });
        debug!(dir = %image.dir.display(), mounted, "ploop mount state");
        Ok(mounted)
    }

    #[instrument(skip(self, image), fields(dir = %image.dir.display()))]
    async fn mount(
        &self,
        image: &ImageHandle,
        target: &Path,
        read_only: bool,
    ) -> Result<(), CsiError> {
        let mut spec = CommandSpec::new(&self.config.ploop_tool).arg("mount");
        if read_only {
            spec = spec.arg("-r");
        }
        spec = spec
            .arg("-m")
            .arg(path_arg(target))
            .arg(path_arg(&image.descriptor));
        self.ploop(spec).await.map_err(|e| CsiError::MountFailed {
            path: target.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn unmount(&self, mount_dir: &Path) -> Result<(), CsiError> {
        let spec = CommandSpec::new(&self.config.ploop_tool)
            .args(["umount", "-m"])
            .arg(path_arg(mount_dir));
        self.ploop(spec).await.map_err(|e| CsiError::UnmountFailed {
            path: mount_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    #[instrument(skip(self, image), fields(dir = %image.dir.display()))]
    async fn destroy(&self, image: &ImageHandle) -> Result<(), CsiError> {
        let spec = CommandSpec::new(&self.config.ploop_volume_tool)
            .arg("delete")
            .arg(path_arg(&image.dir));
        self.ploop(spec).await?;
        Ok(())
    }

    async fn set_attribute(
        &self,
        dir: &Path,
        attr: PlacementAttribute,
        value: &str,
    ) -> Result<(), CsiError> {
        let spec = CommandSpec::new(&self.config.cluster_tool)
            .args(["set-attr", "-R"])
            .arg(path_arg(dir))
            .arg(format!("{attr}={value}"));
        self.runner.run(&spec).await?;
        Ok(())
    }

    async fn revoke_lease(&self, dir: &Path) -> Result<(), CsiError> {
        let spec = CommandSpec::new(&self.config.cluster_tool)
            .args(["revoke", "-R"])
            .arg(path_arg(dir));
        self.runner.run(&spec).await?;
        Ok(())
    }
}
