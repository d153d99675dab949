//! Cluster filesystem mounts.
//!
//! Every controller and node operation first makes sure the Virtuozzo
//! Storage cluster named in its credentials is mounted under
//! `<working_dir>/<cluster>`.  The check runs on every request and is
//! cheap when the mount is already there.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::config::DriverConfig;
use crate::error::CsiError;
use crate::exec::{CommandRunner, CommandSpec};
use crate::fsutil;
use crate::mounter::{MountKind, MountOptions, Mounter};

pub struct ClusterMountManager {
    config: Arc<DriverConfig>,
    runner: Arc<dyn CommandRunner>,
    mounter: Arc<dyn Mounter>,
}

impl ClusterMountManager {
    pub fn new(
        config: Arc<DriverConfig>,
        runner: Arc<dyn CommandRunner>,
        mounter: Arc<dyn Mounter>,
    ) -> Self {
        Self {
            config,
            runner,
            mounter,
        }
    }

    /// Mount `cluster` at its configured mount point and return that path.
    pub async fn ensure(&self, cluster: &str, password: Option<&str>) -> Result<PathBuf, CsiError> {
        if cluster.is_empty() {
            return Err(CsiError::InvalidArgument(
                "cluster name missing in credentials".into(),
            ));
        }
        let mount_point = self.config.cluster_mount_point(cluster);
        self.ensure_mounted(cluster, password, &mount_point).await?;
        Ok(mount_point)
    }

    /// Make the cluster filesystem available at `mount_point`.
    ///
    /// 1. Already mounted there: nothing to do.
    /// 2. Mounted elsewhere on the node: bind-mount that mount point here.
    /// 3. Otherwise authenticate the node with `password` and mount.
    #[instrument(skip(self, password), fields(mount_point = %mount_point.display()))]
    pub async fn ensure_mounted(
        &self,
        cluster: &str,
        password: Option<&str>,
        mount_point: &Path,
    ) -> Result<(), CsiError> {
        if self.mounter.mount_kind(mount_point).await? == MountKind::Cluster {
            debug!("cluster already mounted");
            return Ok(());
        }

        fsutil::create_dir_all(mount_point, fsutil::MODE_PRIVATE).await?;

        if let Some(existing) = self.find_existing(cluster).await? {
            self.mounter
                .bind_mount(&existing, mount_point, &MountOptions::default())
                .await?;
            info!(source = %existing.display(), "cluster bind-mounted from existing mount");
            return Ok(());
        }

        let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
            CsiError::Unauthenticated(format!("no password provided for cluster {cluster}"))
        })?;

        let auth = CommandSpec::new(&self.config.cluster_tool)
            .args(["-c", cluster, "auth-node", "-P"])
            .stdin(password);
        self.runner.run(&auth).await.map_err(|e| {
            CsiError::Unauthenticated(format!("unable to authenticate node in {cluster}: {e}"))
        })?;

        let mount = CommandSpec::new(&self.config.cluster_mount_tool)
            .args(["-c", cluster])
            .arg(mount_point.to_string_lossy());
        self.runner
            .run(&mount)
            .await
            .map_err(|e| CsiError::MountFailed {
                path: mount_point.display().to_string(),
                reason: e.to_string(),
            })?;

        info!("cluster mounted");
        Ok(())
    }

    /// Where `cluster` is already mounted on this node, if anywhere.
    async fn find_existing(&self, cluster: &str) -> Result<Option<PathBuf>, CsiError> {
        let device = format!("{}{cluster}", self.config.cluster_device_prefix);
        let table = self.mounter.mount_table().await?;
        Ok(table
            .into_iter()
            .find(|e| e.fs_type == self.config.cluster_fs_type && e.device == device)
            .map(|e| e.path))
    }
}
