//! Driver configuration.
//!
//! Every component receives a [`DriverConfig`] at construction; nothing reads
//! process-wide state after that.  [`DriverConfig::from_env`] overlays the
//! following environment variables on the defaults:
//!
//! - `VZCSI_WORKING_DIR`: root for cluster mount points and the `mounts/` tree.
//!   Defaults to `/var/run/ploop-flexvol`.
//! - `VZCSI_NODE_ID`: node identifier reported by `NodeGetInfo`.
//! - `VZCSI_CLUSTER_TOOL`, `VZCSI_CLUSTER_MOUNT_TOOL`, `VZCSI_PLOOP_TOOL`,
//!   `VZCSI_PLOOP_VOLUME_TOOL`: external command names or paths.
//! - `VZCSI_MOUNT_TABLE`: mount table to scan.  Defaults to `/proc/mounts`.

use std::path::PathBuf;

use serde::Deserialize;

/// Configuration shared by the cluster, provisioner and tracker components.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverConfig {
    /// Node-local root holding one mount point per cluster plus the
    /// `mounts/` subtree of private mounts and indirection links.
    pub working_dir: PathBuf,
    pub node_id: String,
    pub max_volumes_per_node: u64,
    /// Capacity used when a create request does not specify one.
    pub default_capacity_bytes: u64,

    /// Cluster administration tool (`auth-node`, `set-attr`, `revoke`).
    pub cluster_tool: String,
    /// Cluster FUSE mount helper.
    pub cluster_mount_tool: String,
    /// Filesystem type the cluster FUSE mount reports in the mount table.
    pub cluster_fs_type: String,
    /// Device prefix of cluster mounts in the mount table, followed by the cluster name.
    pub cluster_device_prefix: String,
    pub mount_table: PathBuf,

    /// Image mount/umount tool.
    pub ploop_tool: String,
    /// Volume create/delete tool.
    pub ploop_volume_tool: String,
    /// Descriptor file the backend writes in every volume's metadata directory.
    pub descriptor_name: String,
    /// Image file created inside `<id>.image`.
    pub image_file_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/var/run/ploop-flexvol"),
            node_id: "localhost".to_owned(),
            max_volumes_per_node: 256,
            default_capacity_bytes: 1024 * 1024 * 1024,
            cluster_tool: "vstorage".to_owned(),
            cluster_mount_tool: "vstorage-mount".to_owned(),
            cluster_fs_type: "fuse.vstorage".to_owned(),
            cluster_device_prefix: "vstorage://".to_owned(),
            mount_table: PathBuf::from("/proc/mounts"),
            ploop_tool: "ploop".to_owned(),
            ploop_volume_tool: "/usr/sbin/ploop-volume".to_owned(),
            descriptor_name: "DiskDescriptor.xml".to_owned(),
            image_file_name: "root.hds".to_owned(),
        }
    }
}

impl DriverConfig {
    /// Defaults overlaid with `VZCSI_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each `VZCSI_*` key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("VZCSI_WORKING_DIR") {
            cfg.working_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VZCSI_NODE_ID") {
            cfg.node_id = v;
        }
        if let Some(v) = get("VZCSI_CLUSTER_TOOL") {
            cfg.cluster_tool = v;
        }
        if let Some(v) = get("VZCSI_CLUSTER_MOUNT_TOOL") {
            cfg.cluster_mount_tool = v;
        }
        if let Some(v) = get("VZCSI_PLOOP_TOOL") {
            cfg.ploop_tool = v;
        }
        if let Some(v) = get("VZCSI_PLOOP_VOLUME_TOOL") {
            cfg.ploop_volume_tool = v;
        }
        if let Some(v) = get("VZCSI_MOUNT_TABLE") {
            cfg.mount_table = PathBuf::from(v);
        }
        cfg
    }

    /// Directory holding private mounts and indirection links.
    pub fn mounts_dir(&self) -> PathBuf {
        self.working_dir.join("mounts")
    }

    /// Local mount point of `cluster`.
    pub fn cluster_mount_point(&self, cluster: &str) -> PathBuf {
        self.working_dir.join(cluster)
    }
}
