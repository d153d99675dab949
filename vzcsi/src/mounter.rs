//! Mount table inspection and mount/unmount syscalls.
//!
//! [`Mounter`] is the seam between the node components and the kernel.  The
//! production [`SystemMounter`] scans the mount table, probes filesystem
//! types with `statfs(2)` and calls `mount(2)`/`umount(2)` through `nix`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use nix::mount::MsFlags;
use tracing::{debug, warn};

use crate::error::CsiError;

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub path: PathBuf,
    pub fs_type: String,
}

/// Classification of whatever is mounted at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// The path does not exist.
    Missing,
    /// The cluster filesystem is mounted there.
    Cluster,
    /// Any other filesystem (including a plain directory on its parent's).
    Other,
}

/// Options applied to a bind mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub read_only: bool,
    /// Caller mount flags such as `noatime`; `ro` is equivalent to `read_only`.
    pub flags: Vec<String>,
}

impl MountOptions {
    fn ms_flags(&self) -> MsFlags {
        let mut flags = MsFlags::empty();
        if self.read_only {
            flags |= MsFlags::MS_RDONLY;
        }
        for flag in &self.flags {
            match flag.as_str() {
                "ro" => flags |= MsFlags::MS_RDONLY,
                "rw" | "bind" | "defaults" => {}
                "noatime" => flags |= MsFlags::MS_NOATIME,
                "nodiratime" => flags |= MsFlags::MS_NODIRATIME,
                "relatime" => flags |= MsFlags::MS_RELATIME,
                "nosuid" => flags |= MsFlags::MS_NOSUID,
                "nodev" => flags |= MsFlags::MS_NODEV,
                "noexec" => flags |= MsFlags::MS_NOEXEC,
                other => warn!(flag = other, "unsupported bind mount flag, ignoring"),
            }
        }
        flags
    }
}

#[async_trait]
pub trait Mounter: Send + Sync {
    /// Whether `path` appears as a mount point in the mount table.
    async fn is_mount_point(&self, path: &Path) -> Result<bool, CsiError>;

    async fn mount_kind(&self, path: &Path) -> Result<MountKind, CsiError>;

    async fn mount_table(&self) -> Result<Vec<MountEntry>, CsiError>;

    async fn bind_mount(
        &self,
        source: &Path,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), CsiError>;

    async fn unmount(&self, target: &Path) -> Result<(), CsiError>;
}

/// Parse mount table contents (`/proc/mounts` format).
///
/// Format: `<device> <mountpoint> <fstype> <options> <dump> <pass>`.  Lines
/// with fewer than three fields are skipped.
pub fn parse_mount_table(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let path = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                device: unescape(device),
                path: PathBuf::from(unescape(path)),
                fs_type: fs_type.to_owned(),
            })
        })
        .collect()
}

/// Undo the kernel's octal escaping (`\040` for space, `\011` for tab, ...).
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits
                    .iter()
                    .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(v) = u8::try_from(value) {
                    out.push(v);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// [`Mounter`] operating on the running kernel.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mount_table: PathBuf,
}

impl SystemMounter {
    pub fn new(mount_table: impl Into<PathBuf>) -> Self {
        Self {
            mount_table: mount_table.into(),
        }
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new("/proc/self/mounts")
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn is_mount_point(&self, path: &Path) -> Result<bool, CsiError> {
        let table = self.mount_table().await?;
        Ok(table.iter().any(|entry| entry.path == path))
    }

    async fn mount_kind(&self, path: &Path) -> Result<MountKind, CsiError> {
        match nix::sys::statfs::statfs(path) {
            Ok(stat) if stat.filesystem_type() == nix::sys::statfs::FUSE_SUPER_MAGIC => {
                Ok(MountKind::Cluster)
            }
            Ok(_) => Ok(MountKind::Other),
            Err(nix::errno::Errno::ENOENT) => Ok(MountKind::Missing),
            Err(e) => Err(CsiError::io(path, format!("statfs: {e}"))),
        }
    }

    async fn mount_table(&self) -> Result<Vec<MountEntry>, CsiError> {
        let contents = tokio::fs::read_to_string(&self.mount_table)
            .await
            .map_err(|e| CsiError::io(&self.mount_table, e))?;
        Ok(parse_mount_table(&contents))
    }

    async fn bind_mount(
        &self,
        source: &Path,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), CsiError> {
        let mount_failed = |reason: String| CsiError::MountFailed {
            path: target.display().to_string(),
            reason,
        };

        nix::mount::mount(
            Some(source),
            target,
            None::<&str>,
            MsFlags::MS_BIND,
            None::<&str>,
        )
        .map_err(|e| mount_failed(e.to_string()))?;

        // MS_BIND ignores per-mount flags on the first call; they only take
        // effect on a remount of the bind.
        let extra = options.ms_flags();
        if !extra.is_empty() {
            let remount = nix::mount::mount(
                None::<&str>,
                target,
                None::<&str>,
                MsFlags::MS_BIND | MsFlags::MS_REMOUNT | extra,
                None::<&str>,
            );
            if let Err(e) = remount {
                if let Err(undo) = nix::mount::umount(target) {
                    warn!(target = %target.display(), error = %undo, "failed to drop bind mount after remount error");
                }
                return Err(mount_failed(format!("remount with {extra:?}: {e}")));
            }
        }

        debug!(source = %source.display(), target = %target.display(), "bind mount created");
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        nix::mount::umount(target).map_err(|e| CsiError::UnmountFailed {
            path: target.display().to_string(),
            reason: e.to_string(),
        })
    }
}
