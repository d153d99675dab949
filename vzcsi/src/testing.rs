//! In-memory doubles for the driver's capabilities.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::{ExternalVolumeBackend, ImageHandle};
use crate::descriptor;
use crate::error::CsiError;
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::mounter::{MountEntry, MountKind, MountOptions, Mounter};
use crate::types::PlacementAttribute;

pub(crate) const DESCRIPTOR: &str = "DiskDescriptor.xml";

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// Records every command; fails those whose rendered argv contains a
/// configured substring and answers others from canned stdout.
#[derive(Default)]
pub(crate) struct FakeRunner {
    pub calls: Mutex<Vec<CommandSpec>>,
    pub fail_matching: Mutex<Vec<String>>,
    pub stdout: Mutex<HashMap<String, String>>,
}

impl FakeRunner {
    pub fn fail_on(&self, needle: &str) {
        self.fail_matching.lock().unwrap().push(needle.to_owned());
    }

    pub fn respond(&self, command: &str, stdout: &str) {
        self.stdout
            .lock()
            .unwrap()
            .insert(command.to_owned(), stdout.to_owned());
    }

    pub fn rendered(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CsiError> {
        self.calls.lock().unwrap().push(spec.clone());
        let rendered = spec.to_string();
        if self
            .fail_matching
            .lock()
            .unwrap()
            .iter()
            .any(|n| rendered.contains(n.as_str()))
        {
            return Err(CsiError::CommandFailed {
                command: rendered,
                reason: "exit status 1".into(),
            });
        }
        let stdout = self
            .stdout
            .lock()
            .unwrap()
            .get(&rendered)
            .cloned()
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Mounter
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeMounter {
    pub mount_points: Mutex<HashSet<PathBuf>>,
    pub kinds: Mutex<HashMap<PathBuf, MountKind>>,
    pub table: Mutex<Vec<MountEntry>>,
    pub binds: Mutex<Vec<(PathBuf, PathBuf, MountOptions)>>,
    pub unmounts: Mutex<Vec<PathBuf>>,
    pub fail_bind: Mutex<bool>,
}

impl FakeMounter {
    pub fn set_kind(&self, path: &Path, kind: MountKind) {
        self.kinds.lock().unwrap().insert(path.to_path_buf(), kind);
    }

    pub fn is_mounted(&self, path: &Path) -> bool {
        self.mount_points.lock().unwrap().contains(path)
    }
}

#[async_trait]
impl Mounter for FakeMounter {
    async fn is_mount_point(&self, path: &Path) -> Result<bool, CsiError> {
        Ok(self.is_mounted(path))
    }

    async fn mount_kind(&self, path: &Path) -> Result<MountKind, CsiError> {
        if let Some(kind) = self.kinds.lock().unwrap().get(path) {
            return Ok(*kind);
        }
        Ok(if path.exists() {
            MountKind::Other
        } else {
            MountKind::Missing
        })
    }

    async fn mount_table(&self) -> Result<Vec<MountEntry>, CsiError> {
        Ok(self.table.lock().unwrap().clone())
    }

    async fn bind_mount(
        &self,
        source: &Path,
        target: &Path,
        options: &MountOptions,
    ) -> Result<(), CsiError> {
        if *self.fail_bind.lock().unwrap() {
            return Err(CsiError::MountFailed {
                path: target.display().to_string(),
                reason: "EPERM".into(),
            });
        }
        self.binds.lock().unwrap().push((
            source.to_path_buf(),
            target.to_path_buf(),
            options.clone(),
        ));
        self.mount_points
            .lock()
            .unwrap()
            .insert(target.to_path_buf());
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<(), CsiError> {
        self.unmounts.lock().unwrap().push(target.to_path_buf());
        if !self.mount_points.lock().unwrap().remove(target) {
            return Err(CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: "EINVAL".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExternalVolumeBackend
// ---------------------------------------------------------------------------

/// Backend double that writes real descriptor files into the (temporary)
/// directory tree and keeps attach state in memory.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub created: Mutex<Vec<(PathBuf, u64, PathBuf)>>,
    pub destroyed: Mutex<Vec<PathBuf>>,
    /// Image directory -> mount directory.
    pub mounted: Mutex<HashMap<PathBuf, PathBuf>>,
    pub mounts: Mutex<Vec<(PathBuf, PathBuf, bool)>>,
    pub attributes: Mutex<Vec<(PathBuf, PlacementAttribute, String)>>,
    pub revoked: Mutex<Vec<PathBuf>>,
    pub fail_create: Mutex<bool>,
    pub fail_mount: Mutex<bool>,
    pub fail_destroy: Mutex<bool>,
    pub fail_revoke: Mutex<bool>,
    pub fail_attribute: Mutex<Option<PlacementAttribute>>,
}

impl FakeBackend {
    pub fn mounted_count(&self) -> usize {
        self.mounted.lock().unwrap().len()
    }
}

#[async_trait]
impl ExternalVolumeBackend for FakeBackend {
    async fn create(&self, dir: &Path, size_kib: u64, image: &Path) -> Result<(), CsiError> {
        if *self.fail_create.lock().unwrap() {
            return Err(CsiError::BackendError("ploop-volume create failed".into()));
        }
        tokio::fs::write(image, b"")
            .await
            .map_err(|e| CsiError::io(image, e))?;
        let path = dir.join(DESCRIPTOR);
        tokio::fs::write(&path, descriptor::render(size_kib * 2, image))
            .await
            .map_err(|e| CsiError::io(&path, e))?;
        self.created.lock().unwrap().push((
            dir.to_path_buf(),
            size_kib,
            image.to_path_buf(),
        ));
        Ok(())
    }

    async fn open(&self, dir: &Path) -> Result<ImageHandle, CsiError> {
        ImageHandle::open(dir, DESCRIPTOR).await
    }

    async fn is_mounted(&self, image: &ImageHandle) -> Result<bool, CsiError> {
        Ok(self.mounted.lock().unwrap().contains_key(&image.dir))
    }

    async fn mount(
        &self,
        image: &ImageHandle,
        target: &Path,
        read_only: bool,
    ) -> Result<(), CsiError> {
        if *self.fail_mount.lock().unwrap() {
            return Err(CsiError::BackendError("ploop mount failed".into()));
        }
        self.mounts
            .lock()
            .unwrap()
            .push((image.dir.clone(), target.to_path_buf(), read_only));
        self.mounted
            .lock()
            .unwrap()
            .insert(image.dir.clone(), target.to_path_buf());
        Ok(())
    }

    async fn unmount(&self, mount_dir: &Path) -> Result<(), CsiError> {
        let mut mounted = self.mounted.lock().unwrap();
        let before = mounted.len();
        mounted.retain(|_, mnt| mnt != mount_dir);
        if mounted.len() == before {
            return Err(CsiError::BackendError(format!(
                "nothing mounted at {}",
                mount_dir.display()
            )));
        }
        Ok(())
    }

    async fn destroy(&self, image: &ImageHandle) -> Result<(), CsiError> {
        if *self.fail_destroy.lock().unwrap() {
            return Err(CsiError::BackendError("ploop-volume delete failed".into()));
        }
        tokio::fs::remove_dir_all(&image.dir)
            .await
            .map_err(|e| CsiError::io(&image.dir, e))?;
        self.destroyed.lock().unwrap().push(image.dir.clone());
        Ok(())
    }

    async fn set_attribute(
        &self,
        dir: &Path,
        attr: PlacementAttribute,
        value: &str,
    ) -> Result<(), CsiError> {
        if *self.fail_attribute.lock().unwrap() == Some(attr) {
            return Err(CsiError::CommandFailed {
                command: format!("vstorage set-attr -R {} {attr}={value}", dir.display()),
                reason: "exit status 1".into(),
            });
        }
        self.attributes
            .lock()
            .unwrap()
            .push((dir.to_path_buf(), attr, value.to_owned()));
        Ok(())
    }

    async fn revoke_lease(&self, dir: &Path) -> Result<(), CsiError> {
        self.revoked.lock().unwrap().push(dir.to_path_buf());
        if *self.fail_revoke.lock().unwrap() {
            return Err(CsiError::CommandFailed {
                command: format!("vstorage revoke -R {}", dir.display()),
                reason: "exit status 1".into(),
            });
        }
        Ok(())
    }
}

/// Lay down a volume the way the backend would: metadata dir + descriptor.
pub(crate) async fn write_volume(dir: &Path, size_kib: u64) {
    tokio::fs::create_dir_all(dir).await.unwrap();
    tokio::fs::write(
        dir.join(DESCRIPTOR),
        descriptor::render(size_kib * 2, &dir.join("root.hds")),
    )
    .await
    .unwrap();
}
