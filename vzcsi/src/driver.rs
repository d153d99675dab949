//! Virtuozzo Storage CSI driver.
//!
//! [`VzDriver`] implements [`CsiIdentity`], [`CsiController`], and
//! [`CsiNode`] on top of the three core components: [`ClusterMountManager`]
//! for the shared cluster filesystem, [`VolumeProvisioner`] for image
//! lifecycle, and [`MountStateTracker`] for node attach/detach.
//!
//! # On-disk layout
//!
//! ```text
//! <working_dir>/
//!   <cluster>/                    # cluster filesystem mount point
//!     <volumePath>/<id>/          # volume metadata + DiskDescriptor.xml
//!     <deltasPath>/<id>.image/    # image directory
//!   mounts/                       # see `tracker`
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::backend::ExternalVolumeBackend;
use crate::backend::ploop::PloopBackend;
use crate::cluster::ClusterMountManager;
use crate::config::DriverConfig;
use crate::controller::CsiController;
use crate::error::CsiError;
use crate::exec::{CommandRunner, TokioCommandRunner};
use crate::fsutil;
use crate::identity::CsiIdentity;
use crate::mounter::{Mounter, SystemMounter};
use crate::node::CsiNode;
use crate::provisioner::{ProvisionRequest, VolumeProvisioner};
use crate::tracker::{MountStateTracker, PublishRequest};
use crate::types::*;

pub const DRIVER_NAME: &str = "csi-vzstorage";

/// Volume context key carrying the provisioned size in bytes.
pub const CONTEXT_SIZE: &str = "size";

fn require(value: &str, what: &str) -> Result<(), CsiError> {
    if value.is_empty() {
        return Err(CsiError::InvalidArgument(format!("{what} missing in request")));
    }
    Ok(())
}

/// Path segment from the secrets. A storage parameter may repeat it but not
/// change it.
fn secret_path(key: &str, param: Option<&str>, secret: Option<&str>) -> Result<String, CsiError> {
    let secret = secret.unwrap_or_default();
    match param {
        Some(p) if !p.is_empty() && p != secret => Err(CsiError::InvalidArgument(format!(
            "parameter {key}={p:?} does not match the secret; paths are taken from the secret"
        ))),
        _ => Ok(secret.to_owned()),
    }
}

pub struct VzDriver {
    config: Arc<DriverConfig>,
    clusters: ClusterMountManager,
    provisioner: VolumeProvisioner,
    tracker: MountStateTracker,
}

impl VzDriver {
    pub fn new(
        config: DriverConfig,
        runner: Arc<dyn CommandRunner>,
        mounter: Arc<dyn Mounter>,
        backend: Arc<dyn ExternalVolumeBackend>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            clusters: ClusterMountManager::new(config.clone(), runner, mounter.clone()),
            provisioner: VolumeProvisioner::new(config.clone(), backend.clone()),
            tracker: MountStateTracker::new(config.clone(), backend, mounter),
            config,
        }
    }

    /// Driver wired to the real `vstorage`/`ploop` tools and kernel mounts.
    pub fn with_system(config: DriverConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioCommandRunner);
        let mounter = Arc::new(SystemMounter::new(config.mount_table.clone()));
        let backend = Arc::new(PloopBackend::new(
            Arc::new(config.clone()),
            runner.clone(),
        ));
        Self::new(config, runner, mounter, backend)
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    async fn cluster_root(&self, creds: &Credentials) -> Result<PathBuf, CsiError> {
        self.clusters
            .ensure(&creds.cluster_name, creds.cluster_password.as_deref())
            .await
    }
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for VzDriver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: DRIVER_NAME.to_owned(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(tokio::fs::metadata(&self.config.working_dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![PluginCapability::ControllerService])
    }
}

// ---------------------------------------------------------------------------
// CsiController
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiController for VzDriver {
    #[instrument(skip(self, req), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        require(&req.name, "name")?;
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities missing in request".into(),
            ));
        }

        let creds = Credentials::from_secrets(&req.secrets);
        let params = StorageParameters::from_map(&req.parameters);
        // Delete and publish only see the secrets, so create must agree with them.
        let volume_path = secret_path(
            PARAM_VOLUME_PATH,
            params.volume_path.as_deref(),
            creds.volume_path.as_deref(),
        )?;
        let deltas_path = secret_path(
            PARAM_DELTAS_PATH,
            params.deltas_path.as_deref(),
            creds.deltas_path.as_deref(),
        )?;
        let capacity_bytes = req
            .capacity_bytes
            .filter(|&b| b > 0)
            .unwrap_or(self.config.default_capacity_bytes);

        if volume_path.is_empty() {
            return Err(CsiError::InvalidArgument("volumePath isn't specified".into()));
        }
        let root = self.cluster_root(&creds).await?;

        let mut context = req.parameters.clone();
        context.insert(CONTEXT_SIZE.to_owned(), capacity_bytes.to_string());

        let id = VolumeId::from(req.name.as_str());
        self.provisioner
            .create_volume(ProvisionRequest {
                root: &root,
                id: &id,
                capacity_bytes,
                volume_path: &volume_path,
                deltas_path: &deltas_path,
                attributes: &params.attributes,
                context,
            })
            .await
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id))]
    async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        let creds = Credentials::from_secrets(&req.secrets);
        let root = self.cluster_root(&creds).await?;
        self.provisioner
            .delete_volume(
                &root,
                &req.volume_id,
                creds.volume_path.as_deref().unwrap_or_default(),
                creds.deltas_path.as_deref().unwrap_or_default(),
            )
            .await
    }

    async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<bool, CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities missing in request".into(),
            ));
        }
        Ok(true)
    }

    async fn controller_publish_volume(
        &self,
        req: ControllerPublishVolumeRequest,
    ) -> Result<HashMap<String, String>, CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        require(&req.node_id, "node id")?;
        if req.volume_capability.is_none() {
            return Err(CsiError::InvalidArgument(
                "volume capability missing in request".into(),
            ));
        }
        debug!(volume_id = %req.volume_id, node_id = %req.node_id, "controller publish is a no-op");
        Ok(HashMap::new())
    }

    async fn controller_unpublish_volume(
        &self,
        req: ControllerUnpublishVolumeRequest,
    ) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CsiNode
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiNode for VzDriver {
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        require(&req.staging_target_path, "staging target path")?;
        Ok(())
    }

    async fn unstage_volume(&self, req: NodeUnstageVolumeRequest) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        require(&req.staging_target_path, "staging target path")?;
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        require(&req.target_path, "target path")?;

        let creds = Credentials::from_secrets(&req.secrets);
        let root = self.cluster_root(&creds).await?;

        fsutil::check_name(req.volume_id.as_str(), "volume id")?;
        let image_dir =
            fsutil::join_under(&root, creds.volume_path.as_deref().unwrap_or_default())?
                .join(req.volume_id.as_str());

        let mount_flags = req
            .volume_capability
            .map(|c| c.mount_flags)
            .unwrap_or_default();

        self.tracker
            .publish(PublishRequest {
                target_path: Path::new(&req.target_path),
                image_dir: &image_dir,
                read_only: req.read_only,
                mount_flags: &mount_flags,
            })
            .await
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError> {
        require(req.volume_id.as_str(), "volume id")?;
        require(&req.target_path, "target path")?;
        self.tracker.unpublish(Path::new(&req.target_path)).await?;
        info!("node unpublish complete");
        Ok(())
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.config.node_id.clone(),
            max_volumes: self.config.max_volumes_per_node,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::mounter::MountKind;
    use crate::testing::{FakeBackend, FakeMounter, FakeRunner, init_tracing};

    struct Fixture {
        tmp: tempfile::TempDir,
        runner: Arc<FakeRunner>,
        mounter: Arc<FakeMounter>,
        backend: Arc<FakeBackend>,
        driver: VzDriver,
    }

    impl Fixture {
        fn cluster_root(&self) -> PathBuf {
            self.tmp.path().join("vz1")
        }
    }

    async fn fixture() -> Fixture {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let config = DriverConfig {
            working_dir: tmp.path().to_path_buf(),
            node_id: "node-a".into(),
            ..Default::default()
        };
        let runner = Arc::new(FakeRunner::default());
        let mounter = Arc::new(FakeMounter::default());
        let backend = Arc::new(FakeBackend::default());
        let driver = VzDriver::new(config, runner.clone(), mounter.clone(), backend.clone());
        let f = Fixture {
            tmp,
            runner,
            mounter,
            backend,
            driver,
        };
        tokio::fs::create_dir_all(f.cluster_root()).await.unwrap();
        f.mounter.set_kind(&f.cluster_root(), MountKind::Cluster);
        f
    }

    fn secrets() -> HashMap<String, String> {
        HashMap::from([
            (SECRET_CLUSTER_NAME.to_owned(), "vz1".to_owned()),
            (SECRET_CLUSTER_PASSWORD.to_owned(), "s3cret".to_owned()),
            (PARAM_VOLUME_PATH.to_owned(), "kube".to_owned()),
        ])
    }

    fn create_req(name: &str, capacity_bytes: Option<u64>) -> CreateVolumeRequest {
        CreateVolumeRequest {
            name: name.into(),
            capacity_bytes,
            volume_capabilities: vec![VolumeCapability::default()],
            parameters: HashMap::from([("vzsReplicas".to_owned(), "3".to_owned())]),
            secrets: secrets(),
        }
    }

    #[tokio::test]
    async fn full_volume_lifecycle() {
        let f = fixture().await;
        let vol = f
            .driver
            .create_volume(create_req("pvc-1", Some(64 << 20)))
            .await
            .unwrap();
        assert_eq!(vol.volume_id, VolumeId::from("pvc-1"));
        let metadata_dir = f.cluster_root().join("kube/pvc-1");
        assert!(metadata_dir.join("DiskDescriptor.xml").is_file());
        assert!(f.cluster_root().join("kube/pvc-1.image").is_dir());

        let target = f.tmp.path().join("pods/p1/volume");
        f.driver
            .publish_volume(NodePublishVolumeRequest {
                volume_id: vol.volume_id.clone(),
                target_path: target.to_string_lossy().into_owned(),
                volume_context: vol.volume_context.clone(),
                secrets: secrets(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(f.mounter.is_mounted(&target));
        assert!(
            f.backend
                .mounted
                .lock()
                .unwrap()
                .contains_key(&metadata_dir)
        );

        f.driver
            .unpublish_volume(NodeUnpublishVolumeRequest {
                volume_id: vol.volume_id.clone(),
                target_path: target.to_string_lossy().into_owned(),
            })
            .await
            .unwrap();
        assert!(!f.mounter.is_mounted(&target));
        assert_eq!(f.backend.mounted_count(), 0);

        f.driver
            .delete_volume(DeleteVolumeRequest {
                volume_id: vol.volume_id.clone(),
                secrets: secrets(),
            })
            .await
            .unwrap();
        assert!(!metadata_dir.exists());
        assert!(!f.cluster_root().join("kube/pvc-1.image").exists());
        assert!(!f.cluster_root().join("kube/pvc-1.deleted").exists());
        // Cluster already mounted: no tool invocations.
        assert!(f.runner.rendered().is_empty());
    }

    #[tokio::test]
    async fn create_defaults_capacity_and_returns_context() {
        let f = fixture().await;
        let vol = f.driver.create_volume(create_req("pvc-1", None)).await.unwrap();

        assert_eq!(vol.capacity_bytes, 1 << 30);
        assert_eq!(vol.volume_context.get("size").map(String::as_str), Some("1073741824"));
        assert_eq!(vol.volume_context.get("vzsReplicas").map(String::as_str), Some("3"));
        let created = f.backend.created.lock().unwrap();
        assert_eq!(created[0].1, 1 << 20);
        let attrs = f.backend.attributes.lock().unwrap();
        assert!(
            attrs
                .iter()
                .all(|(_, a, v)| *a == PlacementAttribute::Replicas && v == "3")
        );
        assert_eq!(attrs.len(), 2);
    }

    #[tokio::test]
    async fn parameter_paths_must_match_the_secrets() {
        let f = fixture().await;
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.parameters
            .insert(PARAM_VOLUME_PATH.to_owned(), "fast".to_owned());
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        // A parameter path with no secret counterpart would be unreachable on delete.
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.secrets.remove(PARAM_VOLUME_PATH);
        req.parameters
            .insert(PARAM_VOLUME_PATH.to_owned(), "fast".to_owned());
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let mut req = create_req("pvc-1", Some(1 << 20));
        req.parameters
            .insert(PARAM_DELTAS_PATH.to_owned(), "deltas".to_owned());
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        assert!(f.backend.created.lock().unwrap().is_empty());
        assert!(!f.cluster_root().join("fast").exists());
    }

    #[tokio::test]
    async fn matching_parameter_paths_are_accepted() {
        let f = fixture().await;
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.secrets
            .insert(PARAM_DELTAS_PATH.to_owned(), "deltas".to_owned());
        req.parameters
            .insert(PARAM_VOLUME_PATH.to_owned(), "kube".to_owned());
        req.parameters
            .insert(PARAM_DELTAS_PATH.to_owned(), "deltas".to_owned());
        f.driver.create_volume(req).await.unwrap();

        assert!(f.cluster_root().join("kube/pvc-1").is_dir());
        assert!(f.cluster_root().join("deltas/pvc-1.image").is_dir());
    }

    #[tokio::test]
    async fn delete_finds_what_create_made_with_the_same_secrets() {
        let f = fixture().await;
        let mut secrets = secrets();
        secrets.insert(PARAM_DELTAS_PATH.to_owned(), "deltas".to_owned());
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.secrets = secrets.clone();
        f.driver.create_volume(req).await.unwrap();

        f.driver
            .delete_volume(DeleteVolumeRequest {
                volume_id: "pvc-1".into(),
                secrets,
            })
            .await
            .unwrap();
        assert_eq!(f.backend.destroyed.lock().unwrap().len(), 1);
        assert!(!f.cluster_root().join("kube/pvc-1").exists());
        assert!(!f.cluster_root().join("kube/pvc-1.deleted").exists());
        assert!(!f.cluster_root().join("deltas/pvc-1.image").exists());
    }

    #[tokio::test]
    async fn absolute_volume_path_stays_on_the_cluster() {
        let f = fixture().await;
        let mut secrets = secrets();
        secrets.insert(PARAM_VOLUME_PATH.to_owned(), "/kube".to_owned());
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.secrets = secrets.clone();
        let vol = f.driver.create_volume(req).await.unwrap();
        let metadata_dir = f.cluster_root().join("kube/pvc-1");
        assert!(metadata_dir.join("DiskDescriptor.xml").is_file());

        let target = f.tmp.path().join("pods/p1/volume");
        f.driver
            .publish_volume(NodePublishVolumeRequest {
                volume_id: vol.volume_id.clone(),
                target_path: target.to_string_lossy().into_owned(),
                volume_context: vol.volume_context.clone(),
                secrets,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(
            f.backend
                .mounted
                .lock()
                .unwrap()
                .contains_key(&metadata_dir)
        );
    }

    #[tokio::test]
    async fn escaping_paths_are_invalid() {
        let f = fixture().await;
        let mut req = create_req("pvc-1", Some(1 << 20));
        req.secrets
            .insert(PARAM_VOLUME_PATH.to_owned(), "kube/../..".to_owned());
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = f
            .driver
            .create_volume(create_req("../pvc-1", Some(1 << 20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(f.backend.created.lock().unwrap().is_empty());

        let err = f
            .driver
            .publish_volume(NodePublishVolumeRequest {
                volume_id: "../../etc".into(),
                target_path: f.tmp.path().join("pods/p1").to_string_lossy().into_owned(),
                secrets: secrets(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(f.backend.mounts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_validates_request() {
        let f = fixture().await;
        let err = f.driver.create_volume(create_req("", None)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let mut req = create_req("pvc-1", None);
        req.volume_capabilities.clear();
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let mut req = create_req("pvc-1", None);
        req.secrets.remove(PARAM_VOLUME_PATH);
        let err = f.driver.create_volume(req).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(f.backend.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_conflict_maps_to_already_exists() {
        let f = fixture().await;
        f.driver
            .create_volume(create_req("pvc-1", Some(1 << 20)))
            .await
            .unwrap();
        let err = f
            .driver
            .create_volume(create_req("pvc-1", Some(2 << 20)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn delete_of_unknown_volume_succeeds() {
        let f = fixture().await;
        f.driver
            .delete_volume(DeleteVolumeRequest {
                volume_id: "pvc-missing".into(),
                secrets: secrets(),
            })
            .await
            .unwrap();
        assert!(f.backend.revoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_without_cluster_name_is_invalid() {
        let f = fixture().await;
        let err = f
            .driver
            .publish_volume(NodePublishVolumeRequest {
                volume_id: "pvc-1".into(),
                target_path: "/tmp/never".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn unpublish_of_unmounted_target_is_not_found() {
        let f = fixture().await;
        let err = f
            .driver
            .unpublish_volume(NodeUnpublishVolumeRequest {
                volume_id: "pvc-1".into(),
                target_path: f.tmp.path().join("pods/x").to_string_lossy().into_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn controller_publish_and_stage_are_acknowledged() {
        let f = fixture().await;
        let ctx = f
            .driver
            .controller_publish_volume(ControllerPublishVolumeRequest {
                volume_id: "pvc-1".into(),
                node_id: "node-a".into(),
                volume_capability: Some(VolumeCapability::default()),
                read_only: false,
            })
            .await
            .unwrap();
        assert!(ctx.is_empty());

        let err = f
            .driver
            .controller_publish_volume(ControllerPublishVolumeRequest {
                volume_id: "pvc-1".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        f.driver
            .controller_unpublish_volume(ControllerUnpublishVolumeRequest {
                volume_id: "pvc-1".into(),
                node_id: "node-a".into(),
            })
            .await
            .unwrap();
        f.driver
            .stage_volume(NodeStageVolumeRequest {
                volume_id: "pvc-1".into(),
                staging_target_path: "/staging".into(),
                volume_capability: None,
            })
            .await
            .unwrap();
        f.driver
            .unstage_volume(NodeUnstageVolumeRequest {
                volume_id: "pvc-1".into(),
                staging_target_path: "/staging".into(),
            })
            .await
            .unwrap();
        assert!(f.mounter.binds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validate_capabilities_always_supported() {
        let f = fixture().await;
        assert!(
            f.driver
                .validate_volume_capabilities(ValidateVolumeCapabilitiesRequest {
                    volume_id: "pvc-1".into(),
                    volume_capabilities: vec![VolumeCapability::default()],
                })
                .await
                .unwrap()
        );
        let err = f
            .driver
            .validate_volume_capabilities(ValidateVolumeCapabilitiesRequest {
                volume_id: "pvc-1".into(),
                volume_capabilities: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn identity_and_node_info() {
        let f = fixture().await;
        let info = f.driver.get_plugin_info().await.unwrap();
        assert_eq!(info.name, "csi-vzstorage");
        assert!(f.driver.probe().await.unwrap());
        assert_eq!(
            f.driver.get_plugin_capabilities().await.unwrap(),
            vec![PluginCapability::ControllerService]
        );
        let node = f.driver.get_info().await.unwrap();
        assert_eq!(node.node_id, "node-a");
        assert_eq!(node.max_volumes, 256);
    }

    #[tokio::test]
    async fn probe_fails_without_working_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let driver = VzDriver::new(
            DriverConfig {
                working_dir: tmp.path().join("absent"),
                ..Default::default()
            },
            Arc::new(FakeRunner::default()),
            Arc::new(FakeMounter::default()),
            Arc::new(FakeBackend::default()),
        );
        assert!(!driver.probe().await.unwrap());
    }
}
