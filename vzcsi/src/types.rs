//! Core CSI types: volumes, capabilities, requests, credentials and
//! placement parameters.
//!
//! These types form the data model shared by the CSI traits, the message
//! envelope, and the node/controller components.  They are all
//! [`Serialize`]/[`Deserialize`] so they can be carried by whatever transport
//! fronts the driver.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use tracing::warn;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Unique name of a volume within its volume-path namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access mode & capabilities
// ---------------------------------------------------------------------------

/// Describes how a volume may be accessed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    /// Single-node read-write.
    ReadWriteOnce,
    /// Multi-node read-only.
    ReadOnlyMany,
    /// Multi-node read-write.
    ReadWriteMany,
}

/// Describes the capabilities required from a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCapability {
    /// Requested access mode.
    pub access_mode: AccessMode,
    /// Additional mount flags (e.g. `"noatime"`), forwarded to the bind mount.
    #[serde(default)]
    pub mount_flags: Vec<String>,
    /// Filesystem type inside the ploop image.
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
}

fn default_fs_type() -> String {
    "ext4".to_owned()
}

impl Default for VolumeCapability {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::ReadWriteOnce,
            mount_flags: Vec::new(),
            fs_type: default_fs_type(),
        }
    }
}

// ---------------------------------------------------------------------------
// Volume descriptor
// ---------------------------------------------------------------------------

/// Descriptor returned for a provisioned volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Volume {
    /// Volume name, unique within its volume path.
    pub volume_id: VolumeId,
    /// Capacity in bytes, as requested by the caller.
    pub capacity_bytes: u64,
    /// Opaque context passed from Controller to Node operations.  Carries the
    /// storage-class parameters and the requested `size`.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

/// Lifecycle of a caller-visible target path on a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Publishing,
    Published,
    Unpublishing,
}

// ---------------------------------------------------------------------------
// Credentials & storage parameters
// ---------------------------------------------------------------------------

pub const SECRET_CLUSTER_NAME: &str = "clusterName";
pub const SECRET_CLUSTER_PASSWORD: &str = "clusterPassword";
pub const PARAM_VOLUME_PATH: &str = "volumePath";
pub const PARAM_DELTAS_PATH: &str = "deltasPath";

/// Cluster credentials extracted from an opaque secrets map.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub cluster_name: String,
    pub cluster_password: Option<String>,
    /// Volume path segment relative to the cluster mount, if the secret carries one.
    pub volume_path: Option<String>,
    pub deltas_path: Option<String>,
}

impl Credentials {
    pub fn from_secrets(secrets: &HashMap<String, String>) -> Self {
        let get = |key: &str| secrets.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            cluster_name: get(SECRET_CLUSTER_NAME).unwrap_or_default(),
            cluster_password: get(SECRET_CLUSTER_PASSWORD),
            volume_path: get(PARAM_VOLUME_PATH),
            deltas_path: get(PARAM_DELTAS_PATH),
        }
    }
}

// The password must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cluster_name", &self.cluster_name)
            .field(
                "cluster_password",
                &self.cluster_password.as_ref().map(|_| "<redacted>"),
            )
            .field("volume_path", &self.volume_path)
            .field("deltas_path", &self.deltas_path)
            .finish()
    }
}

/// Placement hint applied to a volume's directories on the cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PlacementAttribute {
    Replicas,
    Tier,
    Encoding,
    FailureDomain,
}

impl PlacementAttribute {
    /// Map a storage-class parameter key onto an attribute.
    pub fn from_parameter_key(key: &str) -> Option<Self> {
        match key {
            "vzsReplicas" => Some(Self::Replicas),
            "vzsTier" => Some(Self::Tier),
            "vzsEncoding" => Some(Self::Encoding),
            "vzsFailureDomain" => Some(Self::FailureDomain),
            _ => None,
        }
    }

    /// Attribute name understood by the cluster's `set-attr` command.
    pub fn attr_name(self) -> &'static str {
        match self {
            Self::Replicas => "replicas",
            Self::Tier => "tier",
            Self::Encoding => "encoding",
            Self::FailureDomain => "failure-domain",
        }
    }
}

impl fmt::Display for PlacementAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.attr_name())
    }
}

/// Keys accepted in storage-class parameters without being applied as attributes.
const PASSTHROUGH_KEYS: [&str; 2] = ["kubernetes.io/readwrite", "kubernetes.io/fsType"];

/// Storage-class parameters understood by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageParameters {
    pub volume_path: Option<String>,
    pub deltas_path: Option<String>,
    /// Placement attributes, sorted so they are applied in a stable order.
    pub attributes: Vec<(PlacementAttribute, String)>,
}

impl StorageParameters {
    /// Parse a parameter map.  Unknown keys are logged and ignored.
    pub fn from_map(params: &HashMap<String, String>) -> Self {
        let mut out = Self::default();
        for (key, value) in params {
            if let Some(attr) = PlacementAttribute::from_parameter_key(key) {
                out.attributes.push((attr, value.clone()));
                continue;
            }
            match key.as_str() {
                PARAM_VOLUME_PATH if !value.is_empty() => out.volume_path = Some(value.clone()),
                PARAM_DELTAS_PATH if !value.is_empty() => out.deltas_path = Some(value.clone()),
                PARAM_VOLUME_PATH | PARAM_DELTAS_PATH | "size" => {}
                k if PASSTHROUGH_KEYS.contains(&k) => {}
                _ => warn!(key = %key, value = %value, "unknown storage parameter, ignoring"),
            }
        }
        out.attributes
            .sort_by(|a, b| a.0.attr_name().cmp(b.0.attr_name()));
        out
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Volume name; also becomes the volume id.
    pub name: String,
    /// Required capacity in bytes.  `None` selects the configured default.
    #[serde(default)]
    pub capacity_bytes: Option<u64>,
    /// Required capabilities.
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
    /// Storage-class parameters.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Cluster credentials.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

/// Request to delete a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateVolumeCapabilitiesRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerPublishVolumeRequest {
    pub volume_id: VolumeId,
    pub node_id: String,
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerUnpublishVolumeRequest {
    pub volume_id: VolumeId,
    #[serde(default)]
    pub node_id: String,
}

/// Request to stage a volume on a node.  Staging is folded into publish, so
/// this only carries what a caller would send.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeStageVolumeRequest {
    pub volume_id: VolumeId,
    pub staging_target_path: String,
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUnstageVolumeRequest {
    pub volume_id: VolumeId,
    pub staging_target_path: String,
}

/// Request to attach a volume's image and expose it at a target path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    pub volume_id: VolumeId,
    /// Caller-visible path,
    /// e.g. `/var/lib/kubelet/pods/<pod-uid>/volumes/<vol-name>`.
    pub target_path: String,
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
    /// Whether the image and the bind mount should be read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Opaque context carried from `CreateVolume`.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
    /// Cluster credentials.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUnpublishVolumeRequest {
    pub volume_id: VolumeId,
    pub target_path: String,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub vendor_version: String,
}

/// Capabilities advertised by the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node_id: String,
    /// Maximum number of volumes the node can host.
    pub max_volumes: u64,
}
