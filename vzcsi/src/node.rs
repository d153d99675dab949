//! CSI Node service trait.
//!
//! The Node service runs on each worker node and makes a volume available
//! at the path the orchestrator asks for:
//!
//! 1. **Publish**: attach the image privately and bind-mount it onto the
//!    target path.
//! 2. **Unpublish**: remove the bind mount and detach the image.
//!
//! Stage and unstage are accepted but do nothing; all work happens in
//! publish.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    NodeInfo, NodePublishVolumeRequest, NodeStageVolumeRequest, NodeUnpublishVolumeRequest,
    NodeUnstageVolumeRequest,
};

#[async_trait]
pub trait CsiNode: Send + Sync {
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    async fn unstage_volume(&self, req: NodeUnstageVolumeRequest) -> Result<(), CsiError>;

    /// Publish a volume at `target_path`.
    ///
    /// Idempotent: a target that is already a mount point succeeds without
    /// side effects.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unpublish the volume mounted at `target_path`.
    ///
    /// An unmounted target is [`CsiError::NotFound`], which callers may
    /// treat as already done.
    async fn unpublish_volume(&self, req: NodeUnpublishVolumeRequest) -> Result<(), CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
