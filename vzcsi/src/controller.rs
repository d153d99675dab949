//! CSI Controller service trait.
//!
//! The Controller service owns the volume lifecycle on the shared cluster
//! filesystem: creating and deleting the backing images.  Attach is done
//! entirely on the node, so the publish calls here only validate their
//! arguments.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{
    ControllerPublishVolumeRequest, ControllerUnpublishVolumeRequest, CreateVolumeRequest,
    DeleteVolumeRequest, ValidateVolumeCapabilitiesRequest, Volume,
};

#[async_trait]
pub trait CsiController: Send + Sync {
    /// Provision a volume, or return the existing one if a volume with the
    /// same name and at least the requested capacity is already there.
    ///
    /// The returned `volume_context` must be forwarded to node publish.
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError>;

    /// Delete a volume.  Deleting an absent volume succeeds.
    async fn delete_volume(&self, req: DeleteVolumeRequest) -> Result<(), CsiError>;

    /// Check whether the given capabilities are compatible with the volume.
    async fn validate_volume_capabilities(
        &self,
        req: ValidateVolumeCapabilitiesRequest,
    ) -> Result<bool, CsiError>;

    /// Returns the publish context handed to the node.
    async fn controller_publish_volume(
        &self,
        req: ControllerPublishVolumeRequest,
    ) -> Result<HashMap<String, String>, CsiError>;

    async fn controller_unpublish_volume(
        &self,
        req: ControllerUnpublishVolumeRequest,
    ) -> Result<(), CsiError>;
}
