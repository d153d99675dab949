//! CSI request/response envelope.
//!
//! [`CsiMessage`] carries every request the driver serves and the matching
//! responses.  A transport reads one request, hands it to [`dispatch`], and
//! writes back the returned response (or [`CsiMessage::Error`]).  The
//! envelope serializes with serde; the wire transport lives outside this
//! crate.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::controller::CsiController;
use crate::error::CsiError;
use crate::identity::CsiIdentity;
use crate::node::CsiNode;
use crate::types::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CsiMessage {
    // ----- Requests --------------------------------------------------------
    CreateVolume(CreateVolumeRequest),
    DeleteVolume(DeleteVolumeRequest),
    ValidateVolumeCapabilities(ValidateVolumeCapabilitiesRequest),
    ControllerPublishVolume(ControllerPublishVolumeRequest),
    ControllerUnpublishVolume(ControllerUnpublishVolumeRequest),

    StageVolume(NodeStageVolumeRequest),
    UnstageVolume(NodeUnstageVolumeRequest),
    PublishVolume(NodePublishVolumeRequest),
    UnpublishVolume(NodeUnpublishVolumeRequest),

    Probe,
    GetPluginInfo,
    GetPluginCapabilities,
    GetNodeInfo,

    // ----- Responses -------------------------------------------------------
    VolumeCreated(Volume),
    CapabilitiesValid(bool),
    /// Publish context returned by controller publish.
    PublishContext(HashMap<String, String>),
    PluginInfoResponse(PluginInfo),
    PluginCapabilitiesResponse(Vec<PluginCapability>),
    NodeInfoResponse(NodeInfo),

    /// Success with no payload.
    Ok,
    ProbeResult(bool),
    Error(CsiError),
}

impl CsiMessage {
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::CreateVolume(_)
                | Self::DeleteVolume(_)
                | Self::ValidateVolumeCapabilities(_)
                | Self::ControllerPublishVolume(_)
                | Self::ControllerUnpublishVolume(_)
                | Self::StageVolume(_)
                | Self::UnstageVolume(_)
                | Self::PublishVolume(_)
                | Self::UnpublishVolume(_)
                | Self::Probe
                | Self::GetPluginInfo
                | Self::GetPluginCapabilities
                | Self::GetNodeInfo
        )
    }
}

// Requests carry secrets, so only identifiers are printed.
impl fmt::Display for CsiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateVolume(req) => write!(f, "CreateVolume(name={})", req.name),
            Self::DeleteVolume(req) => write!(f, "DeleteVolume({})", req.volume_id),
            Self::ValidateVolumeCapabilities(req) => {
                write!(f, "ValidateVolumeCapabilities({})", req.volume_id)
            }
            Self::ControllerPublishVolume(req) => write!(
                f,
                "ControllerPublishVolume({}, node={})",
                req.volume_id, req.node_id
            ),
            Self::ControllerUnpublishVolume(req) => {
                write!(f, "ControllerUnpublishVolume({})", req.volume_id)
            }
            Self::StageVolume(req) => write!(f, "StageVolume({})", req.volume_id),
            Self::UnstageVolume(req) => write!(f, "UnstageVolume({})", req.volume_id),
            Self::PublishVolume(req) => write!(
                f,
                "PublishVolume({}, target={})",
                req.volume_id, req.target_path
            ),
            Self::UnpublishVolume(req) => write!(
                f,
                "UnpublishVolume({}, target={})",
                req.volume_id, req.target_path
            ),
            Self::Probe => f.write_str("Probe"),
            Self::GetPluginInfo => f.write_str("GetPluginInfo"),
            Self::GetPluginCapabilities => f.write_str("GetPluginCapabilities"),
            Self::GetNodeInfo => f.write_str("GetNodeInfo"),
            Self::VolumeCreated(v) => write!(f, "VolumeCreated({})", v.volume_id),
            Self::CapabilitiesValid(v) => write!(f, "CapabilitiesValid({v})"),
            Self::PublishContext(ctx) => write!(f, "PublishContext(count={})", ctx.len()),
            Self::PluginInfoResponse(info) => write!(f, "PluginInfo(name={})", info.name),
            Self::PluginCapabilitiesResponse(caps) => {
                write!(f, "PluginCapabilities(count={})", caps.len())
            }
            Self::NodeInfoResponse(info) => write!(f, "NodeInfo({})", info.node_id),
            Self::Ok => f.write_str("Ok"),
            Self::ProbeResult(ok) => write!(f, "ProbeResult({ok})"),
            Self::Error(e) => write!(f, "Error({e})"),
        }
    }
}

fn reply<T>(result: Result<T, CsiError>, wrap: impl FnOnce(T) -> CsiMessage) -> CsiMessage {
    result.map_or_else(CsiMessage::Error, wrap)
}

/// Run `request` against `handler` and wrap the outcome in the matching
/// response variant.
pub async fn dispatch<T>(handler: &T, request: CsiMessage) -> CsiMessage
where
    T: CsiIdentity + CsiController + CsiNode + ?Sized,
{
    debug!(%request, "CSI request received");
    let response = match request {
        // --- Identity -------------------------------------------------------
        CsiMessage::Probe => reply(handler.probe().await, CsiMessage::ProbeResult),
        CsiMessage::GetPluginInfo => reply(
            handler.get_plugin_info().await,
            CsiMessage::PluginInfoResponse,
        ),
        CsiMessage::GetPluginCapabilities => reply(
            handler.get_plugin_capabilities().await,
            CsiMessage::PluginCapabilitiesResponse,
        ),

        // --- Controller -----------------------------------------------------
        CsiMessage::CreateVolume(req) => {
            reply(handler.create_volume(req).await, CsiMessage::VolumeCreated)
        }
        CsiMessage::DeleteVolume(req) => reply(handler.delete_volume(req).await, |()| CsiMessage::Ok),
        CsiMessage::ValidateVolumeCapabilities(req) => reply(
            handler.validate_volume_capabilities(req).await,
            CsiMessage::CapabilitiesValid,
        ),
        CsiMessage::ControllerPublishVolume(req) => reply(
            handler.controller_publish_volume(req).await,
            CsiMessage::PublishContext,
        ),
        CsiMessage::ControllerUnpublishVolume(req) => reply(
            handler.controller_unpublish_volume(req).await,
            |()| CsiMessage::Ok,
        ),

        // --- Node -----------------------------------------------------------
        CsiMessage::StageVolume(req) => reply(handler.stage_volume(req).await, |()| CsiMessage::Ok),
        CsiMessage::UnstageVolume(req) => {
            reply(handler.unstage_volume(req).await, |()| CsiMessage::Ok)
        }
        CsiMessage::PublishVolume(req) => {
            reply(handler.publish_volume(req).await, |()| CsiMessage::Ok)
        }
        CsiMessage::UnpublishVolume(req) => {
            reply(handler.unpublish_volume(req).await, |()| CsiMessage::Ok)
        }
        CsiMessage::GetNodeInfo => reply(handler.get_info().await, CsiMessage::NodeInfoResponse),

        // --- Response variants never arrive as requests ---------------------
        other => {
            warn!(msg = %other, "unexpected message variant received as request");
            CsiMessage::Error(CsiError::InvalidArgument(format!(
                "unexpected message: {other}"
            )))
        }
    };
    if let CsiMessage::Error(e) = &response {
        warn!(error = %e, code = ?e.code(), "CSI request failed");
    }
    response
}
