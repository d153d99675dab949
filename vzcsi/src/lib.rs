//! # vzcsi - CSI driver for Virtuozzo Storage ploop volumes
//!
//! `vzcsi` provisions ploop disk images on a Virtuozzo Storage cluster
//! filesystem and attaches them on worker nodes.  It follows the RK8s
//! conventions: Tokio async runtime, `tracing` for observability,
//! `thiserror` for structured errors, and capability traits at every
//! boundary to an external tool or the kernel.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Data model: `Volume`, `VolumeId`, capabilities, requests, credentials. |
//! | [`error`] | [`CsiError`] enum covering all failure modes. |
//! | [`config`] | [`DriverConfig`]: working directory, tool names, defaults. |
//! | [`exec`] | [`CommandRunner`] capability for external tools. |
//! | [`mounter`] | [`Mounter`] capability: mount table, bind mounts, unmount. |
//! | [`backend`] | [`ExternalVolumeBackend`] capability and its ploop implementation. |
//! | [`descriptor`] | `DiskDescriptor.xml` reader. |
//! | [`rollback`] | Ordered step log with generic unwind. |
//! | [`cluster`] | [`ClusterMountManager`]: one cluster mount per node. |
//! | [`provisioner`] | [`VolumeProvisioner`]: idempotent create/delete of images. |
//! | [`tracker`] | [`MountStateTracker`]: node publish/unpublish state machine. |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery & health. |
//! | [`controller`] | [`CsiController`] trait: volume create/delete. |
//! | [`node`] | [`CsiNode`] trait: publish, unpublish. |
//! | [`driver`] | [`VzDriver`]: the three services over the components above. |
//! | [`message`] | [`CsiMessage`] envelope and [`dispatch`]. |

pub mod backend;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod exec;
mod fsutil;
pub mod identity;
pub mod message;
pub mod mounter;
pub mod node;
pub mod provisioner;
pub mod rollback;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::ExternalVolumeBackend;
pub use cluster::ClusterMountManager;
pub use config::DriverConfig;
pub use controller::CsiController;
pub use driver::VzDriver;
pub use error::CsiError;
pub use exec::CommandRunner;
pub use identity::CsiIdentity;
pub use message::{CsiMessage, dispatch};
pub use mounter::Mounter;
pub use node::CsiNode;
pub use provisioner::VolumeProvisioner;
pub use tracker::MountStateTracker;
pub use types::*;
