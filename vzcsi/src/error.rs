//! CSI error types.
//!
//! All errors in the `vzcsi` crate are represented by the [`CsiError`] enum,
//! which derives [`thiserror::Error`] for ergonomic error handling and also
//! implements [`Serialize`]/[`Deserialize`] so errors can travel inside a
//! [`CsiMessage`](crate::message::CsiMessage).  [`CsiError::code`] folds the
//! variants onto the status codes of the CSI protocol.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid or incomplete request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A volume with the same name exists but is smaller than requested.
    #[error("volume {name} already exists with capacity {existing_bytes} < {requested_bytes}")]
    VolumeConflict {
        name: String,
        existing_bytes: u64,
        requested_bytes: u64,
    },

    /// The backing image is already attached somewhere on this node.
    #[error("image {0} is already mounted")]
    AlreadyMounted(String),

    /// The target of the operation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Cluster credentials are missing or were rejected.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An external command could not be started or exited non-zero.
    #[error("command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// The volume backend (ploop) returned an error.
    #[error("backend error: {0}")]
    BackendError(String),

    /// A filesystem operation on driver-managed state failed.
    #[error("I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    /// On-disk state left behind by an incomplete publish/unpublish.
    #[error("corrupt mount state at {path}: {reason}")]
    CorruptState { path: String, reason: String },

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Protocol-level status codes a [`CsiError`] maps onto.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    AlreadyExists,
    FailedPrecondition,
    NotFound,
    Unauthenticated,
    Internal,
}

impl CsiError {
    /// Create a [`CsiError::BackendError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn backend<E: std::fmt::Display>(e: E) -> Self {
        Self::BackendError(e.to_string())
    }

    /// Create a [`CsiError::Io`] for an operation on `path`.
    pub fn io<E: std::fmt::Display>(path: &Path, e: E) -> Self {
        Self::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// Create a [`CsiError::CorruptState`] for `path`.
    pub fn corrupt<E: std::fmt::Display>(path: &Path, e: E) -> Self {
        Self::CorruptState {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::VolumeConflict { .. } => ErrorCode::AlreadyExists,
            Self::AlreadyMounted(_) => ErrorCode::FailedPrecondition,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::CommandFailed { .. }
            | Self::BackendError(_)
            | Self::Io { .. }
            | Self::CorruptState { .. }
            | Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
