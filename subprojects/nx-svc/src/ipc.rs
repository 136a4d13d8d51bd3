//! IPC session handles and the failures of the kernel's blocking send.
//!
//! ## Horizon OS Terminology
//!
//! - **Session**: A bidirectional IPC channel between a client and server.
//! - **Client Session**: The handle held by the client side of an IPC session,
//!   used to send requests to the server.
//!
//! A failed `svcSendSyncRequest` is a transport failure. It is surfaced to the
//! caller exactly as the kernel reported it and never retried here: only the
//! caller knows whether the request is idempotent.

use crate::{
    error::{KernelError as KError, ToRawResultCode},
    result::{Error, ResultCode},
};

define_handle_type! {
    /// A handle to a client session kernel object.
    ///
    /// The handle is borrowed by everything that dispatches on it; whoever
    /// obtained it is responsible for closing it.
    pub struct Handle
}

/// Error returned by a synchronous IPC send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendSyncError {
    /// The calling thread is being terminated.
    #[error("Termination requested")]
    TerminationRequested,
    /// The kernel ran out of session request slots.
    #[error("Out of resource")]
    OutOfResource,
    /// The session handle does not name a client session.
    #[error("Invalid handle")]
    InvalidHandle,
    /// The server side of the session is gone.
    #[error("Session closed")]
    SessionClosed,
    /// Any other kernel status, kept verbatim.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

impl SendSyncError {
    /// Classifies a non-success kernel status.
    pub fn from_error(err: Error) -> Self {
        match KError::from_description(err.description()) {
            Some(KError::TerminationRequested) => Self::TerminationRequested,
            Some(KError::OutOfResource) => Self::OutOfResource,
            Some(KError::InvalidHandle) => Self::InvalidHandle,
            Some(KError::SessionClosed) => Self::SessionClosed,
            None => Self::Unknown(err),
        }
    }

    /// Converts a raw kernel status into `Ok(())` or the matching error.
    pub fn check(rc: ResultCode) -> Result<(), Self> {
        crate::result::from_raw(rc).map_err(Self::from_error)
    }
}

impl ToRawResultCode for SendSyncError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::TerminationRequested => KError::TerminationRequested.to_rc(),
            Self::OutOfResource => KError::OutOfResource.to_rc(),
            Self::InvalidHandle => KError::InvalidHandle.to_rc(),
            Self::SessionClosed => KError::SessionClosed.to_rc(),
            Self::Unknown(err) => err.to_raw(),
        }
    }
}

/// Error returned when closing a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseHandleError {
    /// The handle is not valid in the caller's handle table.
    #[error("Invalid handle")]
    InvalidHandle,
    /// Any other kernel status, kept verbatim.
    #[error("Unknown error: {0}")]
    Unknown(Error),
}

impl CloseHandleError {
    /// Converts a raw kernel status into `Ok(())` or the matching error.
    pub fn check(rc: ResultCode) -> Result<(), Self> {
        crate::result::from_raw(rc).map_err(|err| {
            match KError::from_description(err.description()) {
                Some(KError::InvalidHandle) => Self::InvalidHandle,
                _ => Self::Unknown(err),
            }
        })
    }
}

impl ToRawResultCode for CloseHandleError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::InvalidHandle => KError::InvalidHandle.to_rc(),
            Self::Unknown(err) => err.to_raw(),
        }
    }
}
