//! Client sessions to Horizon OS services.
//!
//! A [`Service`] is plain data: the session handle plus the size of the
//! server's pointer buffer, probed once when the session is wrapped. The
//! pointer buffer is where the kernel copies static (Type X/C) buffers, so
//! its size bounds what can travel that way.
//!
//! # References
//!
//! - libnx `sf/service.h`

use core::mem::size_of;

use nx_svc::{
    error::{LibnxError, ToRawResultCode},
    ipc::{CloseHandleError, Handle as SessionHandle, SendSyncError},
    result::ResultCode,
};

use crate::{
    cmif::{self, BuildError, ParseResponseError},
    hipc::MessageBuffer,
    transport::{self, Transport},
};

/// Control request ID of `QueryPointerBufferSize`.
pub const CTRL_QUERY_POINTER_BUFFER_SIZE: u32 = 3;

/// An open session to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    /// The client session handle.
    pub session: SessionHandle,
    /// Size of the server's pointer buffer, in bytes.
    pub pointer_buffer_size: u16,
}

impl Service {
    /// Wraps a session, probing its pointer buffer size.
    pub fn new<T: Transport + ?Sized>(
        transport: &T,
        session: SessionHandle,
    ) -> Result<Self, ControlError> {
        let pointer_buffer_size = query_pointer_buffer_size(transport, session)?;
        Ok(Self {
            session,
            pointer_buffer_size,
        })
    }

    /// Wraps a session whose pointer buffer size is already known.
    pub const fn from_parts(session: SessionHandle, pointer_buffer_size: u16) -> Self {
        Self {
            session,
            pointer_buffer_size,
        }
    }

    /// Tells the server the session is going away, then closes the handle.
    ///
    /// The handle is closed even if the close request could not be sent.
    pub fn close<T: Transport + ?Sized>(self, transport: &T) -> Result<(), CloseError> {
        let mut msg = MessageBuffer::new();
        let sent = cmif::make_close_request(&mut msg)
            .map_err(CloseError::Build)
            .and_then(|()| {
                transport
                    .send_sync_request(self.session, &mut msg)
                    .map_err(CloseError::SendRequest)
            });

        transport
            .close_handle(self.session.to_raw())
            .map_err(CloseError::CloseHandle)?;
        sent
    }
}

/// Asks the server how large its pointer buffer is (control request 3).
pub fn query_pointer_buffer_size<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
) -> Result<u16, ControlError> {
    let mut msg = MessageBuffer::new();
    let request = cmif::make_control_request(&mut msg, CTRL_QUERY_POINTER_BUFFER_SIZE, 0)
        .map_err(ControlError::Build)?;

    let reply =
        transport::dispatch(transport, session, request).map_err(ControlError::SendRequest)?;

    let resp =
        cmif::parse_response(reply, size_of::<u16>()).map_err(ControlError::ParseResponse)?;

    Ok(u16::from_le_bytes([resp.data[0], resp.data[1]]))
}

/// Error returned by control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// Failed to build the request.
    #[error("failed to build request")]
    Build(#[source] BuildError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] ParseResponseError),
}

impl ToRawResultCode for ControlError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
        }
    }
}

/// Error returned by [`Service::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CloseError {
    /// Failed to build the close request.
    #[error("failed to build request")]
    Build(#[source] BuildError),
    /// Failed to send the close request.
    #[error("failed to send request")]
    SendRequest(#[source] SendSyncError),
    /// Failed to close the session handle.
    #[error("failed to close handle")]
    CloseHandle(#[source] CloseHandleError),
}

impl ToRawResultCode for CloseError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(_) => LibnxError::BadInput.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::CloseHandle(err) => err.to_rc(),
        }
    }
}
