//! CMIF protocol operations for Service Manager.

use core::mem::size_of;

use nx_sf::{
    ServiceName,
    cmif::{self, CommandBuilder},
    hipc::MessageBuffer,
    transport::{self, Transport},
};
use nx_svc::{
    error::ToRawResultCode,
    ipc::{self, Handle as SessionHandle},
    result::ResultCode,
};

use crate::proto;

/// Registers the calling process with SM.
///
/// The kernel stamps the caller's PID into the request; the `u64` argument
/// is reserved and sent as zero.
pub fn register_client<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
) -> Result<(), RegisterClientError> {
    let mut msg = MessageBuffer::new();
    let mut builder = CommandBuilder::begin();
    builder.request_pid();

    let mut request = cmif::make_request(
        builder,
        &mut msg,
        proto::REGISTER_CLIENT,
        size_of::<u64>(),
    )
    .map_err(RegisterClientError::Build)?;
    args(request.payload_mut()).copy_from_slice(&0u64.to_le_bytes());

    let reply = transport::dispatch(transport, session, request)
        .map_err(RegisterClientError::SendRequest)?;
    cmif::parse_response(reply, 0).map_err(RegisterClientError::ParseResponse)?;

    Ok(())
}

/// Error returned by [`register_client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegisterClientError {
    /// Failed to build the request.
    #[error("failed to build request")]
    Build(#[source] cmif::BuildError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] ipc::SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] cmif::ParseResponseError),
}

impl ToRawResultCode for RegisterClientError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
        }
    }
}

/// Gets a raw service handle by name.
pub fn get_service_handle<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    name: ServiceName,
) -> Result<SessionHandle, GetServiceError> {
    let mut msg = MessageBuffer::new();
    let mut request = cmif::make_request(
        CommandBuilder::begin(),
        &mut msg,
        proto::GET_SERVICE_HANDLE,
        size_of::<u64>(),
    )
    .map_err(GetServiceError::Build)?;
    args(request.payload_mut()).copy_from_slice(&name.to_u64().to_le_bytes());

    let reply =
        transport::dispatch(transport, session, request).map_err(GetServiceError::SendRequest)?;
    let resp = cmif::parse_response(reply, 0).map_err(GetServiceError::ParseResponse)?;

    let Some(&raw) = resp.move_handles.first() else {
        return Err(GetServiceError::MissingHandle);
    };

    // SAFETY: SM returns a client session in the first move handle.
    Ok(unsafe { SessionHandle::from_raw(raw) })
}

/// Error returned by [`get_service_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetServiceError {
    /// Failed to build the request.
    #[error("failed to build request")]
    Build(#[source] cmif::BuildError),
    /// Failed to send the IPC request.
    #[error("failed to send request")]
    SendRequest(#[source] ipc::SendSyncError),
    /// Failed to parse the CMIF response.
    #[error("failed to parse response")]
    ParseResponse(#[source] cmif::ParseResponseError),
    /// Response did not contain the expected handle.
    #[error("missing handle in response")]
    MissingHandle,
}

impl ToRawResultCode for GetServiceError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
            Self::MissingHandle => {
                nx_svc::error::LibnxError::InvalidCmifOutHeader.to_rc()
            }
        }
    }
}

/// Skips the CMIF header at the start of a payload slot.
fn args(payload: &mut [u8]) -> &mut [u8] {
    &mut payload[size_of::<cmif::InHeader>()..]
}
