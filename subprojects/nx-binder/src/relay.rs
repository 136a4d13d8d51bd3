//! CMIF operations for IHOSBinderDriverRelay.
//!
//! Each function is one round trip on a relay session. They carry no state;
//! the [`Binder`](crate::Binder) session decides which to call and when.

use core::mem::size_of;

use nx_service_sm::{OpenServiceError, SmService};
use nx_sf::{
    cmif::{self, BufferPlacement, CommandBuilder, PreparedRequest},
    hipc::{BufferMode, MessageBuffer},
    service::Service,
    transport::{self, Transport},
};
use nx_svc::{
    error::{LibnxError, ToRawResultCode},
    ipc::{self, Handle as SessionHandle},
    raw::Handle as RawHandle,
    result::ResultCode,
};
use zerocopy::{
    Immutable, IntoBytes,
    little_endian::{I32, U32},
};

use crate::{
    proto::{
        AdjustRefcountIn, GetNativeHandleIn, RELAY_SERVICE_NAME, TransactParcelIn, relay_cmds,
    },
    types::{BinderObjectId, RefKind},
};

/// Target and arguments of a parcel transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactArgs {
    /// Binder object the transaction is addressed to.
    pub id: BinderObjectId,
    /// Interface method code.
    pub code: u32,
    /// Transaction flags (e.g. one-way).
    pub flags: u32,
}

impl TransactArgs {
    fn to_wire(self) -> TransactParcelIn {
        TransactParcelIn {
            session_id: I32::new(self.id.to_raw()),
            code: U32::new(self.code),
            flags: U32::new(self.flags),
        }
    }
}

/// Opens a session to the binder driver relay through SM.
pub fn open<T: Transport + ?Sized>(
    transport: &T,
    sm: &SmService,
) -> Result<Service, OpenServiceError> {
    sm.get_service(transport, RELAY_SERVICE_NAME)
}

/// Performs a parcel transaction over mapped buffers (`TransactParcel`).
///
/// Returns the number of reply bytes available in `reply`. Mapped buffers
/// carry no length back, so this is always `reply.len()`.
pub fn transact_parcel<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    args: TransactArgs,
    parcel: &[u8],
    reply: &mut [u8],
) -> Result<usize, TransactParcelError> {
    let reply_len = reply.len();

    let mut msg = MessageBuffer::new();
    let mut builder = CommandBuilder::begin();
    builder
        .add_send_buffer(parcel, BufferMode::Normal)
        .map_err(TransactParcelError::Build)?;
    builder
        .add_recv_buffer(reply, BufferMode::Normal)
        .map_err(TransactParcelError::Build)?;

    let mut request = cmif::make_request(
        builder,
        &mut msg,
        relay_cmds::TRANSACT_PARCEL,
        size_of::<TransactParcelIn>(),
    )
    .map_err(TransactParcelError::Build)?;
    write_args(&mut request, &args.to_wire());

    let resp = transport::dispatch(transport, session, request)
        .map_err(TransactParcelError::SendRequest)?;
    cmif::parse_response(resp, 0).map_err(TransactParcelError::ParseResponse)?;

    Ok(reply_len)
}

/// Performs a parcel transaction over auto-select buffers
/// (`TransactParcelAuto`, 3.0.0+).
///
/// Both buffers travel as `placement` says. Returns the number of reply bytes
/// the server wrote into `reply`.
pub fn transact_parcel_auto<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    args: TransactArgs,
    parcel: &[u8],
    reply: &mut [u8],
    placement: BufferPlacement,
) -> Result<usize, TransactParcelError> {
    let reply_len = reply.len();

    let mut msg = MessageBuffer::new();
    let mut builder = CommandBuilder::begin();
    builder
        .add_in_auto_buffer(parcel, BufferMode::Normal, placement)
        .map_err(TransactParcelError::Build)?;
    builder
        .add_out_auto_buffer(reply, BufferMode::Normal, placement)
        .map_err(TransactParcelError::Build)?;

    let mut request = cmif::make_request(
        builder,
        &mut msg,
        relay_cmds::TRANSACT_PARCEL_AUTO,
        size_of::<TransactParcelIn>(),
    )
    .map_err(TransactParcelError::Build)?;
    write_args(&mut request, &args.to_wire());

    let resp = transport::dispatch(transport, session, request)
        .map_err(TransactParcelError::SendRequest)?;
    let resp = cmif::parse_response(resp, 0).map_err(TransactParcelError::ParseResponse)?;

    Ok(resp.out_auto_len(placement, reply_len))
}

/// Adds `addval` to the `kind` reference count of a binder object.
pub fn adjust_refcount<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    id: BinderObjectId,
    addval: i32,
    kind: RefKind,
) -> Result<(), AdjustRefcountError> {
    let mut msg = MessageBuffer::new();
    let mut request = cmif::make_request(
        CommandBuilder::begin(),
        &mut msg,
        relay_cmds::ADJUST_REFCOUNT,
        size_of::<AdjustRefcountIn>(),
    )
    .map_err(AdjustRefcountError::Build)?;
    write_args(
        &mut request,
        &AdjustRefcountIn {
            session_id: I32::new(id.to_raw()),
            addval: I32::new(addval),
            kind: I32::new(kind.to_raw()),
        },
    );

    let resp = transport::dispatch(transport, session, request)
        .map_err(AdjustRefcountError::SendRequest)?;
    cmif::parse_response(resp, 0).map_err(AdjustRefcountError::ParseResponse)?;

    Ok(())
}

/// Gets a native handle (an event) of a binder object.
///
/// The handle is returned as the server sent it; a zero handle is not
/// rejected here.
pub fn get_native_handle<T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    id: BinderObjectId,
    selector: u32,
) -> Result<RawHandle, GetNativeHandleError> {
    let mut msg = MessageBuffer::new();
    let mut request = cmif::make_request(
        CommandBuilder::begin(),
        &mut msg,
        relay_cmds::GET_NATIVE_HANDLE,
        size_of::<GetNativeHandleIn>(),
    )
    .map_err(GetNativeHandleError::Build)?;
    write_args(
        &mut request,
        &GetNativeHandleIn {
            session_id: I32::new(id.to_raw()),
            selector: U32::new(selector),
        },
    );

    let resp = transport::dispatch(transport, session, request)
        .map_err(GetNativeHandleError::SendRequest)?;
    let resp = cmif::parse_response(resp, 0).map_err(GetNativeHandleError::ParseResponse)?;

    resp.copy_handles
        .first()
        .copied()
        .ok_or(GetNativeHandleError::MissingHandle)
}

/// Copies the command arguments behind the CMIF header.
fn write_args<A: IntoBytes + Immutable>(request: &mut PreparedRequest<'_>, args: &A) {
    let bytes = args.as_bytes();
    let start = size_of::<cmif::InHeader>();
    request.payload_mut()[start..start + bytes.len()].copy_from_slice(bytes);
}

/// Error returned by [`transact_parcel`] and [`transact_parcel_auto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransactParcelError {
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

impl ToRawResultCode for TransactParcelError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
        }
    }
}

/// Error returned by [`adjust_refcount`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdjustRefcountError {
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

impl ToRawResultCode for AdjustRefcountError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
        }
    }
}

/// Error returned by [`get_native_handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetNativeHandleError {
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

impl ToRawResultCode for GetNativeHandleError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::Build(err) => err.to_rc(),
            Self::SendRequest(err) => err.to_rc(),
            Self::ParseResponse(err) => err.to_rc(),
            Self::MissingHandle => LibnxError::InvalidCmifOutHeader.to_rc(),
        }
    }
}
