//! Binder sessions on top of the relay.
//!
//! A [`Binder`] addresses one remote object (e.g. an `IGraphicBufferProducer`)
//! through a relay [`Service`] shared with other binders. The relay session is
//! borrowed: the binder never closes it. What the binder owns is a strong and
//! a weak reference on the remote object plus its native handle, acquired by
//! [`Binder::init`] and released by [`Binder::exit`].
//!
//! ```text
//! Created --init--> Initializing --ok--> Initialized --exit--> Closed
//!                        |
//!                        +--err (everything unwound)--> Created
//! ```

use log::{debug, warn};
use nx_sf::{
    cmif::BufferPlacement,
    service::{self, ControlError, Service},
    transport::Transport,
};
use nx_svc::{
    error::{LibnxError, ToRawResultCode},
    ipc::CloseHandleError,
    raw::{Handle as RawHandle, INVALID_HANDLE},
    result::ResultCode,
};

use crate::{
    config::BinderConfig,
    parcel::{PARCEL_STAGING_SIZE, Parcel, ParcelError},
    relay::{self, AdjustRefcountError, GetNativeHandleError, TransactArgs, TransactParcelError},
    types::{BinderObjectId, RefKind},
};

/// Lifecycle state of a [`Binder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinderState {
    /// Created, nothing acquired.
    Created,
    /// `init` in progress.
    Initializing,
    /// References and native handle held; transactions allowed.
    Initialized,
    /// Released by `exit`. Terminal.
    Closed,
}

/// Which transact command a session uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactMode {
    /// `TransactParcel` over mapped buffers.
    Legacy,
    /// `TransactParcelAuto`, static or mapped per call.
    Combined,
}

/// Binder session for one remote object.
#[derive(Debug)]
pub struct Binder {
    relay: Service,
    id: BinderObjectId,
    state: BinderState,
    native_handle: Option<RawHandle>,
    pointer_buffer_size: u16,
    mode: TransactMode,
    static_threshold: Option<usize>,
}

impl Binder {
    /// Creates a binder for object `id` on `relay`. No I/O is performed.
    pub const fn create(relay: Service, id: BinderObjectId) -> Self {
        Self {
            relay,
            id,
            state: BinderState::Created,
            native_handle: None,
            pointer_buffer_size: 0,
            mode: TransactMode::Legacy,
            static_threshold: None,
        }
    }

    /// Returns the binder object ID.
    #[inline]
    pub fn id(&self) -> BinderObjectId {
        self.id
    }

    /// Returns the relay session.
    #[inline]
    pub fn relay(&self) -> &Service {
        &self.relay
    }

    /// Returns the lifecycle state.
    #[inline]
    pub fn state(&self) -> BinderState {
        self.state
    }

    /// Returns the native handle while initialized.
    #[inline]
    pub fn native_handle(&self) -> Option<RawHandle> {
        self.native_handle
    }

    /// Returns the pointer buffer size learned by `init`.
    #[inline]
    pub fn pointer_buffer_size(&self) -> u16 {
        self.pointer_buffer_size
    }

    /// Returns the transact mode chosen by `init`.
    #[inline]
    pub fn mode(&self) -> TransactMode {
        self.mode
    }

    /// Acquires a strong and a weak reference, fetches the native handle
    /// selected by `selector` and probes the pointer buffer size.
    ///
    /// On failure every acquisition made so far is undone and the binder is
    /// back in [`BinderState::Created`].
    pub fn init<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        selector: u32,
        config: &BinderConfig,
    ) -> Result<(), InitError> {
        match self.state {
            BinderState::Created => {}
            BinderState::Closed => return Err(InitError::Closed),
            BinderState::Initializing | BinderState::Initialized => {
                return Err(InitError::AlreadyInitialized);
            }
        }

        self.state = BinderState::Initializing;
        let (native_handle, pointer_buffer_size) = match self.acquire(transport, selector) {
            Ok(acquired) => acquired,
            Err(err) => {
                debug!("binder {}: init failed: {err}", self.id.to_raw());
                self.state = BinderState::Created;
                return Err(err);
            }
        };

        self.native_handle = Some(native_handle);
        self.pointer_buffer_size = pointer_buffer_size;
        self.static_threshold = config.static_threshold;
        self.mode = if config.supports_combined() {
            TransactMode::Combined
        } else {
            TransactMode::Legacy
        };
        self.state = BinderState::Initialized;

        debug!(
            "binder {}: initialized, mode {:?}, pointer buffer {:#x}",
            self.id.to_raw(),
            self.mode,
            pointer_buffer_size
        );
        Ok(())
    }

    fn acquire<T: Transport + ?Sized>(
        &self,
        transport: &T,
        selector: u32,
    ) -> Result<(RawHandle, u16), InitError> {
        self.adjust(transport, 1, RefKind::Strong)
            .map_err(InitError::IncreaseStrongRef)?;

        if let Err(err) = self.adjust(transport, 1, RefKind::Weak) {
            self.release(transport, RefKind::Strong);
            return Err(InitError::IncreaseWeakRef(err));
        }

        let native_handle = match relay::get_native_handle(
            transport,
            self.relay.session,
            self.id,
            selector,
        ) {
            Ok(INVALID_HANDLE) => Err(InitError::InvalidNativeHandle),
            Ok(handle) => Ok(handle),
            Err(err) => Err(InitError::GetNativeHandle(err)),
        };
        let native_handle = match native_handle {
            Ok(handle) => handle,
            Err(err) => {
                self.release_refs(transport);
                return Err(err);
            }
        };

        match service::query_pointer_buffer_size(transport, self.relay.session) {
            Ok(size) => Ok((native_handle, size)),
            Err(err) => {
                if let Err(close_err) = transport.close_handle(native_handle) {
                    warn!(
                        "binder {}: failed to close native handle: {close_err}",
                        self.id.to_raw()
                    );
                }
                self.release_refs(transport);
                Err(InitError::QueryPointerBufferSize(err))
            }
        }
    }

    /// Sends `parcel` as transaction `code` and reads the answer into `reply`.
    ///
    /// Under combined mode the parcels travel in static buffers when the
    /// request plus the reply capacity fit the static threshold, and in
    /// mapped buffers otherwise. Both carry the same bytes.
    pub fn transact<T: Transport + ?Sized>(
        &self,
        transport: &T,
        code: u32,
        parcel: &Parcel,
        reply: &mut Parcel,
        flags: u32,
    ) -> Result<(), TransactError> {
        if self.state != BinderState::Initialized {
            return Err(TransactError::NotInitialized);
        }

        let mut request = [0u8; PARCEL_STAGING_SIZE];
        let mut response = [0u8; PARCEL_STAGING_SIZE];
        let request_len = parcel
            .serialize_into(&mut request)
            .map_err(TransactError::InvalidRequest)?;

        let args = TransactArgs {
            id: self.id,
            code,
            flags,
        };
        let received = match self.mode {
            TransactMode::Legacy => relay::transact_parcel(
                transport,
                self.relay.session,
                args,
                &request[..request_len],
                &mut response,
            )?,
            TransactMode::Combined => {
                let placement =
                    BufferPlacement::select(request_len + response.len(), self.static_threshold());
                relay::transact_parcel_auto(
                    transport,
                    self.relay.session,
                    args,
                    &request[..request_len],
                    &mut response,
                    placement,
                )?
            }
        };

        if let Err(err) = reply.deserialize_from(&response[..received]) {
            warn!(
                "binder {}: rejected reply to code {code}: {err}",
                self.id.to_raw()
            );
            return Err(TransactError::InvalidReply(err));
        }
        Ok(())
    }

    /// Releases the weak and strong references and closes the native handle.
    ///
    /// Does nothing unless the binder is initialized. Every step is attempted
    /// and the binder ends up [`BinderState::Closed`] either way; the first
    /// failure is returned.
    pub fn exit<T: Transport + ?Sized>(&mut self, transport: &T) -> Result<(), ExitError> {
        if self.state != BinderState::Initialized {
            return Ok(());
        }

        let weak = self
            .adjust(transport, -1, RefKind::Weak)
            .map_err(ExitError::DecreaseWeakRef);
        let strong = self
            .adjust(transport, -1, RefKind::Strong)
            .map_err(ExitError::DecreaseStrongRef);
        let close = match self.native_handle.take() {
            Some(handle) => transport
                .close_handle(handle)
                .map_err(ExitError::CloseNativeHandle),
            None => Ok(()),
        };

        self.state = BinderState::Closed;
        debug!("binder {}: closed", self.id.to_raw());

        weak.and(strong).and(close)
    }

    fn static_threshold(&self) -> usize {
        self.static_threshold
            .unwrap_or(self.pointer_buffer_size as usize)
    }

    fn adjust<T: Transport + ?Sized>(
        &self,
        transport: &T,
        addval: i32,
        kind: RefKind,
    ) -> Result<(), AdjustRefcountError> {
        relay::adjust_refcount(transport, self.relay.session, self.id, addval, kind)
    }

    fn release<T: Transport + ?Sized>(&self, transport: &T, kind: RefKind) {
        if let Err(err) = self.adjust(transport, -1, kind) {
            warn!(
                "binder {}: failed to release {kind:?} reference: {err}",
                self.id.to_raw()
            );
        }
    }

    fn release_refs<T: Transport + ?Sized>(&self, transport: &T) {
        self.release(transport, RefKind::Weak);
        self.release(transport, RefKind::Strong);
    }
}

/// Error returned by [`Binder::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The binder is already initialized.
    #[error("binder already initialized")]
    AlreadyInitialized,
    /// The binder has been closed.
    #[error("binder closed")]
    Closed,
    /// Failed to acquire the strong reference.
    #[error("failed to increase strong reference")]
    IncreaseStrongRef(#[source] AdjustRefcountError),
    /// Failed to acquire the weak reference.
    #[error("failed to increase weak reference")]
    IncreaseWeakRef(#[source] AdjustRefcountError),
    /// Failed to get the native handle.
    #[error("failed to get native handle")]
    GetNativeHandle(#[source] GetNativeHandleError),
    /// The relay returned a zero native handle.
    #[error("invalid native handle")]
    InvalidNativeHandle,
    /// Failed to query the pointer buffer size.
    #[error("failed to query pointer buffer size")]
    QueryPointerBufferSize(#[source] ControlError),
}

impl ToRawResultCode for InitError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::AlreadyInitialized => LibnxError::AlreadyInitialized.to_rc(),
            Self::Closed | Self::InvalidNativeHandle => LibnxError::BadInput.to_rc(),
            Self::IncreaseStrongRef(err) | Self::IncreaseWeakRef(err) => err.to_rc(),
            Self::GetNativeHandle(err) => err.to_rc(),
            Self::QueryPointerBufferSize(err) => err.to_rc(),
        }
    }
}

/// Error returned by [`Binder::transact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransactError {
    /// The binder is not initialized.
    #[error("binder not initialized")]
    NotInitialized,
    /// The request parcel could not be serialized.
    #[error("invalid request parcel")]
    InvalidRequest(#[source] ParcelError),
    /// The relay command failed.
    #[error("transaction failed")]
    Transact(#[from] TransactParcelError),
    /// The reply parcel was rejected.
    #[error("invalid reply parcel")]
    InvalidReply(#[source] ParcelError),
}

impl TransactError {
    /// Whether the failure indicates a framing or version mismatch rather
    /// than an ordinary error.
    pub fn is_protocol_violation(&self) -> bool {
        match self {
            Self::InvalidReply(err) => err.is_protocol_violation(),
            Self::Transact(TransactParcelError::ParseResponse(err)) => err.is_protocol_violation(),
            _ => false,
        }
    }
}

impl ToRawResultCode for TransactError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::NotInitialized => LibnxError::NotInitialized.to_rc(),
            Self::InvalidRequest(err) | Self::InvalidReply(err) => err.to_rc(),
            Self::Transact(err) => err.to_rc(),
        }
    }
}

/// Error returned by [`Binder::exit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExitError {
    /// Failed to release the weak reference.
    #[error("failed to decrease weak reference")]
    DecreaseWeakRef(#[source] AdjustRefcountError),
    /// Failed to release the strong reference.
    #[error("failed to decrease strong reference")]
    DecreaseStrongRef(#[source] AdjustRefcountError),
    /// Failed to close the native handle.
    #[error("failed to close native handle")]
    CloseNativeHandle(#[source] CloseHandleError),
}

impl ToRawResultCode for ExitError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::DecreaseWeakRef(err) | Self::DecreaseStrongRef(err) => err.to_rc(),
            Self::CloseNativeHandle(err) => err.to_rc(),
        }
    }
}

/// Android `status_t` values found in reply parcels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BinderError {
    /// Permission denied.
    #[error("permission denied")]
    PermissionDenied,
    /// Name not found.
    #[error("name not found")]
    NameNotFound,
    /// Would block.
    #[error("would block")]
    WouldBlock,
    /// No memory.
    #[error("no memory")]
    NoMemory,
    /// Already exists.
    #[error("already exists")]
    AlreadyExists,
    /// Not initialized.
    #[error("not initialized")]
    NoInit,
    /// Bad value.
    #[error("bad value")]
    BadValue,
    /// Dead object.
    #[error("dead object")]
    DeadObject,
    /// Invalid operation.
    #[error("invalid operation")]
    InvalidOperation,
    /// Not enough data.
    #[error("not enough data")]
    NotEnoughData,
    /// Unknown transaction.
    #[error("unknown transaction")]
    UnknownTransaction,
    /// Bad index.
    #[error("bad index")]
    BadIndex,
    /// Timed out.
    #[error("timed out")]
    TimedOut,
    /// FDs not allowed.
    #[error("FDs not allowed")]
    FdsNotAllowed,
    /// Failed transaction.
    #[error("failed transaction")]
    FailedTransaction,
    /// Bad type.
    #[error("bad type")]
    BadType,
    /// Any other negative status.
    #[error("unknown binder error: {0}")]
    Unknown(i32),
}

impl BinderError {
    /// Decodes a status word. Non-negative values are success.
    pub fn from_code(code: i32) -> Result<(), Self> {
        if code >= 0 {
            return Ok(());
        }

        Err(match code {
            -1 => Self::PermissionDenied,
            -2 => Self::NameNotFound,
            -11 => Self::WouldBlock,
            -12 => Self::NoMemory,
            -17 => Self::AlreadyExists,
            -19 => Self::NoInit,
            -22 => Self::BadValue,
            -32 => Self::DeadObject,
            -38 => Self::InvalidOperation,
            -61 => Self::NotEnoughData,
            -74 => Self::UnknownTransaction,
            -75 => Self::BadIndex,
            -110 => Self::TimedOut,
            // Binder specific codes count up from INT32_MIN.
            c if c == i32::MIN + 1 => Self::BadType,
            c if c == i32::MIN + 2 => Self::FailedTransaction,
            c if c == i32::MIN + 7 => Self::FdsNotAllowed,
            _ => Self::Unknown(code),
        })
    }

    /// Reads a status word from `reply` and decodes it.
    pub fn read_status(reply: &mut Parcel) -> Result<Result<(), Self>, ParcelError> {
        reply.read_i32().map(Self::from_code)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use nx_sf::{
        cmif::{self, CommandType, ReplySpec},
        hipc::MessageBuffer,
        mock::{self, MockTransport},
    };
    use nx_svc::{
        ipc::{Handle as SessionHandle, SendSyncError},
        version::HosVersion,
    };
    use zerocopy::{FromBytes, IntoBytes, little_endian::U32};

    use super::*;
    use crate::{
        parcel::ParcelHeader,
        proto::{AdjustRefcountIn, TransactParcelIn, relay_cmds},
    };

    const NATIVE_HANDLE: RawHandle = 0x55;
    const FAILURE: ResultCode = 0x1_2A0B;

    /// What the fake relay does, and what it saw.
    #[derive(Default)]
    struct Relay {
        strong: i32,
        weak: i32,
        commands: Vec<u32>,
        /// `(addval, kind)` of every reference count change applied.
        adjustments: Vec<(i32, i32)>,
        native_handle: RawHandle,
        fail_weak_increment: bool,
        fail_probe: bool,
        malformed_reply: bool,
        /// `true` for each transaction whose request came in a static buffer.
        static_carriage: Vec<bool>,
    }

    impl Relay {
        fn new() -> RefCell<Self> {
            RefCell::new(Self {
                native_handle: NATIVE_HANDLE,
                ..Default::default()
            })
        }
    }

    fn serve(
        relay: &RefCell<Relay>,
        _: SessionHandle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        let mut relay = relay.borrow_mut();
        let request = cmif::parse_request(msg).unwrap();
        let command = request.command_id.unwrap();
        relay.commands.push(command);

        if request.command_type == Some(CommandType::Control) {
            let size = 0x500u16.to_le_bytes();
            let reply = if relay.fail_probe {
                ReplySpec {
                    result: FAILURE,
                    ..Default::default()
                }
            } else {
                ReplySpec {
                    data: &size,
                    ..Default::default()
                }
            };
            cmif::make_response(msg, &reply).unwrap();
            return Ok(());
        }

        match command {
            relay_cmds::ADJUST_REFCOUNT => {
                let (args, _) = AdjustRefcountIn::read_from_prefix(request.args).unwrap();
                let (addval, kind) = (args.addval.get(), args.kind.get());
                if relay.fail_weak_increment && kind == RefKind::Weak.to_raw() && addval > 0 {
                    cmif::make_response(
                        msg,
                        &ReplySpec {
                            result: FAILURE,
                            ..Default::default()
                        },
                    )
                    .unwrap();
                    return Ok(());
                }
                relay.adjustments.push((addval, kind));
                if kind == RefKind::Strong.to_raw() {
                    relay.strong += addval;
                } else {
                    relay.weak += addval;
                }
                cmif::make_response(msg, &ReplySpec::default()).unwrap();
            }
            relay_cmds::GET_NATIVE_HANDLE => {
                let handle = relay.native_handle;
                cmif::make_response(
                    msg,
                    &ReplySpec {
                        copy_handles: &[handle],
                        ..Default::default()
                    },
                )
                .unwrap();
            }
            relay_cmds::TRANSACT_PARCEL | relay_cmds::TRANSACT_PARCEL_AUTO => {
                let (args, _) = TransactParcelIn::read_from_prefix(request.args).unwrap();
                let send_static = request.hipc.send_statics().next().filter(|d| d.size() > 0);
                let recv_entry = request.hipc.recv_list().next().filter(|e| e.size() > 0);

                // SAFETY: descriptors point at the client's live staging
                // buffers on this thread's stack.
                let input = match send_static {
                    Some(desc) => unsafe {
                        mock::client_bytes(mock::stack_address(desc.address()), desc.size() as usize)
                    },
                    None => {
                        let desc = request.hipc.send_buffers().next().unwrap();
                        unsafe { mock::client_bytes(desc.address(), desc.size()) }
                    }
                };
                let output = match recv_entry {
                    Some(entry) => unsafe {
                        mock::client_bytes_mut(entry.address(), entry.size() as usize)
                    },
                    None => {
                        let desc = request.hipc.recv_buffers().next().unwrap();
                        unsafe { mock::client_bytes_mut(desc.address(), desc.size()) }
                    }
                };
                relay.static_carriage.push(send_static.is_some());

                let written = if relay.malformed_reply {
                    let header = ParcelHeader {
                        data_size: U32::new(0x500),
                        data_offset: U32::new(0x10),
                        objects_size: U32::new(0),
                        objects_offset: U32::new(0x510),
                    };
                    output[..16].copy_from_slice(header.as_bytes());
                    output[16..].fill(0xEE);
                    output.len()
                } else {
                    let mut parcel = Parcel::new();
                    parcel.deserialize_from(input).unwrap();
                    let token = parcel.read_interface_token::<64>().unwrap();
                    assert_eq!(token.as_str(), "android.gui.IGraphicBufferProducer");
                    let value = parcel.read_i32().unwrap();

                    let mut answer = Parcel::new();
                    answer.write_u32(args.code.get()).unwrap();
                    answer.write_i32(value * 2).unwrap();
                    answer.write_i32(0).unwrap();
                    answer.serialize_into(output).unwrap()
                };

                let statics = [(0u64, written)];
                cmif::make_response(
                    msg,
                    &ReplySpec {
                        send_statics: if recv_entry.is_some() { &statics } else { &[] },
                        ..Default::default()
                    },
                )
                .unwrap();
            }
            other => panic!("unexpected relay command {other}"),
        }
        Ok(())
    }

    fn relay_service() -> Service {
        // SAFETY: test-only value, only ever handed to the mock.
        Service::from_parts(unsafe { SessionHandle::from_raw(0x40) }, 0x500)
    }

    fn binder() -> Binder {
        Binder::create(relay_service(), BinderObjectId::new(2))
    }

    fn request_parcel(value: i32) -> Parcel {
        let mut parcel = Parcel::new();
        parcel
            .write_interface_token("android.gui.IGraphicBufferProducer")
            .unwrap();
        parcel.write_i32(value).unwrap();
        parcel
    }

    #[test]
    fn init_then_exit_leaves_refcounts_balanced() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();

        binder.init(&transport, 0x0F, &BinderConfig::default()).unwrap();
        assert_eq!(binder.state(), BinderState::Initialized);
        assert_eq!(binder.native_handle(), Some(NATIVE_HANDLE));
        assert_eq!(binder.pointer_buffer_size(), 0x500);
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (1, 1));

        binder.exit(&transport).unwrap();
        assert_eq!(binder.state(), BinderState::Closed);
        assert_eq!(binder.native_handle(), None);
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (0, 0));
        assert_eq!(transport.closed_handles().as_slice(), &[NATIVE_HANDLE]);
    }

    #[test]
    fn init_acquires_strong_before_weak_and_exit_releases_weak_first() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder.init(&transport, 0, &BinderConfig::default()).unwrap();
        binder.exit(&transport).unwrap();

        let (weak, strong) = (RefKind::Weak.to_raw(), RefKind::Strong.to_raw());
        assert_eq!(
            relay.borrow().adjustments,
            [(1, strong), (1, weak), (-1, weak), (-1, strong)]
        );
        assert_eq!(
            relay.borrow().commands,
            [
                relay_cmds::ADJUST_REFCOUNT,
                relay_cmds::ADJUST_REFCOUNT,
                relay_cmds::GET_NATIVE_HANDLE,
                service::CTRL_QUERY_POINTER_BUFFER_SIZE,
                relay_cmds::ADJUST_REFCOUNT,
                relay_cmds::ADJUST_REFCOUNT,
            ]
        );
    }

    #[test]
    fn zero_native_handle_unwinds_and_blocks_transactions() {
        let relay = Relay::new();
        relay.borrow_mut().native_handle = INVALID_HANDLE;
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();

        let err = binder
            .init(&transport, 0, &BinderConfig::default())
            .unwrap_err();
        assert_eq!(err, InitError::InvalidNativeHandle);
        assert_eq!(err.to_rc(), LibnxError::BadInput.to_rc());
        assert_eq!(binder.state(), BinderState::Created);
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (0, 0));
        assert!(transport.closed_handles().is_empty());

        let calls = transport.calls();
        let mut reply = Parcel::new();
        let err = binder
            .transact(&transport, 1, &request_parcel(1), &mut reply, 0)
            .unwrap_err();
        assert_eq!(err, TransactError::NotInitialized);
        assert_eq!(transport.calls(), calls);
        assert!(relay.borrow().static_carriage.is_empty());
    }

    #[test]
    fn weak_failure_undoes_strong() {
        let relay = Relay::new();
        relay.borrow_mut().fail_weak_increment = true;
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();

        let err = binder
            .init(&transport, 0, &BinderConfig::default())
            .unwrap_err();
        assert!(matches!(err, InitError::IncreaseWeakRef(_)));
        assert_eq!(err.to_rc(), FAILURE);
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (0, 0));
        assert_eq!(binder.state(), BinderState::Created);
    }

    #[test]
    fn probe_failure_closes_native_handle() {
        let relay = Relay::new();
        relay.borrow_mut().fail_probe = true;
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();

        let err = binder
            .init(&transport, 0, &BinderConfig::default())
            .unwrap_err();
        assert!(matches!(err, InitError::QueryPointerBufferSize(_)));
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (0, 0));
        assert_eq!(transport.closed_handles().as_slice(), &[NATIVE_HANDLE]);
        assert_eq!(binder.native_handle(), None);
    }

    #[test]
    fn strong_failure_acquires_nothing() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        transport.fail_next(SendSyncError::SessionClosed);
        let mut binder = binder();

        let err = binder
            .init(&transport, 0, &BinderConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            InitError::IncreaseStrongRef(AdjustRefcountError::SendRequest(
                SendSyncError::SessionClosed
            ))
        );
        assert_eq!(transport.calls(), 1);
        assert!(relay.borrow().commands.is_empty());
    }

    #[test]
    fn exit_is_a_no_op_unless_initialized() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();

        binder.exit(&transport).unwrap();
        assert_eq!(binder.state(), BinderState::Created);
        assert_eq!(transport.calls(), 0);

        binder.init(&transport, 0, &BinderConfig::default()).unwrap();
        binder.exit(&transport).unwrap();
        let calls = transport.calls();
        binder.exit(&transport).unwrap();
        assert_eq!(transport.calls(), calls);
        assert_eq!(
            binder.init(&transport, 0, &BinderConfig::default()),
            Err(InitError::Closed)
        );
    }

    #[test]
    fn init_twice_is_rejected() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder.init(&transport, 0, &BinderConfig::default()).unwrap();
        assert_eq!(
            binder.init(&transport, 0, &BinderConfig::default()),
            Err(InitError::AlreadyInitialized)
        );
        assert_eq!((relay.borrow().strong, relay.borrow().weak), (1, 1));
    }

    #[test]
    fn legacy_transact_round_trips() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder.init(&transport, 0, &BinderConfig::default()).unwrap();
        assert_eq!(binder.mode(), TransactMode::Legacy);

        let mut reply = Parcel::new();
        binder
            .transact(&transport, 7, &request_parcel(21), &mut reply, 0)
            .unwrap();
        assert_eq!(reply.read_u32(), Ok(7));
        assert_eq!(reply.read_i32(), Ok(42));
        assert_eq!(BinderError::read_status(&mut reply), Ok(Ok(())));
        assert_eq!(
            relay.borrow().commands.last(),
            Some(&relay_cmds::TRANSACT_PARCEL)
        );
    }

    #[test]
    fn combined_static_and_mapped_carriage_agree() {
        let version = HosVersion::new(3, 0, 0);
        let mut replies = Vec::new();

        for threshold in [0x1000, 0] {
            let relay = Relay::new();
            let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
            let mut binder = binder();
            let config = BinderConfig::new(version).with_static_threshold(threshold);
            binder.init(&transport, 0, &config).unwrap();
            assert_eq!(binder.mode(), TransactMode::Combined);

            let mut reply = Parcel::new();
            binder
                .transact(&transport, 3, &request_parcel(5), &mut reply, 0)
                .unwrap();
            assert_eq!(
                relay.borrow().commands.last(),
                Some(&relay_cmds::TRANSACT_PARCEL_AUTO)
            );
            assert_eq!(relay.borrow().static_carriage, [threshold > 0]);
            replies.push(reply.data().to_vec());
        }

        assert_eq!(replies[0], replies[1]);
    }

    #[test]
    fn learned_pointer_buffer_size_is_the_default_threshold() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder
            .init(&transport, 0, &BinderConfig::new(HosVersion::new(9, 0, 0)))
            .unwrap();

        // A 0x400 reply capacity plus the request fits the learned 0x500.
        let mut reply = Parcel::new();
        binder
            .transact(&transport, 1, &request_parcel(1), &mut reply, 0)
            .unwrap();
        assert_eq!(relay.borrow().static_carriage, [true]);
    }

    #[test]
    fn forced_legacy_uses_transact_parcel() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        let config = BinderConfig::new(HosVersion::new(15, 0, 0)).with_force_legacy(true);
        binder.init(&transport, 0, &config).unwrap();
        assert_eq!(binder.mode(), TransactMode::Legacy);

        let mut reply = Parcel::new();
        binder
            .transact(&transport, 1, &request_parcel(1), &mut reply, 0)
            .unwrap();
        assert_eq!(
            relay.borrow().commands.last(),
            Some(&relay_cmds::TRANSACT_PARCEL)
        );
    }

    #[test]
    fn oversized_reply_is_a_protocol_violation() {
        let relay = Relay::new();
        relay.borrow_mut().malformed_reply = true;
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder.init(&transport, 0, &BinderConfig::default()).unwrap();

        let mut reply = Parcel::new();
        reply.write_i32(-3).unwrap();
        let err = binder
            .transact(&transport, 1, &request_parcel(1), &mut reply, 0)
            .unwrap_err();
        assert_eq!(err, TransactError::InvalidReply(ParcelError::ReplyOutOfBounds));
        assert!(err.is_protocol_violation());
        assert_eq!(err.to_rc(), LibnxError::BadInput.to_rc());

        assert_eq!(reply.data_size(), 4);
        assert_eq!(reply.read_i32(), Ok(-3));
    }

    #[test]
    fn transport_failure_during_transact_is_not_a_protocol_violation() {
        let relay = Relay::new();
        let transport = MockTransport::new(|s, m: &mut MessageBuffer| serve(&relay, s, m));
        let mut binder = binder();
        binder.init(&transport, 0, &BinderConfig::default()).unwrap();

        transport.fail_next(SendSyncError::SessionClosed);
        let mut reply = Parcel::new();
        let err = binder
            .transact(&transport, 1, &request_parcel(1), &mut reply, 0)
            .unwrap_err();
        assert_eq!(
            err,
            TransactError::Transact(TransactParcelError::SendRequest(SendSyncError::SessionClosed))
        );
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn status_codes_decode() {
        assert_eq!(BinderError::from_code(0), Ok(()));
        assert_eq!(BinderError::from_code(12), Ok(()));
        assert_eq!(BinderError::from_code(-22), Err(BinderError::BadValue));
        assert_eq!(BinderError::from_code(-32), Err(BinderError::DeadObject));
        assert_eq!(
            BinderError::from_code(i32::MIN + 2),
            Err(BinderError::FailedTransaction)
        );
        assert_eq!(BinderError::from_code(-9999), Err(BinderError::Unknown(-9999)));
    }
}
