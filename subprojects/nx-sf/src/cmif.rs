//! CMIF (Command Message Interface Format) protocol implementation.
//!
//! CMIF is the command serialization layer built on top of HIPC. It provides
//! structured message formatting with magic headers for validation and
//! command IDs for method dispatch.
//!
//! # Protocol Stack
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Service APIs (sm, binder relay)    │  Application layer
//! ├─────────────────────────────────────┤
//! │  CMIF  ← this module                │  Command serialization
//! ├─────────────────────────────────────┤
//! │  HIPC                               │  Message framing & descriptors
//! ├─────────────────────────────────────┤
//! │  Transport (SendSyncRequest)        │  Kernel
//! └─────────────────────────────────────┘
//! ```
//!
//! # Message Format
//!
//! CMIF messages are embedded within the HIPC data words section:
//!
//! ```text
//! [HIPC Header + Descriptors]
//! [Padding to 16-byte alignment]
//! [InHeader (16 bytes): magic="SFCI", version, command_id, token]
//! [Payload data]
//! [Output pointer size table (u16 per receive static)]
//! ```
//!
//! # Building a request
//!
//! A [`CommandBuilder`] collects the descriptor set: borrowed buffers,
//! handles and the PID flag. [`CommandBuilder::finalize`] lays everything out
//! in a [`MessageBuffer`] and hands back a [`PreparedRequest`] whose payload
//! slot the caller fills before dispatch. The borrows taken by the builder
//! live as long as the prepared request, so no buffer can be freed or moved
//! while the remote side may still be reading or writing it.
//!
//! # Magic Numbers
//!
//! - `"SFCI"` (0x49434653): Service Framework Command Input
//! - `"SFCO"` (0x4F434653): Service Framework Command Output
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)
//! - libnx `sf/cmif.h` (fincs, SciresM)

use core::{marker::PhantomData, mem::size_of};

use heapless::Vec;
use nx_svc::{
    error::{LibnxError, ToRawResultCode},
    raw::Handle as RawHandle,
    result::{Error, ResultCode},
};
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::U32};

use crate::hipc::{
    self, BufferDescriptor, BufferMode, LayoutError, MAX_DESCRIPTOR_COUNT, MessageBuffer,
    MessageType, RecvListEntry, RecvStaticMode, StaticDescriptor,
};

/// Magic number for CMIF input headers ("SFCI" - Service Framework Command Input).
pub const IN_HEADER_MAGIC: u32 = 0x49434653;

/// Magic number for CMIF output headers ("SFCO" - Service Framework Command Output).
pub const OUT_HEADER_MAGIC: u32 = 0x4F434653;

/// Maximum number of descriptors per buffer category.
pub const MAX_BUFFERS: usize = 8;

/// Maximum number of handles per handle category.
pub const MAX_HANDLES: usize = 8;

/// Largest buffer a static descriptor can describe.
pub const MAX_STATIC_SIZE: usize = u16::MAX as usize;

/// A region of client memory referenced by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    addr: u64,
    len: usize,
}

impl Region {
    const EMPTY: Self = Self { addr: 0, len: 0 };

    fn of(buf: &[u8]) -> Self {
        Self {
            addr: buf.as_ptr() as u64,
            len: buf.len(),
        }
    }
}

/// Where an auto-select buffer travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPlacement {
    /// Copied by the kernel through the server's pointer buffer.
    Static,
    /// Mapped into the server's address space.
    Mapped,
}

impl BufferPlacement {
    /// Picks static carriage iff the total fits a non-zero threshold.
    #[inline]
    pub const fn select(total: usize, threshold: usize) -> Self {
        if threshold > 0 && total <= threshold {
            Self::Static
        } else {
            Self::Mapped
        }
    }
}

/// The descriptor set of a request under construction.
///
/// Every buffer added is borrowed for `'a`; the borrow ends only when the
/// [`PreparedRequest`] built from this set is dropped.
#[derive(Debug, Default)]
pub struct CommandBuilder<'a> {
    send_statics: Vec<Region, MAX_BUFFERS>,
    send_buffers: Vec<(Region, BufferMode), MAX_BUFFERS>,
    recv_buffers: Vec<(Region, BufferMode), MAX_BUFFERS>,
    recv_statics: Vec<Region, MAX_BUFFERS>,
    copy_handles: Vec<RawHandle, MAX_HANDLES>,
    move_handles: Vec<RawHandle, MAX_HANDLES>,
    send_pid: bool,
    _buffers: PhantomData<&'a mut [u8]>,
}

impl<'a> CommandBuilder<'a> {
    /// Starts an empty descriptor set.
    pub fn begin() -> Self {
        Self::default()
    }

    /// Adds a mapped input buffer (Type A).
    pub fn add_send_buffer(&mut self, buf: &'a [u8], mode: BufferMode) -> Result<(), BuildError> {
        self.send_buffers
            .push((Region::of(buf), mode))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds a mapped output buffer (Type B).
    pub fn add_recv_buffer(
        &mut self,
        buf: &'a mut [u8],
        mode: BufferMode,
    ) -> Result<(), BuildError> {
        self.recv_buffers
            .push((Region::of(buf), mode))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds an input pointer (Type X).
    pub fn add_send_static(&mut self, buf: &'a [u8]) -> Result<(), BuildError> {
        check_static_len(buf.len())?;
        self.send_statics
            .push(Region::of(buf))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds an output pointer (Type C) with its size table entry.
    pub fn add_recv_static(&mut self, buf: &'a mut [u8]) -> Result<(), BuildError> {
        check_static_len(buf.len())?;
        self.recv_statics
            .push(Region::of(buf))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds an input buffer that travels as a static or as a mapping.
    ///
    /// Both a static and a mapped descriptor are emitted; the one not chosen
    /// is empty.
    pub fn add_in_auto_buffer(
        &mut self,
        buf: &'a [u8],
        mode: BufferMode,
        placement: BufferPlacement,
    ) -> Result<(), BuildError> {
        if self.send_statics.is_full() || self.send_buffers.is_full() {
            return Err(BuildError::TooManyBuffers);
        }
        let (pointer, mapped) = match placement {
            BufferPlacement::Static => {
                check_static_len(buf.len())?;
                (Region::of(buf), Region::EMPTY)
            }
            BufferPlacement::Mapped => (Region::EMPTY, Region::of(buf)),
        };
        self.send_statics
            .push(pointer)
            .map_err(|_| BuildError::TooManyBuffers)?;
        self.send_buffers
            .push((mapped, mode))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds an output buffer that travels as a static or as a mapping.
    ///
    /// Both a receive static and a mapped descriptor are emitted; the one not
    /// chosen is empty.
    pub fn add_out_auto_buffer(
        &mut self,
        buf: &'a mut [u8],
        mode: BufferMode,
        placement: BufferPlacement,
    ) -> Result<(), BuildError> {
        if self.recv_statics.is_full() || self.recv_buffers.is_full() {
            return Err(BuildError::TooManyBuffers);
        }
        let (pointer, mapped) = match placement {
            BufferPlacement::Static => {
                check_static_len(buf.len())?;
                (Region::of(buf), Region::EMPTY)
            }
            BufferPlacement::Mapped => (Region::EMPTY, Region::of(buf)),
        };
        self.recv_statics
            .push(pointer)
            .map_err(|_| BuildError::TooManyBuffers)?;
        self.recv_buffers
            .push((mapped, mode))
            .map_err(|_| BuildError::TooManyBuffers)
    }

    /// Adds a handle the kernel copies into the server.
    pub fn add_copy_handle(&mut self, handle: RawHandle) -> Result<(), BuildError> {
        self.copy_handles
            .push(handle)
            .map_err(|_| BuildError::TooManyHandles)
    }

    /// Adds a handle the kernel moves into the server.
    pub fn add_move_handle(&mut self, handle: RawHandle) -> Result<(), BuildError> {
        self.move_handles
            .push(handle)
            .map_err(|_| BuildError::TooManyHandles)
    }

    /// Asks the kernel to stamp the caller's process ID into the request.
    pub fn request_pid(&mut self) {
        self.send_pid = true;
    }

    /// Lays out the request in `msg`.
    ///
    /// Writes the HIPC framing and every descriptor, reserves a zero-filled
    /// payload slot of `payload_size` bytes at the first 16-byte aligned
    /// offset of the data words, and writes the receive static size table
    /// after it.
    pub fn finalize(
        self,
        msg: &'a mut MessageBuffer,
        message_type: MessageType,
        payload_size: usize,
    ) -> Result<PreparedRequest<'a>, BuildError> {
        if payload_size > hipc::MAX_DATA_WORDS * size_of::<u32>() {
            return Err(LayoutError::TooManyDataWords.into());
        }
        let num_recv_statics = self.recv_statics.len();

        // 16 bytes of slack cover the alignment padding in front of the payload.
        let mut raw_size = 16 + payload_size;
        raw_size = (raw_size + 1) & !1;
        let size_table_offset = raw_size;
        raw_size += 2 * num_recv_statics;

        let recv_static_mode = if num_recv_statics > 0 {
            Some(RecvStaticMode::Explicit(num_recv_statics as u8))
        } else {
            None
        };

        let meta = hipc::Metadata {
            message_type,
            num_send_statics: self.send_statics.len(),
            num_send_buffers: self.send_buffers.len(),
            num_recv_buffers: self.recv_buffers.len(),
            num_exch_buffers: 0,
            num_data_words: raw_size.div_ceil(4),
            recv_static_mode,
            send_pid: self.send_pid,
            num_copy_handles: self.copy_handles.len(),
            num_move_handles: self.move_handles.len(),
        };

        let layout = hipc::make_request(msg, &meta)?;

        for (i, &handle) in self.copy_handles.iter().enumerate() {
            msg.write_u32(layout.copy_handles + i * 4, handle);
        }
        for (i, &handle) in self.move_handles.iter().enumerate() {
            msg.write_u32(layout.move_handles + i * 4, handle);
        }
        for (i, region) in self.send_statics.iter().enumerate() {
            let desc = StaticDescriptor::new_send(region.addr, region.len, i as u8);
            msg.write(layout.send_statics + i * 8, &desc.into_bytes());
        }
        for (i, (region, mode)) in self.send_buffers.iter().enumerate() {
            let desc = BufferDescriptor::new_buffer(region.addr, region.len, *mode);
            msg.write(layout.send_buffers + i * 12, &desc.into_bytes());
        }
        for (i, (region, mode)) in self.recv_buffers.iter().enumerate() {
            let desc = BufferDescriptor::new_buffer(region.addr, region.len, *mode);
            msg.write(layout.recv_buffers + i * 12, &desc.into_bytes());
        }
        for (i, region) in self.recv_statics.iter().enumerate() {
            let entry = RecvListEntry::new_recv(region.addr, region.len);
            msg.write(layout.recv_list + i * 8, &entry.into_bytes());
            let size = (region.len as u16).to_le_bytes();
            msg.write(layout.data_words + size_table_offset + i * 2, &size);
        }

        Ok(PreparedRequest {
            msg,
            payload_offset: align16(layout.data_words),
            payload_size,
            _buffers: PhantomData,
        })
    }
}

fn check_static_len(len: usize) -> Result<(), BuildError> {
    if len > MAX_STATIC_SIZE {
        return Err(BuildError::StaticTooLarge);
    }
    Ok(())
}

#[inline]
const fn align16(offset: usize) -> usize {
    (offset + 0xF) & !0xF
}

/// A laid-out request waiting for its payload and dispatch.
#[derive(Debug)]
pub struct PreparedRequest<'a> {
    msg: &'a mut MessageBuffer,
    payload_offset: usize,
    payload_size: usize,
    _buffers: PhantomData<&'a mut [u8]>,
}

impl<'a> PreparedRequest<'a> {
    /// Returns the payload slot.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let start = self.payload_offset;
        &mut self.msg.as_bytes_mut()[start..start + self.payload_size]
    }

    /// Returns the whole message.
    pub fn message(&self) -> &MessageBuffer {
        self.msg
    }

    /// Releases the message for dispatch.
    pub fn into_message(self) -> &'a mut MessageBuffer {
        self.msg
    }
}

/// Writes a CMIF input header at the start of `slot` and returns the
/// argument area behind it.
pub fn write_request_header(
    slot: &mut [u8],
    command_id: u32,
    token: u32,
) -> Result<&mut [u8], BuildError> {
    if slot.len() < size_of::<InHeader>() {
        return Err(BuildError::PayloadTooSmall);
    }
    let header = InHeader {
        magic: U32::new(IN_HEADER_MAGIC),
        version: U32::new(if token != 0 { 1 } else { 0 }),
        command_id: U32::new(command_id),
        token: U32::new(token),
    };
    let (head, args) = slot.split_at_mut(size_of::<InHeader>());
    head.copy_from_slice(header.as_bytes());
    Ok(args)
}

/// Builds a standard request for `command_id` carrying `data_size` bytes of
/// arguments.
pub fn make_request<'a>(
    builder: CommandBuilder<'a>,
    msg: &'a mut MessageBuffer,
    command_id: u32,
    data_size: usize,
) -> Result<PreparedRequest<'a>, BuildError> {
    let mut request = builder.finalize(
        msg,
        CommandType::Request.into(),
        with_header_size(data_size)?,
    )?;
    write_request_header(request.payload_mut(), command_id, 0)?;
    Ok(request)
}

/// Size of a payload slot holding a CMIF header and `data_size` bytes of
/// arguments.
fn with_header_size(data_size: usize) -> Result<usize, BuildError> {
    size_of::<InHeader>()
        .checked_add(data_size)
        .ok_or(BuildError::Layout(LayoutError::TooManyDataWords))
}

/// Builds a control request (session management, e.g. `QueryPointerBufferSize`).
pub fn make_control_request(
    msg: &mut MessageBuffer,
    request_id: u32,
    data_size: usize,
) -> Result<PreparedRequest<'_>, BuildError> {
    let mut request = CommandBuilder::begin().finalize(
        msg,
        CommandType::Control.into(),
        with_header_size(data_size)?,
    )?;
    write_request_header(request.payload_mut(), request_id, 0)?;
    Ok(request)
}

/// Builds a request that closes the whole session.
pub fn make_close_request(msg: &mut MessageBuffer) -> Result<(), BuildError> {
    let meta = hipc::Metadata {
        message_type: CommandType::Close.into(),
        ..Default::default()
    };
    hipc::make_request(msg, &meta)?;
    Ok(())
}

/// Returns the byte range of the argument area behind a CMIF header, or
/// `None` when the data words are too short to hold it.
fn payload_range(parsed: &hipc::ParsedMessage<'_>, data_size: usize) -> Option<(usize, usize)> {
    let words_start = parsed.data_words_offset();
    let words_end = words_start + parsed.data_words().len();
    let header_start = align16(words_start);
    let data_start = header_start + size_of::<OutHeader>();
    let data_end = data_start.checked_add(data_size)?;
    (data_end <= words_end).then_some((header_start, data_end))
}

/// Parses a CMIF response message.
///
/// Framing is validated first, then the `"SFCO"` magic, then the result
/// code. On success the `data_size` bytes behind the header are returned
/// together with the handles and statics the server sent.
pub fn parse_response(
    msg: &MessageBuffer,
    data_size: usize,
) -> Result<Response<'_>, ParseResponseError> {
    let parsed = hipc::parse_response(msg)?;
    let (header_start, data_end) =
        payload_range(&parsed, data_size).ok_or(ParseResponseError::Truncated)?;

    let bytes = &msg.as_bytes()[header_start..data_end];
    let (header, data) =
        OutHeader::read_from_prefix(bytes).map_err(|_| ParseResponseError::Truncated)?;

    if header.magic.get() != OUT_HEADER_MAGIC {
        return Err(ParseResponseError::InvalidMagic);
    }

    if let Some(err) = Error::from_raw(header.result.get()) {
        return Err(ParseResponseError::ServiceError(err));
    }

    // Counts come from 4-bit fields, they always fit.
    Ok(Response {
        data,
        copy_handles: parsed.copy_handles().collect(),
        move_handles: parsed.move_handles().collect(),
        send_statics: parsed.send_statics().collect(),
    })
}

/// Error building a request. Always the caller's fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A buffer category is full.
    #[error("too many buffers in one descriptor category")]
    TooManyBuffers,
    /// A handle category is full.
    #[error("too many handles")]
    TooManyHandles,
    /// A static buffer does not fit the 16-bit size field.
    #[error("static buffer larger than 64 KiB")]
    StaticTooLarge,
    /// The payload slot cannot hold the CMIF header.
    #[error("payload slot smaller than the CMIF header")]
    PayloadTooSmall,
    /// The message does not fit the IPC buffer.
    #[error("message layout rejected")]
    Layout(#[from] LayoutError),
}

impl ToRawResultCode for BuildError {
    fn to_rc(self) -> ResultCode {
        LibnxError::BadInput.to_rc()
    }
}

/// Error returned by [`parse_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseResponseError {
    /// The HIPC framing overruns the buffer.
    #[error("malformed response framing")]
    Layout(#[from] LayoutError),
    /// The data words are too short for the expected payload.
    #[error("response payload truncated")]
    Truncated,
    /// Response contains invalid CMIF magic header.
    #[error("invalid CMIF magic header")]
    InvalidMagic,
    /// Service returned a non-zero result code.
    #[error("service error: {0}")]
    ServiceError(Error),
}

impl ParseResponseError {
    /// Whether the reply broke the protocol, as opposed to reporting a
    /// failure status.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, Self::ServiceError(_))
    }
}

impl ToRawResultCode for ParseResponseError {
    fn to_rc(self) -> ResultCode {
        match self {
            Self::ServiceError(err) => err.to_raw(),
            Self::Layout(_) | Self::Truncated | Self::InvalidMagic => {
                LibnxError::InvalidCmifOutHeader.to_rc()
            }
        }
    }
}

/// CMIF command type (stored in HIPC message type field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandType {
    /// Invalid command.
    Invalid = 0,
    /// Close session.
    Close = 2,
    /// Standard request.
    Request = 4,
    /// Control request (pointer buffer size query, cloning, etc.).
    Control = 5,
}

impl CommandType {
    /// Decodes a raw message type.
    pub const fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Self::Invalid),
            2 => Some(Self::Close),
            4 => Some(Self::Request),
            5 => Some(Self::Control),
            _ => None,
        }
    }
}

impl From<CommandType> for MessageType {
    fn from(cmd: CommandType) -> Self {
        MessageType::from_raw(cmd as u16)
    }
}

/// CMIF input header (16 bytes).
///
/// Present at the start of every CMIF request payload.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct InHeader {
    /// Magic number (`"SFCI"` = 0x49434653).
    pub magic: U32,
    /// Protocol version (0 = standard, 1 = with context).
    pub version: U32,
    /// Command/method ID to invoke.
    pub command_id: U32,
    /// Context token.
    pub token: U32,
}

const_assert_eq!(size_of::<InHeader>(), 16);

/// CMIF output header (16 bytes).
///
/// Present at the start of every CMIF response payload.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct OutHeader {
    /// Magic number (`"SFCO"` = 0x4F434653).
    pub magic: U32,
    /// Protocol version.
    pub version: U32,
    /// Result code (0 = success).
    pub result: U32,
    /// Echo of request token.
    pub token: U32,
}

const_assert_eq!(size_of::<OutHeader>(), 16);

/// Parsed CMIF response.
#[derive(Debug)]
pub struct Response<'m> {
    /// Response payload data.
    pub data: &'m [u8],
    /// Returned copy handles.
    pub copy_handles: Vec<RawHandle, MAX_DESCRIPTOR_COUNT>,
    /// Returned move handles.
    pub move_handles: Vec<RawHandle, MAX_DESCRIPTOR_COUNT>,
    /// Statics the server wrote into the receive list.
    pub send_statics: Vec<StaticDescriptor, MAX_DESCRIPTOR_COUNT>,
}

impl Response<'_> {
    /// Number of bytes of an auto-select output buffer the server filled.
    ///
    /// For static carriage this is the size of the first static the server
    /// sent back, capped at `requested`. Mapped buffers report `requested`.
    pub fn out_auto_len(&self, placement: BufferPlacement, requested: usize) -> usize {
        match placement {
            BufferPlacement::Mapped => requested,
            BufferPlacement::Static => self
                .send_statics
                .first()
                .map_or(requested, |desc| (desc.size() as usize).min(requested)),
        }
    }
}

/// A request decoded on the server side.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct ServerRequest<'m> {
    /// Command type of the message.
    pub command_type: Option<CommandType>,
    /// The HIPC view of the message.
    pub hipc: hipc::ParsedMessage<'m>,
    /// Command ID, when the message carries a CMIF header.
    pub command_id: Option<u32>,
    /// Argument bytes behind the CMIF header (to the end of the data words).
    pub args: &'m [u8],
}

/// Decodes a request as a server would.
#[cfg(any(test, feature = "mock"))]
pub fn parse_request(msg: &MessageBuffer) -> Result<ServerRequest<'_>, ParseResponseError> {
    let hipc = hipc::parse_request(msg)?;
    let command_type = CommandType::from_raw(hipc.meta.message_type.to_raw());

    if matches!(command_type, Some(CommandType::Close)) {
        return Ok(ServerRequest {
            command_type,
            hipc,
            command_id: None,
            args: &[],
        });
    }

    let (header_start, _) = payload_range(&hipc, 0).ok_or(ParseResponseError::Truncated)?;
    let words_end = hipc.data_words_offset() + hipc.data_words().len();
    let bytes = &msg.as_bytes()[header_start..words_end];
    let (header, args) =
        InHeader::read_from_prefix(bytes).map_err(|_| ParseResponseError::Truncated)?;
    if header.magic.get() != IN_HEADER_MAGIC {
        return Err(ParseResponseError::InvalidMagic);
    }

    Ok(ServerRequest {
        command_type,
        hipc,
        command_id: Some(header.command_id.get()),
        args,
    })
}

/// Server-side reply contents.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplySpec<'r> {
    /// Result code to report.
    pub result: ResultCode,
    /// Payload behind the output header.
    pub data: &'r [u8],
    /// Copy handles to return.
    pub copy_handles: &'r [RawHandle],
    /// Move handles to return.
    pub move_handles: &'r [RawHandle],
    /// Statics written into the client's receive list as `(address, size)`.
    pub send_statics: &'r [(u64, usize)],
}

/// Writes a CMIF response into `msg` as a server would.
#[cfg(any(test, feature = "mock"))]
pub fn make_response(msg: &mut MessageBuffer, reply: &ReplySpec<'_>) -> Result<(), BuildError> {
    let raw_size = 16 + size_of::<OutHeader>() + reply.data.len();
    let meta = hipc::Metadata {
        message_type: MessageType::from_raw(0),
        num_send_statics: reply.send_statics.len(),
        num_data_words: raw_size.div_ceil(4),
        num_copy_handles: reply.copy_handles.len(),
        num_move_handles: reply.move_handles.len(),
        ..Default::default()
    };
    let layout = hipc::make_request(msg, &meta)?;

    for (i, &handle) in reply.copy_handles.iter().enumerate() {
        msg.write_u32(layout.copy_handles + i * 4, handle);
    }
    for (i, &handle) in reply.move_handles.iter().enumerate() {
        msg.write_u32(layout.move_handles + i * 4, handle);
    }
    for (i, &(addr, size)) in reply.send_statics.iter().enumerate() {
        let desc = StaticDescriptor::new_send(addr, size, i as u8);
        msg.write(layout.send_statics + i * 8, &desc.into_bytes());
    }

    let start = align16(layout.data_words);
    let header = OutHeader {
        magic: U32::new(OUT_HEADER_MAGIC),
        version: U32::new(0),
        result: U32::new(reply.result),
        token: U32::new(0),
    };
    msg.write(start, header.as_bytes());
    msg.write(start + size_of::<OutHeader>(), reply.data);
    Ok(())
}
