//! HIPC (Horizon Inter-Process Communication) message framing.
//!
//! HIPC is the low-level message serialization protocol for IPC on Nintendo
//! Switch's Horizon OS. It defines the wire format for passing data, handles,
//! and buffer descriptors between processes via kernel supervisor calls.
//!
//! # Protocol Stack
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Service APIs (sm, binder relay)    │  Application layer
//! ├─────────────────────────────────────┤
//! │  CMIF                               │  Command serialization
//! ├─────────────────────────────────────┤
//! │  HIPC  ← this module                │  Message framing & descriptors
//! ├─────────────────────────────────────┤
//! │  Transport (SendSyncRequest)        │  Kernel
//! └─────────────────────────────────────┘
//! ```
//!
//! # Message Location
//!
//! Messages are built in a caller-owned [`MessageBuffer`] of 0x100 bytes, the
//! size of the IPC area of a thread's Thread Local Region. The transport moves
//! it in and out of the TLS area around the actual kernel call.
//!
//! # Message Layout
//!
//! Sections appear in this order; every one but the first header may be
//! empty.
//!
//! ```text
//! size          section
//! 8             Header: message type and section sizes
//! 4             SpecialHeader, when a PID or handles are carried
//! 8             process ID slot, filled in by the kernel
//! 4 each        copy handles, then move handles
//! 8 each        Type X: statics sent to the server
//! 12 each       Type A, B, W: mapped send, receive and exchange buffers
//! 4 each        data words, the CMIF payload lives here
//! 8 each        Type C: receive list for statics sent back
//! ```
//!
//! A reply is framed the same way.
//!
//! Statics (X, C) are copied by the kernel and capped at 0xFFFF bytes per
//! descriptor. Mapped buffers (A, B, W) are mapped into the server and carry
//! a 36-bit size.
//!
//! # Address Encoding
//!
//! Descriptors scatter the buffer address over several fields. Static
//! descriptors keep 42 address bits, buffer descriptors 58 and receive list
//! entries 48. [`AddressParts`] is the single place where addresses are
//! split and rejoined:
//!
//! ```text
//! StaticDescriptor  index:6 | addr[36..42]:6 | addr[32..36]:4 | size:16 | addr[0..32]:32
//! BufferDescriptor  size[0..32]:32 | addr[0..32]:32 | mode:2 | addr[36..58]:22
//!                   | size[32..36]:4 | addr[32..36]:4
//! ```
//!
//! # References
//!
//! - [Switchbrew IPC Marshalling](https://switchbrew.org/wiki/IPC_Marshalling)
//! - libnx `sf/hipc.h` (fincs, SciresM)

use core::mem::size_of;

use modular_bitfield::prelude::*;
use nx_svc::raw::Handle as RawHandle;
use static_assertions::const_assert_eq;

/// Size of the IPC message area of a thread's TLS region.
pub const MESSAGE_BUFFER_SIZE: usize = 0x100;

/// Largest value of the 4-bit descriptor and handle count fields.
pub const MAX_DESCRIPTOR_COUNT: usize = 0xF;

/// Largest value of the 10-bit data word count field.
pub const MAX_DATA_WORDS: usize = 0x3FF;

/// A caller-owned IPC command buffer.
///
/// 16-byte aligned so that the CMIF payload alignment computed from offsets
/// holds for the real memory too.
#[derive(Clone)]
#[repr(C, align(16))]
pub struct MessageBuffer([u8; MESSAGE_BUFFER_SIZE]);

impl MessageBuffer {
    /// Creates a zero-filled buffer.
    pub const fn new() -> Self {
        Self([0; MESSAGE_BUFFER_SIZE])
    }

    /// Returns the raw message bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; MESSAGE_BUFFER_SIZE] {
        &self.0
    }

    /// Returns the raw message bytes for writing.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; MESSAGE_BUFFER_SIZE] {
        &mut self.0
    }

    /// Zero-fills the whole buffer.
    #[inline]
    pub fn clear(&mut self) {
        self.0 = [0; MESSAGE_BUFFER_SIZE];
    }

    pub(crate) fn read<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.0[offset..offset + N]);
        out
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) {
        self.0[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        u32::from_le_bytes(self.read(offset))
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        self.write(offset, &value.to_le_bytes());
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let header = Header::from_bytes(self.read(0));
        f.debug_struct("MessageBuffer").field("header", &header).finish()
    }
}

/// Builds the framing of an HIPC message in `msg`.
///
/// The buffer is zero-filled first, then the header, the optional special
/// header and the optional PID slot are written. Returns the offsets of every
/// section so the caller can fill descriptors and data words.
pub fn make_request(msg: &mut MessageBuffer, meta: &Metadata) -> Result<Layout, LayoutError> {
    meta.validate()?;
    let has_special_header = meta.has_special_header();
    let layout = Layout::compute(meta, MESSAGE_BUFFER_SIZE)?;

    let header = Header::new()
        .with_message_type(meta.message_type.to_raw())
        .with_num_send_statics(meta.num_send_statics as u8)
        .with_num_send_buffers(meta.num_send_buffers as u8)
        .with_num_recv_buffers(meta.num_recv_buffers as u8)
        .with_num_exch_buffers(meta.num_exch_buffers as u8)
        .with_num_data_words(meta.num_data_words as u16)
        .with_recv_static_mode(meta.recv_static_mode.map_or(0, RecvStaticMode::to_raw))
        .with_recv_list_offset(0)
        .with_has_special_header(has_special_header);

    msg.clear();
    msg.write(0, &header.into_bytes());

    if has_special_header {
        let special = SpecialHeader::new()
            .with_send_pid(meta.send_pid)
            .with_num_copy_handles(meta.num_copy_handles as u8)
            .with_num_move_handles(meta.num_move_handles as u8);
        msg.write(size_of::<Header>(), &special.into_bytes());
    }

    Ok(layout)
}

/// Parses an incoming HIPC request (server side).
pub fn parse_request(msg: &MessageBuffer) -> Result<ParsedMessage<'_>, LayoutError> {
    parse_message(msg)
}

/// Parses an HIPC response.
///
/// Every section offset is checked against the buffer before it is exposed.
pub fn parse_response(msg: &MessageBuffer) -> Result<ParsedMessage<'_>, LayoutError> {
    parse_message(msg)
}

fn parse_message(msg: &MessageBuffer) -> Result<ParsedMessage<'_>, LayoutError> {
    let header = Header::from_bytes(msg.read(0));

    let mut send_pid = false;
    let mut num_copy_handles = 0usize;
    let mut num_move_handles = 0usize;

    if header.has_special_header() {
        let special = SpecialHeader::from_bytes(msg.read(size_of::<Header>()));
        send_pid = special.send_pid();
        num_copy_handles = special.num_copy_handles() as usize;
        num_move_handles = special.num_move_handles() as usize;
    }

    let meta = Metadata {
        message_type: MessageType::from_raw(header.message_type()),
        num_send_statics: header.num_send_statics() as usize,
        num_send_buffers: header.num_send_buffers() as usize,
        num_recv_buffers: header.num_recv_buffers() as usize,
        num_exch_buffers: header.num_exch_buffers() as usize,
        num_data_words: header.num_data_words() as usize,
        recv_static_mode: RecvStaticMode::from_raw(header.recv_static_mode()),
        send_pid,
        num_copy_handles,
        num_move_handles,
    };

    let layout = Layout::compute(&meta, MESSAGE_BUFFER_SIZE)?;
    let pid = layout
        .pid
        .map(|off| u64::from_le_bytes(msg.read(off)));

    Ok(ParsedMessage {
        msg,
        meta,
        layout,
        pid,
    })
}

/// Errors in the framing of an HIPC message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    /// A descriptor or handle count does not fit its header field.
    #[error("too many descriptors in one category")]
    TooManyDescriptors,
    /// The data word count does not fit its header field.
    #[error("too many data words")]
    TooManyDataWords,
    /// The sections extend past the end of the message buffer.
    #[error("message does not fit in the IPC buffer")]
    OutOfBounds,
}

/// Byte offsets of every section of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Offset of the PID slot, when present.
    pub pid: Option<usize>,
    /// Offset of the copy handle array.
    pub copy_handles: usize,
    /// Offset of the move handle array.
    pub move_handles: usize,
    /// Offset of the send static descriptors.
    pub send_statics: usize,
    /// Offset of the send buffer descriptors.
    pub send_buffers: usize,
    /// Offset of the receive buffer descriptors.
    pub recv_buffers: usize,
    /// Offset of the exchange buffer descriptors.
    pub exch_buffers: usize,
    /// Offset of the data words.
    pub data_words: usize,
    /// Offset of the receive list.
    pub recv_list: usize,
    /// One past the last byte of the message.
    pub end: usize,
}

impl Layout {
    fn compute(meta: &Metadata, capacity: usize) -> Result<Self, LayoutError> {
        let mut cursor = size_of::<Header>();
        let mut pid = None;

        if meta.has_special_header() {
            cursor += size_of::<SpecialHeader>();
            if meta.send_pid {
                pid = Some(cursor);
                cursor += size_of::<u64>();
            }
        }

        let mut take = |len: usize| {
            let start = cursor;
            cursor += len;
            start
        };

        let copy_handles = take(meta.num_copy_handles * size_of::<RawHandle>());
        let move_handles = take(meta.num_move_handles * size_of::<RawHandle>());
        let send_statics = take(meta.num_send_statics * size_of::<StaticDescriptor>());
        let send_buffers = take(meta.num_send_buffers * size_of::<BufferDescriptor>());
        let recv_buffers = take(meta.num_recv_buffers * size_of::<BufferDescriptor>());
        let exch_buffers = take(meta.num_exch_buffers * size_of::<BufferDescriptor>());
        let data_words = take(meta.num_data_words * size_of::<u32>());
        let recv_list = take(meta.num_recv_list() * size_of::<RecvListEntry>());
        let end = cursor;

        if end > capacity {
            return Err(LayoutError::OutOfBounds);
        }

        Ok(Self {
            pid,
            copy_handles,
            move_handles,
            send_statics,
            send_buffers,
            recv_buffers,
            exch_buffers,
            data_words,
            recv_list,
            end,
        })
    }
}

/// A decoded message together with the buffer it was read from.
#[derive(Debug, Clone, Copy)]
pub struct ParsedMessage<'m> {
    msg: &'m MessageBuffer,
    /// Decoded descriptor counts.
    pub meta: Metadata,
    /// Section offsets.
    pub layout: Layout,
    /// Process ID stamped by the kernel, when requested.
    pub pid: Option<u64>,
}

impl<'m> ParsedMessage<'m> {
    /// Returns the copy handles.
    pub fn copy_handles(&self) -> impl Iterator<Item = RawHandle> + 'm {
        let msg = self.msg;
        let base = self.layout.copy_handles;
        (0..self.meta.num_copy_handles).map(move |i| msg.read_u32(base + i * 4))
    }

    /// Returns the move handles.
    pub fn move_handles(&self) -> impl Iterator<Item = RawHandle> + 'm {
        let msg = self.msg;
        let base = self.layout.move_handles;
        (0..self.meta.num_move_handles).map(move |i| msg.read_u32(base + i * 4))
    }

    /// Returns the send static (type X) descriptors.
    pub fn send_statics(&self) -> impl Iterator<Item = StaticDescriptor> + 'm {
        let msg = self.msg;
        let base = self.layout.send_statics;
        (0..self.meta.num_send_statics)
            .map(move |i| StaticDescriptor::from_bytes(msg.read(base + i * 8)))
    }

    /// Returns the send buffer (type A) descriptors.
    pub fn send_buffers(&self) -> impl Iterator<Item = BufferDescriptor> + 'm {
        let msg = self.msg;
        let base = self.layout.send_buffers;
        (0..self.meta.num_send_buffers)
            .map(move |i| BufferDescriptor::from_bytes(msg.read(base + i * 12)))
    }

    /// Returns the receive buffer (type B) descriptors.
    pub fn recv_buffers(&self) -> impl Iterator<Item = BufferDescriptor> + 'm {
        let msg = self.msg;
        let base = self.layout.recv_buffers;
        (0..self.meta.num_recv_buffers)
            .map(move |i| BufferDescriptor::from_bytes(msg.read(base + i * 12)))
    }

    /// Returns the receive list (type C) entries.
    pub fn recv_list(&self) -> impl Iterator<Item = RecvListEntry> + 'm {
        let msg = self.msg;
        let base = self.layout.recv_list;
        (0..self.meta.num_recv_list())
            .map(move |i| RecvListEntry::from_bytes(msg.read(base + i * 8)))
    }

    /// Returns the data words as raw bytes.
    pub fn data_words(&self) -> &'m [u8] {
        let start = self.layout.data_words;
        &self.msg.as_bytes()[start..start + self.meta.num_data_words * 4]
    }

    /// Returns the absolute offset of the data words within the buffer.
    pub fn data_words_offset(&self) -> usize {
        self.layout.data_words
    }
}

/// The pieces a 64-bit address is split into by the descriptor encodings.
///
/// Every descriptor kind stores `address[0:31]`, `address[32:35]` and a
/// kind-specific number of bits from 36 upwards, in different positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParts {
    /// Bits 0-31.
    pub low: u32,
    /// Bits 32-35.
    pub mid: u8,
    /// Bits 36 and up.
    pub high: u64,
}

impl AddressParts {
    /// Splits an address.
    #[inline]
    pub const fn split(addr: u64) -> Self {
        Self {
            low: addr as u32,
            mid: ((addr >> 32) & 0xF) as u8,
            high: addr >> 36,
        }
    }

    /// Joins the parts back into an address.
    #[inline]
    pub const fn join(self) -> u64 {
        (self.low as u64) | ((self.mid as u64) << 32) | (self.high << 36)
    }
}

/// Memory attribute the kernel applies when mapping a Type A/B/W buffer.
#[derive(BitfieldSpecifier, Debug, Clone, Copy, PartialEq, Eq)]
#[bits = 2]
pub enum BufferMode {
    /// Plain memory.
    Normal = 0,
    /// Non-secure memory.
    NonSecure = 1,
    /// Device memory, rejected by the kernel.
    Invalid = 2,
    /// Non-device memory.
    NonDevice = 3,
}

/// First two words of every message: the type and the size of each
/// section that follows.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Header {
    /// Message type; the CMIF command type for CMIF messages.
    pub message_type: B16,
    /// Type X count.
    pub num_send_statics: B4,
    /// Type A count.
    pub num_send_buffers: B4,
    /// Type B count.
    pub num_recv_buffers: B4,
    /// Type W count.
    pub num_exch_buffers: B4,
    /// Length of the raw data section, in words.
    pub num_data_words: B10,
    /// Receive static mode (0 = none, 2 = one entry, 2+n = n entries).
    pub recv_static_mode: B4,
    #[skip]
    __padding: B6,
    /// Receive list offset; always 0, the list follows the data words.
    pub recv_list_offset: B11,
    /// Set when a [`SpecialHeader`] follows.
    pub has_special_header: bool,
}

const_assert_eq!(size_of::<Header>(), 8);

/// Optional third word, present when a PID or any handle is carried.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct SpecialHeader {
    /// A process ID slot follows.
    pub send_pid: bool,
    /// Handles duplicated into the receiver.
    pub num_copy_handles: B4,
    /// Handles moved to the receiver.
    pub num_move_handles: B4,
    #[skip]
    __padding: B23,
}

const_assert_eq!(size_of::<SpecialHeader>(), 4);

/// Type X descriptor: a buffer the kernel copies into the receiver's pointer
/// buffer.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct StaticDescriptor {
    /// Pairs the static with a receive list slot.
    pub index: B6,
    /// `addr[36..=41]`.
    pub address_high: B6,
    /// `addr[32..=35]`.
    pub address_mid: B4,
    /// Length in bytes.
    pub size: B16,
    /// `addr[0..=31]`.
    pub address_low: B32,
}

const_assert_eq!(size_of::<StaticDescriptor>(), 8);

impl StaticDescriptor {
    /// Describes `size` bytes at `addr` as static number `index`.
    pub fn new_send(addr: u64, size: usize, index: u8) -> Self {
        let parts = AddressParts::split(addr);
        Self::new()
            .with_index(index & 0x3F)
            .with_address_low(parts.low)
            .with_address_mid(parts.mid)
            .with_address_high((parts.high & 0x3F) as u8)
            .with_size(size as u16)
    }

    /// Returns the address the fields encode.
    pub fn address(&self) -> u64 {
        AddressParts {
            low: self.address_low(),
            mid: self.address_mid(),
            high: self.address_high() as u64,
        }
        .join()
    }
}

/// Type A/B/W descriptor: a buffer mapped into the receiver.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct BufferDescriptor {
    /// `size[0..=31]`.
    pub size_low: B32,
    /// `addr[0..=31]`.
    pub address_low: B32,
    /// Mapping attribute.
    pub mode: BufferMode,
    /// `addr[36..=57]`.
    pub address_high: B22,
    /// `size[32..=35]`.
    pub size_high: B4,
    /// `addr[32..=35]`.
    pub address_mid: B4,
}

const_assert_eq!(size_of::<BufferDescriptor>(), 12);

impl BufferDescriptor {
    /// Describes `size` bytes at `addr` mapped with `mode`.
    pub fn new_buffer(addr: u64, size: usize, mode: BufferMode) -> Self {
        let parts = AddressParts::split(addr);
        Self::new()
            .with_mode(mode)
            .with_address_low(parts.low)
            .with_address_mid(parts.mid)
            .with_address_high((parts.high & 0x3F_FFFF) as u32)
            .with_size_low(size as u32)
            .with_size_high(((size as u64 >> 32) & 0xF) as u8)
    }

    /// Returns the address the fields encode.
    pub fn address(&self) -> u64 {
        AddressParts {
            low: self.address_low(),
            mid: self.address_mid(),
            high: self.address_high() as u64,
        }
        .join()
    }

    /// Returns the 36-bit size.
    pub fn size(&self) -> usize {
        self.size_low() as usize | ((self.size_high() as usize) << 32)
    }
}

/// Type C entry: where the kernel may write statics sent back by the
/// server.
#[bitfield]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct RecvListEntry {
    /// `addr[0..=31]`.
    pub address_low: B32,
    /// `addr[32..=47]`.
    pub address_high: B16,
    /// Length in bytes.
    pub size: B16,
}

const_assert_eq!(size_of::<RecvListEntry>(), 8);

impl RecvListEntry {
    /// Describes `size` bytes at `addr` as a receive slot.
    pub fn new_recv(addr: u64, size: usize) -> Self {
        Self::new()
            .with_address_low(addr as u32)
            .with_address_high(((addr >> 32) & 0xFFFF) as u16)
            .with_size(size as u16)
    }

    /// Returns the address the fields encode.
    pub fn address(&self) -> u64 {
        self.address_low() as u64 | ((self.address_high() as u64) << 32)
    }
}

/// Section counts of a message, decoded from or encoded into its headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Message type field of the header.
    pub message_type: MessageType,
    /// Type X descriptors.
    pub num_send_statics: usize,
    /// Type A descriptors.
    pub num_send_buffers: usize,
    /// Type B descriptors.
    pub num_recv_buffers: usize,
    /// Type W descriptors.
    pub num_exch_buffers: usize,
    /// Data section length, in words.
    pub num_data_words: usize,
    /// Receive list shape, `None` for no list.
    pub recv_static_mode: Option<RecvStaticMode>,
    /// Reserve a process ID slot.
    pub send_pid: bool,
    /// Handles copied into the receiver.
    pub num_copy_handles: usize,
    /// Handles moved into the receiver.
    pub num_move_handles: usize,
}

impl Metadata {
    /// Whether the message needs a [`SpecialHeader`].
    #[inline]
    pub const fn has_special_header(&self) -> bool {
        self.send_pid || self.num_copy_handles > 0 || self.num_move_handles > 0
    }

    /// Number of receive list entries that follow the data words.
    #[inline]
    pub const fn num_recv_list(&self) -> usize {
        match self.recv_static_mode {
            Some(mode) => mode.as_count(),
            None => 0,
        }
    }

    fn validate(&self) -> Result<(), LayoutError> {
        let counts = [
            self.num_send_statics,
            self.num_send_buffers,
            self.num_recv_buffers,
            self.num_exch_buffers,
            self.num_copy_handles,
            self.num_move_handles,
        ];
        if counts.iter().any(|&n| n > MAX_DESCRIPTOR_COUNT) {
            return Err(LayoutError::TooManyDescriptors);
        }
        if let Some(RecvStaticMode::Explicit(n)) = self.recv_static_mode {
            if n == 0 || n as usize > MAX_DESCRIPTOR_COUNT - 2 {
                return Err(LayoutError::TooManyDescriptors);
            }
        }
        if self.num_data_words > MAX_DATA_WORDS {
            return Err(LayoutError::TooManyDataWords);
        }
        Ok(())
    }
}

/// The 16-bit message type field. [`CommandType`](crate::cmif::CommandType)
/// converts into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct MessageType(u16);

impl MessageType {
    /// Creates a message type from a raw value.
    #[inline]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw u16 value.
    #[inline]
    pub const fn to_raw(self) -> u16 {
        self.0
    }
}

/// Shape of the receive list. `Option<RecvStaticMode>::None` is a message
/// without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvStaticMode {
    /// A single receive list entry covers every incoming static (mode 2).
    Auto,
    /// Explicit count of receive list entries (mode 2+n, where n >= 1).
    Explicit(u8),
}

impl RecvStaticMode {
    /// Decodes the header field; 0 and 1 mean no receive list.
    #[inline]
    pub const fn from_raw(mode: u8) -> Option<Self> {
        match mode {
            0 | 1 => None,
            2 => Some(Self::Auto),
            n => Some(Self::Explicit(n - 2)),
        }
    }

    /// Returns the raw header value.
    #[inline]
    pub const fn to_raw(self) -> u8 {
        match self {
            Self::Auto => 2,
            Self::Explicit(n) => 2 + n,
        }
    }

    /// Number of receive list entries.
    #[inline]
    pub const fn as_count(self) -> usize {
        match self {
            Self::Auto => 1,
            Self::Explicit(n) => n as usize,
        }
    }
}
