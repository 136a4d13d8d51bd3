//! Android Parcel implementation for Binder IPC.
//!
//! Parcels are used for serializing data in Binder transactions. This
//! implementation follows the Android Parcel format used by
//! `IGraphicBufferProducer`, restricted to fixed-capacity regions:
//!
//! - a data region for primitives, strings and flattened objects,
//! - an objects region for binder object references.
//!
//! Every value in the data region is padded to 4 bytes. A write that does not
//! fit and a read that would run past the written extent both fail without
//! moving the cursor.
//!
//! # Wire layout
//!
//! On the wire a parcel is four header words followed by both regions back
//! to back:
//!
//! ```text
//! 0x00  data_size
//! 0x04  data_offset     (0x10)
//! 0x08  objects_size
//! 0x0C  objects_offset  (0x10 + data_size)
//! 0x10  data region
//!       objects region
//! ```

use core::mem::size_of;

use heapless::String;
use nx_svc::{
    error::{LibnxError, ToRawResultCode},
    result::ResultCode,
};
use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::U32};

use crate::proto::INTERFACE_TOKEN_STRICT_MODE;

/// Capacity of the data region.
pub const PARCEL_DATA_CAPACITY: usize = 0x400;

/// Capacity of the objects region.
pub const PARCEL_OBJECTS_CAPACITY: usize = 0x400;

/// Size of the buffers a serialized parcel travels in.
pub const PARCEL_STAGING_SIZE: usize = 0x400;

/// Serialized parcel header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ParcelHeader {
    /// Size of the data region.
    pub data_size: U32,
    /// Offset of the data region from the start of the parcel.
    pub data_offset: U32,
    /// Size of the objects region.
    pub objects_size: U32,
    /// Offset of the objects region from the start of the parcel.
    pub objects_offset: U32,
}

const_assert_eq!(size_of::<ParcelHeader>(), 16);

#[inline]
const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

/// Read position over one region.
struct Cursor<'p> {
    buf: &'p [u8],
    pos: usize,
}

impl<'p> Cursor<'p> {
    fn new(buf: &'p [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn take(&mut self, len: usize) -> Result<&'p [u8], ParcelError> {
        let padded = len
            .checked_add(3)
            .map(|n| n & !3)
            .ok_or(ParcelError::Underflow)?;
        let end = self.pos.checked_add(padded).ok_or(ParcelError::Underflow)?;
        if end > self.buf.len() {
            return Err(ParcelError::Underflow);
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ParcelError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32, ParcelError> {
        self.array().map(i32::from_le_bytes)
    }
}

/// A fixed-capacity Binder parcel.
#[derive(Clone)]
pub struct Parcel {
    data: [u8; PARCEL_DATA_CAPACITY],
    data_size: usize,
    data_pos: usize,
    objects: [u8; PARCEL_OBJECTS_CAPACITY],
    objects_size: usize,
    objects_pos: usize,
}

impl Parcel {
    /// Creates a new empty Parcel.
    pub const fn new() -> Self {
        Self {
            data: [0; PARCEL_DATA_CAPACITY],
            data_size: 0,
            data_pos: 0,
            objects: [0; PARCEL_OBJECTS_CAPACITY],
            objects_size: 0,
            objects_pos: 0,
        }
    }

    /// Returns the written part of the data region.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[..self.data_size]
    }

    /// Returns the written part of the objects region.
    #[inline]
    pub fn objects(&self) -> &[u8] {
        &self.objects[..self.objects_size]
    }

    /// Returns the data write extent.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Returns the objects write extent.
    #[inline]
    pub fn objects_size(&self) -> usize {
        self.objects_size
    }

    /// Returns the data read position.
    #[inline]
    pub fn data_position(&self) -> usize {
        self.data_pos
    }

    /// Resets both read positions to the beginning.
    #[inline]
    pub fn reset_read_pos(&mut self) {
        self.data_pos = 0;
        self.objects_pos = 0;
    }

    /// Empties the parcel.
    pub fn clear(&mut self) {
        self.data_size = 0;
        self.objects_size = 0;
        self.reset_read_pos();
    }

    fn data_free(&self) -> usize {
        PARCEL_DATA_CAPACITY - self.data_size
    }

    /// Claims `len` bytes (padded to 4) at the end of the data region.
    fn reserve(&mut self, len: usize) -> Result<&mut [u8], ParcelError> {
        if len > i32::MAX as usize || align4(len) > self.data_free() {
            return Err(ParcelError::DataFull);
        }
        let start = self.data_size;
        let padded = align4(len);
        self.data[start..start + padded].fill(0);
        self.data_size += padded;
        Ok(&mut self.data[start..start + len])
    }

    /// Writes raw data to the parcel, padded to 4 bytes.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), ParcelError> {
        self.reserve(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Writes a 32-bit signed integer.
    pub fn write_i32(&mut self, val: i32) -> Result<(), ParcelError> {
        self.write_data(&val.to_le_bytes())
    }

    /// Writes a 32-bit unsigned integer.
    pub fn write_u32(&mut self, val: u32) -> Result<(), ParcelError> {
        self.write_data(&val.to_le_bytes())
    }

    /// Writes a 64-bit signed integer.
    pub fn write_i64(&mut self, val: i64) -> Result<(), ParcelError> {
        self.write_data(&val.to_le_bytes())
    }

    /// Writes a 64-bit unsigned integer.
    pub fn write_u64(&mut self, val: u64) -> Result<(), ParcelError> {
        self.write_data(&val.to_le_bytes())
    }

    /// Writes a UTF-16 string.
    ///
    /// The length word is the byte length of `s`. Each byte is widened to one
    /// code unit, then a NUL unit follows. Interface names are ASCII, and the
    /// remote side expects exactly this mapping.
    pub fn write_string16(&mut self, s: &str) -> Result<(), ParcelError> {
        let units = s.len() + 1;
        if 4 + align4(units * 2) > self.data_free() {
            return Err(ParcelError::DataFull);
        }

        self.write_i32(s.len() as i32)?;
        let out = self.reserve(units * 2)?;
        for (unit, byte) in out.chunks_exact_mut(2).zip(s.bytes()) {
            unit.copy_from_slice(&u16::from(byte).to_le_bytes());
        }
        Ok(())
    }

    /// Writes an interface token: the strict mode marker, then the name.
    ///
    /// Must be the first write into an outgoing transaction parcel.
    pub fn write_interface_token(&mut self, interface: &str) -> Result<(), ParcelError> {
        if 8 + align4((interface.len() + 1) * 2) > self.data_free() {
            return Err(ParcelError::DataFull);
        }
        self.write_i32(INTERFACE_TOKEN_STRICT_MODE)?;
        self.write_string16(interface)
    }

    /// Writes a flattened object: length, fd count (always 0), then the bytes.
    pub fn write_flattened_object(&mut self, data: &[u8]) -> Result<(), ParcelError> {
        if data.len() > i32::MAX as usize || 8 + align4(data.len()) > self.data_free() {
            return Err(ParcelError::DataFull);
        }
        self.write_i32(data.len() as i32)?;
        self.write_i32(0)?;
        self.write_data(data)
    }

    /// Appends raw bytes to the objects region, padded to 4 bytes.
    pub fn write_object(&mut self, object: &[u8]) -> Result<(), ParcelError> {
        let padded = align4(object.len());
        if padded > PARCEL_OBJECTS_CAPACITY - self.objects_size {
            return Err(ParcelError::ObjectsFull);
        }
        let start = self.objects_size;
        self.objects[start..start + padded].fill(0);
        self.objects[start..start + object.len()].copy_from_slice(object);
        self.objects_size += padded;
        Ok(())
    }

    /// Reads `len` bytes of raw data.
    pub fn read_data(&mut self, len: usize) -> Result<&[u8], ParcelError> {
        let mut cursor = Cursor::new(&self.data[..self.data_size], self.data_pos);
        let out = cursor.take(len)?;
        self.data_pos = cursor.pos;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParcelError> {
        let mut cursor = Cursor::new(&self.data[..self.data_size], self.data_pos);
        let out = cursor.array()?;
        self.data_pos = cursor.pos;
        Ok(out)
    }

    /// Reads a 32-bit signed integer.
    pub fn read_i32(&mut self) -> Result<i32, ParcelError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a 32-bit unsigned integer.
    pub fn read_u32(&mut self) -> Result<u32, ParcelError> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a 64-bit signed integer.
    pub fn read_i64(&mut self) -> Result<i64, ParcelError> {
        self.read_array().map(i64::from_le_bytes)
    }

    /// Reads a 64-bit unsigned integer.
    pub fn read_u64(&mut self) -> Result<u64, ParcelError> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a UTF-16 string of at most `N` UTF-8 bytes.
    ///
    /// Returns `None` for the null string (length `-1`).
    pub fn read_string16<const N: usize>(&mut self) -> Result<Option<String<N>>, ParcelError> {
        let mut cursor = Cursor::new(&self.data[..self.data_size], self.data_pos);

        let len = cursor.i32()?;
        if len == -1 {
            self.data_pos = cursor.pos;
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| ParcelError::InvalidLength)?;
        let byte_len = len
            .checked_add(1)
            .and_then(|units| units.checked_mul(2))
            .ok_or(ParcelError::InvalidLength)?;
        let bytes = cursor.take(byte_len)?;

        let units = bytes[..len * 2]
            .chunks_exact(2)
            .map(|unit| u16::from_le_bytes([unit[0], unit[1]]));
        let mut out = String::new();
        for ch in char::decode_utf16(units) {
            let ch = ch.map_err(|_| ParcelError::InvalidString)?;
            out.push(ch).map_err(|_| ParcelError::StringTooLong)?;
        }

        self.data_pos = cursor.pos;
        Ok(Some(out))
    }

    /// Reads an interface token and returns the interface name.
    pub fn read_interface_token<const N: usize>(&mut self) -> Result<String<N>, ParcelError> {
        let start = self.data_pos;
        // The strict mode policy is informational.
        let _policy = self.read_i32()?;
        match self.read_string16::<N>() {
            Ok(Some(name)) => Ok(name),
            Ok(None) => {
                self.data_pos = start;
                Err(ParcelError::NullInterfaceToken)
            }
            Err(err) => {
                self.data_pos = start;
                Err(err)
            }
        }
    }

    /// Reads a flattened object and returns its bytes.
    pub fn read_flattened_object(&mut self) -> Result<&[u8], ParcelError> {
        let mut cursor = Cursor::new(&self.data[..self.data_size], self.data_pos);
        let len = cursor.i32()?;
        let fd_count = cursor.i32()?;
        if fd_count != 0 {
            return Err(ParcelError::FdsNotSupported);
        }
        let len = usize::try_from(len).map_err(|_| ParcelError::InvalidLength)?;
        let out = cursor.take(len)?;
        self.data_pos = cursor.pos;
        Ok(out)
    }

    /// Reads `len` bytes from the objects region.
    pub fn read_object(&mut self, len: usize) -> Result<&[u8], ParcelError> {
        let mut cursor = Cursor::new(&self.objects[..self.objects_size], self.objects_pos);
        let out = cursor.take(len)?;
        self.objects_pos = cursor.pos;
        Ok(out)
    }

    /// Serializes the parcel into `staging` and returns the number of bytes
    /// used.
    pub fn serialize_into(&self, staging: &mut [u8]) -> Result<usize, ParcelError> {
        let data_offset = size_of::<ParcelHeader>();
        let objects_offset = data_offset + self.data_size;
        let total = objects_offset + self.objects_size;
        if total > staging.len() {
            return Err(ParcelError::StagingTooSmall);
        }

        let header = ParcelHeader {
            data_size: U32::new(self.data_size as u32),
            data_offset: U32::new(data_offset as u32),
            objects_size: U32::new(self.objects_size as u32),
            objects_offset: U32::new(objects_offset as u32),
        };
        staging[..data_offset].copy_from_slice(header.as_bytes());
        staging[data_offset..objects_offset].copy_from_slice(self.data());
        staging[objects_offset..total].copy_from_slice(self.objects());
        Ok(total)
    }

    /// Replaces the contents with a serialized reply.
    ///
    /// Every declared offset and size is checked against `reply` and against
    /// the region capacities before anything is copied; on failure the
    /// parcel is left untouched.
    pub fn deserialize_from(&mut self, reply: &[u8]) -> Result<(), ParcelError> {
        let (header, _) =
            ParcelHeader::read_from_prefix(reply).map_err(|_| ParcelError::ReplyOutOfBounds)?;

        let data = reply_region(
            reply,
            header.data_offset.get(),
            header.data_size.get(),
            PARCEL_DATA_CAPACITY,
        )?;
        let objects = reply_region(
            reply,
            header.objects_offset.get(),
            header.objects_size.get(),
            PARCEL_OBJECTS_CAPACITY,
        )?;

        self.data[..data.len()].copy_from_slice(data);
        self.data_size = data.len();
        self.objects[..objects.len()].copy_from_slice(objects);
        self.objects_size = objects.len();
        self.reset_read_pos();
        Ok(())
    }
}

fn reply_region(reply: &[u8], offset: u32, size: u32, capacity: usize) -> Result<&[u8], ParcelError> {
    let (offset, size) = (offset as usize, size as usize);
    if size == 0 {
        return Ok(&[]);
    }
    if size > capacity {
        return Err(ParcelError::ReplyOutOfBounds);
    }
    let end = offset
        .checked_add(size)
        .ok_or(ParcelError::ReplyOutOfBounds)?;
    reply.get(offset..end).ok_or(ParcelError::ReplyOutOfBounds)
}

impl Default for Parcel {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Parcel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Parcel")
            .field("data_size", &self.data_size)
            .field("data_pos", &self.data_pos)
            .field("objects_size", &self.objects_size)
            .field("objects_pos", &self.objects_pos)
            .finish()
    }
}

/// Error returned by parcel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParcelError {
    /// The data region cannot hold the value.
    #[error("parcel data region full")]
    DataFull,
    /// The objects region cannot hold the object.
    #[error("parcel objects region full")]
    ObjectsFull,
    /// A read would run past the written extent.
    #[error("read past the end of the parcel")]
    Underflow,
    /// A length field is negative or overflows.
    #[error("invalid length field")]
    InvalidLength,
    /// A string is not valid UTF-16.
    #[error("invalid UTF-16 string")]
    InvalidString,
    /// A string does not fit the destination.
    #[error("string too long")]
    StringTooLong,
    /// A flattened object carries file descriptors.
    #[error("file descriptors are not supported")]
    FdsNotSupported,
    /// The interface name of a token is the null string.
    #[error("null interface token")]
    NullInterfaceToken,
    /// The serialized parcel does not fit the staging buffer.
    #[error("parcel does not fit the staging buffer")]
    StagingTooSmall,
    /// A reply declares regions outside the received bytes or the local
    /// capacity.
    #[error("reply parcel out of bounds")]
    ReplyOutOfBounds,
}

impl ParcelError {
    /// Whether the error comes from a malformed reply rather than from local
    /// misuse.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ReplyOutOfBounds)
    }
}

impl ToRawResultCode for ParcelError {
    fn to_rc(self) -> ResultCode {
        LibnxError::BadInput.to_rc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect()
    }

    #[test]
    fn primitives_round_trip_and_advance_by_their_size() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-7).unwrap();
        parcel.write_u32(0xDEAD_BEEF).unwrap();
        parcel.write_i64(-1).unwrap();
        parcel.write_u64(0x0123_4567_89AB_CDEF).unwrap();
        assert_eq!(parcel.data_size(), 24);

        assert_eq!(parcel.read_i32(), Ok(-7));
        assert_eq!(parcel.data_position(), 4);
        assert_eq!(parcel.read_u32(), Ok(0xDEAD_BEEF));
        assert_eq!(parcel.data_position(), 8);
        assert_eq!(parcel.read_i64(), Ok(-1));
        assert_eq!(parcel.read_u64(), Ok(0x0123_4567_89AB_CDEF));
        assert_eq!(parcel.data_position(), 24);
    }

    #[test]
    fn string16_round_trips_printable_ascii() {
        for s in ["", "a", "ab", "abc", "android.view.IGraphicBufferProducer", "~!@# $%^"] {
            let mut parcel = Parcel::new();
            parcel.write_string16(s).unwrap();
            assert_eq!(words(&parcel.data()[..4])[0], s.len() as u32);
            assert_eq!(parcel.data_size(), 4 + align4((s.len() + 1) * 2));

            let back = parcel.read_string16::<64>().unwrap().unwrap();
            assert_eq!(back.as_str(), s);
            assert_eq!(parcel.data_position(), parcel.data_size());
        }
    }

    #[test]
    fn interface_token_layout() {
        let name = "android.gui.IGraphicBufferProducer";
        let mut parcel = Parcel::new();
        parcel.write_interface_token(name).unwrap();
        parcel.write_i32(5).unwrap();

        let data = parcel.data();
        assert_eq!(words(&data[..8]), [0x100, name.len() as u32]);

        let units: Vec<u16> = data[8..8 + (name.len() + 1) * 2]
            .chunks_exact(2)
            .map(|u| u16::from_le_bytes([u[0], u[1]]))
            .collect();
        assert_eq!(units.len(), name.len() + 1);
        assert!(units[..name.len()].iter().zip(name.bytes()).all(|(&u, b)| u == u16::from(b)));
        assert_eq!(units[name.len()], 0);

        let five_at = 8 + align4((name.len() + 1) * 2);
        assert_eq!(five_at % 4, 0);
        assert_eq!(words(&data[five_at..]), [5]);

        let token = parcel.read_interface_token::<64>().unwrap();
        assert_eq!(token.as_str(), name);
        assert_eq!(parcel.read_i32(), Ok(5));
    }

    #[test]
    fn read_past_extent_fails_without_moving() {
        let mut parcel = Parcel::new();
        parcel.write_i32(1).unwrap();
        assert_eq!(parcel.read_i32(), Ok(1));
        assert_eq!(parcel.read_i32(), Err(ParcelError::Underflow));
        assert_eq!(parcel.read_u64(), Err(ParcelError::Underflow));
        assert_eq!(parcel.data_position(), 4);

        parcel.reset_read_pos();
        assert_eq!(parcel.read_data(8), Err(ParcelError::Underflow));
        assert_eq!(parcel.data_position(), 0);
    }

    #[test]
    fn failed_string_read_leaves_cursor() {
        let mut parcel = Parcel::new();
        parcel.write_string16("abcdefgh").unwrap();
        assert_eq!(parcel.read_string16::<4>(), Err(ParcelError::StringTooLong));
        assert_eq!(parcel.data_position(), 0);

        let mut truncated = Parcel::new();
        truncated.write_i32(100).unwrap();
        assert_eq!(truncated.read_string16::<256>(), Err(ParcelError::Underflow));
        assert_eq!(truncated.data_position(), 0);
    }

    #[test]
    fn null_string_reads_as_none() {
        let mut parcel = Parcel::new();
        parcel.write_i32(-1).unwrap();
        assert_eq!(parcel.read_string16::<8>(), Ok(None));
        assert_eq!(parcel.data_position(), 4);

        parcel.reset_read_pos();
        assert_eq!(
            parcel.read_interface_token::<8>(),
            Err(ParcelError::Underflow)
        );
        assert_eq!(parcel.data_position(), 0);
    }

    #[test]
    fn overflowing_writes_leave_parcel_unchanged() {
        let mut parcel = Parcel::new();
        parcel.write_data(&[0xAA; PARCEL_DATA_CAPACITY - 8]).unwrap();
        let before = parcel.data_size();

        assert_eq!(parcel.write_u64(1), Ok(()));
        assert_eq!(parcel.write_i32(1), Err(ParcelError::DataFull));
        assert_eq!(parcel.data_size(), before + 8);

        let mut parcel = Parcel::new();
        parcel.write_data(&[0; PARCEL_DATA_CAPACITY - 12]).unwrap();
        assert_eq!(parcel.write_string16("abcd"), Err(ParcelError::DataFull));
        assert_eq!(parcel.write_interface_token("ab"), Err(ParcelError::DataFull));
        assert_eq!(parcel.data_size(), PARCEL_DATA_CAPACITY - 12);
    }

    #[test]
    fn flattened_objects() {
        let mut parcel = Parcel::new();
        parcel.write_flattened_object(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(parcel.data_size(), 8 + 8);
        assert_eq!(parcel.read_flattened_object(), Ok(&[1u8, 2, 3, 4, 5][..]));

        let mut with_fds = Parcel::new();
        with_fds.write_i32(4).unwrap();
        with_fds.write_i32(1).unwrap();
        with_fds.write_u32(0).unwrap();
        assert_eq!(with_fds.read_flattened_object(), Err(ParcelError::FdsNotSupported));
        assert_eq!(with_fds.data_position(), 0);
    }

    #[test]
    fn objects_region_is_separate() {
        let mut parcel = Parcel::new();
        parcel.write_i32(9).unwrap();
        parcel.write_object(&[7; 6]).unwrap();
        assert_eq!(parcel.objects_size(), 8);
        assert_eq!(parcel.data_size(), 4);
        assert_eq!(parcel.read_object(6), Ok(&[7u8; 6][..]));
        assert_eq!(parcel.read_object(1), Err(ParcelError::Underflow));
        assert_eq!(parcel.read_i32(), Ok(9));
    }

    #[test]
    fn serialize_writes_header_then_regions() {
        let mut parcel = Parcel::new();
        parcel.write_i32(0x11).unwrap();
        parcel.write_i32(0x22).unwrap();
        parcel.write_object(&0x33u32.to_le_bytes()).unwrap();

        let mut staging = [0u8; PARCEL_STAGING_SIZE];
        let len = parcel.serialize_into(&mut staging).unwrap();
        assert_eq!(len, 16 + 8 + 4);
        assert_eq!(words(&staging[..len]), [8, 0x10, 4, 0x18, 0x11, 0x22, 0x33]);
    }

    #[test]
    fn serialize_rejects_oversized_parcel() {
        let mut parcel = Parcel::new();
        parcel.write_data(&[0; PARCEL_DATA_CAPACITY]).unwrap();
        let mut staging = [0u8; PARCEL_STAGING_SIZE];
        assert_eq!(parcel.serialize_into(&mut staging), Err(ParcelError::StagingTooSmall));
    }

    #[test]
    fn deserialize_round_trips() {
        let mut parcel = Parcel::new();
        parcel.write_interface_token("x").unwrap();
        parcel.write_u64(42).unwrap();
        let mut staging = [0u8; PARCEL_STAGING_SIZE];
        let len = parcel.serialize_into(&mut staging).unwrap();

        let mut reply = Parcel::new();
        reply.deserialize_from(&staging[..len]).unwrap();
        assert_eq!(reply.data(), parcel.data());
        assert_eq!(reply.read_interface_token::<8>().unwrap().as_str(), "x");
        assert_eq!(reply.read_u64(), Ok(42));
    }

    #[test]
    fn oversized_reply_is_rejected_without_copying() {
        let mut staging = [0u8; PARCEL_STAGING_SIZE];
        let header = ParcelHeader {
            data_size: U32::new(0x500),
            data_offset: U32::new(0x10),
            objects_size: U32::new(0),
            objects_offset: U32::new(0x510),
        };
        staging[..16].copy_from_slice(header.as_bytes());
        staging[16..].fill(0xEE);

        let mut reply = Parcel::new();
        reply.write_i32(77).unwrap();
        let err = reply.deserialize_from(&staging).unwrap_err();
        assert_eq!(err, ParcelError::ReplyOutOfBounds);
        assert!(err.is_protocol_violation());
        assert_eq!(err.to_rc(), LibnxError::BadInput.to_rc());

        assert_eq!(reply.data_size(), 4);
        assert_eq!(reply.read_i32(), Ok(77));
    }

    #[test]
    fn reply_region_past_received_bytes_is_rejected() {
        let header = ParcelHeader {
            data_size: U32::new(0x20),
            data_offset: U32::new(0x10),
            objects_size: U32::new(0),
            objects_offset: U32::new(0),
        };
        let mut short = [0u8; 0x20];
        short[..16].copy_from_slice(header.as_bytes());

        let mut reply = Parcel::new();
        assert_eq!(reply.deserialize_from(&short), Err(ParcelError::ReplyOutOfBounds));
        assert_eq!(reply.deserialize_from(&short[..8]), Err(ParcelError::ReplyOutOfBounds));
        assert_eq!(reply.data_size(), 0);
    }
}
