//! Result codes returned by the kernel and by remote services.
//!
//! These codes are used to indicate the success or failure of various operations.
//! They are returned by syscalls and by the services on the other side of an IPC
//! session, and can be used to determine the cause of an error and the module
//! that caused the error.
//!
//! # Structure
//!
//! The 32-bit result code is structured as follows:
//!
//! - **Bits 0-8:** Module ID
//! - **Bits 9-21:** Description
//! - **Bits 22-31:** Reserved
//!
//! Zero is the only success value. Callers test for it rather than interpret
//! the internal structure; [`Error::module`] and [`Error::description`] exist
//! for diagnostics.
//!
//! # References
//! - [Switchbrew Wiki: Error Codes](https://switchbrew.org/wiki/Error_codes)

use core::num::NonZeroU32;

use crate::error::Module;

/// Type alias for Result with [`Error`] as the error type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The raw representation of a result code, containing both success and error states.
pub type ResultCode = u32;

/// Successful result code.
pub const SUCCESS: ResultCode = 0;

/// Mask for the module field (9 bits)
const MODULE_MASK: u32 = 0x1FF;
/// Mask for the description field (13 bits)
const DESCRIPTION_MASK: u32 = 0x1FFF;
/// Shift amount for the description field
const DESCRIPTION_SHIFT: u32 = 9;

/// Converts a raw status word into a [`Result`].
#[inline]
pub fn from_raw(rc: ResultCode) -> Result<()> {
    match Error::from_raw(rc) {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

/// The error type for Horizon OS result codes.
///
/// The result code is stored as a raw `u32` value, and it is guaranteed to be non-zero.
///
/// # Formatting
///
/// The error code is formatted as `2XXX-YYYY` where:
///  - `XXX` is `2000` + module number
///  - `YYYY` is the `description`
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Error(NonZeroU32);

impl Error {
    /// Wraps a raw result code. Returns `None` for the success value.
    #[inline]
    pub const fn from_raw(rc: ResultCode) -> Option<Self> {
        match NonZeroU32::new(rc) {
            Some(rc) => Some(Self(rc)),
            None => None,
        }
    }

    /// Builds an error from a module and a description.
    ///
    /// Returns `None` if both parts are zero, since that encodes success.
    #[inline]
    pub const fn from_parts(module: Module, description: u32) -> Option<Self> {
        Self::from_raw(make_rc(module as u32, description))
    }

    /// Returns the raw module ID of the error.
    #[inline]
    pub const fn module(&self) -> u32 {
        self.0.get() & MODULE_MASK
    }

    /// Returns the description value
    #[inline]
    pub const fn description(&self) -> u32 {
        (self.0.get() >> DESCRIPTION_SHIFT) & DESCRIPTION_MASK
    }

    /// Returns the raw value (`u32`) of this error code
    #[inline]
    pub const fn to_raw(self) -> ResultCode {
        self.0.get()
    }
}

impl core::fmt::Display for Error {
    /// Formats the error code as a `2XXX-YYYY` string.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:04}-{:04}", 2000 + self.module(), self.description())
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Error")
            .field("code", &format_args!("{}", self))
            .field("module", &self.module())
            .field("description", &self.description())
            .field("raw", &format_args!("{:#x}", self.to_raw()))
            .finish()
    }
}

impl core::error::Error for Error {}

/// Packs a module and a description into a raw result code.
#[inline]
pub const fn make_rc(module: u32, description: u32) -> ResultCode {
    (module & MODULE_MASK) | ((description & DESCRIPTION_MASK) << DESCRIPTION_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_not_an_error() {
        assert!(Error::from_raw(SUCCESS).is_none());
        assert!(from_raw(SUCCESS).is_ok());
    }

    #[test]
    fn splits_module_and_description() {
        let err = Error::from_raw(0xE401).expect("non-zero");
        assert_eq!(err.module(), 1);
        assert_eq!(err.description(), 114);
        assert_eq!(err.to_raw(), make_rc(1, 114));
    }

    #[test]
    fn displays_as_module_dash_description() {
        let err = Error::from_parts(Module::Kernel, 123).expect("non-zero");
        assert_eq!(format!("{err}"), "2001-0123");

        let err = Error::from_parts(Module::Libnx, 11).expect("non-zero");
        assert_eq!(format!("{err}"), "2345-0011");
    }

    #[test]
    fn opaque_codes_propagate_unchanged() {
        let err = from_raw(0xDEAD_BEEF).unwrap_err();
        assert_eq!(err.to_raw(), 0xDEAD_BEEF);
    }
}
