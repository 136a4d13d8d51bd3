//! Known result-code modules and descriptions.

use crate::result::{ResultCode, make_rc};

/// Lowers a typed error back into the raw result code the C side would see.
pub trait ToRawResultCode {
    /// Returns the raw result code for this error.
    fn to_rc(self) -> ResultCode;
}

/// Result code modules referenced by this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Module {
    /// Horizon kernel.
    Kernel = 1,
    /// Homebrew runtime (libnx-compatible codes).
    Libnx = 345,
}

/// Kernel result descriptions (module [`Module::Kernel`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KernelError {
    /// The calling thread is being terminated.
    TerminationRequested = 59,
    /// The kernel ran out of a resource (e.g. session requests).
    OutOfResource = 103,
    /// The handle is not valid in the caller's handle table.
    InvalidHandle = 114,
    /// The remote end of the session has been closed.
    SessionClosed = 123,
}

impl KernelError {
    /// Returns the error matching the given description, if known.
    pub const fn from_description(desc: u32) -> Option<Self> {
        match desc {
            59 => Some(Self::TerminationRequested),
            103 => Some(Self::OutOfResource),
            114 => Some(Self::InvalidHandle),
            123 => Some(Self::SessionClosed),
            _ => None,
        }
    }
}

impl ToRawResultCode for KernelError {
    fn to_rc(self) -> ResultCode {
        make_rc(Module::Kernel as u32, self as u32)
    }
}

/// Runtime result descriptions (module [`Module::Libnx`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LibnxError {
    /// Object was already initialized.
    AlreadyInitialized = 7,
    /// Object used before initialization.
    NotInitialized = 8,
    /// A caller precondition was violated.
    BadInput = 11,
    /// A CMIF response did not carry the expected magic.
    InvalidCmifOutHeader = 47,
}

impl ToRawResultCode for LibnxError {
    fn to_rc(self) -> ResultCode {
        make_rc(Module::Libnx as u32, self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_errors_round_trip_through_description() {
        for err in [
            KernelError::TerminationRequested,
            KernelError::OutOfResource,
            KernelError::InvalidHandle,
            KernelError::SessionClosed,
        ] {
            let rc = err.to_rc();
            assert_eq!(rc & 0x1FF, 1);
            assert_eq!(KernelError::from_description(rc >> 9), Some(err));
        }
    }

    #[test]
    fn bad_input_matches_libnx_code() {
        assert_eq!(LibnxError::BadInput.to_rc(), 0x1759);
    }
}
