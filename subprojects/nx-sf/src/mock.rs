//! An in-memory [`Transport`] driven by a closure playing the server.
//!
//! The closure receives the session and the request buffer, and writes its
//! reply into the same buffer (see [`cmif::parse_request`] and
//! [`cmif::make_response`]). Buffers referenced by descriptors are plain
//! client memory on the same thread; [`client_bytes`] and
//! [`client_bytes_mut`] give the server access to them the way the kernel
//! would.
//!
//! [`cmif::parse_request`]: crate::cmif::parse_request
//! [`cmif::make_response`]: crate::cmif::make_response

use core::cell::{Cell, RefCell};

use heapless::Vec;
use nx_svc::{
    ipc::{CloseHandleError, Handle as SessionHandle, SendSyncError},
    raw::{Handle as RawHandle, INVALID_HANDLE},
};

use crate::{hipc::MessageBuffer, transport::Transport};

/// Maximum number of closed handles remembered by a [`MockTransport`].
pub const MAX_CLOSED: usize = 16;

/// Number of address bits a static descriptor keeps.
const STATIC_ADDRESS_BITS: u32 = 42;

/// A transport that hands every request to `server`.
pub struct MockTransport<F> {
    server: RefCell<F>,
    calls: Cell<usize>,
    fail_next: Cell<Option<SendSyncError>>,
    fail_next_close: Cell<Option<CloseHandleError>>,
    closed: RefCell<Vec<RawHandle, MAX_CLOSED>>,
}

impl<F> MockTransport<F>
where
    F: FnMut(SessionHandle, &mut MessageBuffer) -> Result<(), SendSyncError>,
{
    /// Creates a transport backed by `server`.
    pub fn new(server: F) -> Self {
        Self {
            server: RefCell::new(server),
            calls: Cell::new(0),
            fail_next: Cell::new(None),
            fail_next_close: Cell::new(None),
            closed: RefCell::new(Vec::new()),
        }
    }

    /// Number of requests sent so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Makes the next send fail with `err` without reaching the server.
    pub fn fail_next(&self, err: SendSyncError) {
        self.fail_next.set(Some(err));
    }

    /// Makes the next handle close fail with `err`. The handle is not
    /// recorded as closed.
    pub fn fail_next_close(&self, err: CloseHandleError) {
        self.fail_next_close.set(Some(err));
    }

    /// Handles closed so far, in order.
    pub fn closed_handles(&self) -> Vec<RawHandle, MAX_CLOSED> {
        self.closed.borrow().clone()
    }
}

impl<F> Transport for MockTransport<F>
where
    F: FnMut(SessionHandle, &mut MessageBuffer) -> Result<(), SendSyncError>,
{
    fn send_sync_request(
        &self,
        session: SessionHandle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        self.calls.set(self.calls.get() + 1);
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        if !session.is_valid() {
            return Err(SendSyncError::InvalidHandle);
        }
        (self.server.borrow_mut())(session, msg)
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), CloseHandleError> {
        if handle == INVALID_HANDLE {
            return Err(CloseHandleError::InvalidHandle);
        }
        if let Some(err) = self.fail_next_close.take() {
            return Err(err);
        }
        // Overflowing the log is a test setup bug, not a transport failure.
        let _ = self.closed.borrow_mut().push(handle);
        Ok(())
    }
}

/// Restores the bits a static descriptor drops from a stack address.
///
/// Static descriptors keep only 42 address bits. The missing high bits are
/// taken from a local of the calling thread, so this only works for buffers
/// on the same thread's stack.
pub fn stack_address(truncated: u64) -> u64 {
    let probe = 0u8;
    let base = core::ptr::addr_of!(probe) as u64;
    let mask = (1u64 << STATIC_ADDRESS_BITS) - 1;
    (base & !mask) | (truncated & mask)
}

/// Views client memory described by a descriptor.
///
/// # Safety
///
/// `addr..addr + len` must be a live client buffer referenced by the request
/// being served, and must not be written by anyone else while the returned
/// slice is in use.
pub unsafe fn client_bytes<'b>(addr: u64, len: usize) -> &'b [u8] {
    if len == 0 {
        return &[];
    }
    // SAFETY: Guaranteed by the caller.
    unsafe { core::slice::from_raw_parts(addr as usize as *const u8, len) }
}

/// Views client memory described by a descriptor, for writing.
///
/// # Safety
///
/// Same as [`client_bytes`], and the region must not be accessed through any
/// other path while the returned slice is in use.
pub unsafe fn client_bytes_mut<'b>(addr: u64, len: usize) -> &'b mut [u8] {
    if len == 0 {
        return &mut [];
    }
    // SAFETY: Guaranteed by the caller.
    unsafe { core::slice::from_raw_parts_mut(addr as usize as *mut u8, len) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_calls_and_injects_failures() {
        let transport = MockTransport::new(|_, _| Ok(()));
        let mut msg = MessageBuffer::new();
        // SAFETY: test-only value.
        let session = unsafe { SessionHandle::from_raw(1) };

        transport.fail_next(SendSyncError::OutOfResource);
        assert_eq!(
            transport.send_sync_request(session, &mut msg),
            Err(SendSyncError::OutOfResource)
        );
        assert_eq!(transport.send_sync_request(session, &mut msg), Ok(()));
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn invalid_session_is_rejected() {
        let transport = MockTransport::new(|_, _| Ok(()));
        let mut msg = MessageBuffer::new();
        // SAFETY: test-only value.
        let session = unsafe { SessionHandle::from_raw(INVALID_HANDLE) };
        assert_eq!(
            transport.send_sync_request(session, &mut msg),
            Err(SendSyncError::InvalidHandle)
        );
    }

    #[test]
    fn records_closed_handles() {
        let transport = MockTransport::new(|_, _| Ok(()));
        transport.close_handle(5).unwrap();
        transport.close_handle(6).unwrap();
        assert_eq!(transport.close_handle(INVALID_HANDLE), Err(CloseHandleError::InvalidHandle));
        assert_eq!(transport.closed_handles().as_slice(), &[5, 6]);
    }

    #[test]
    fn stack_address_recovers_truncated_bits() {
        let buf = [0u8; 16];
        let addr = buf.as_ptr() as u64;
        let truncated = addr & ((1 << STATIC_ADDRESS_BITS) - 1);
        assert_eq!(stack_address(truncated), addr);
    }
}
