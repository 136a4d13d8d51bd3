//! The dispatcher: moves a built message across a session and back.
//!
//! Everything above this module is pure encoding. The actual send goes
//! through the [`Transport`] trait so the kernel call can be swapped for an
//! in-memory server in tests.
//!
//! A send blocks until the server replies. There is no timeout and no retry:
//! a failure is handed back verbatim, since only the caller knows whether
//! the command is safe to repeat.

use nx_svc::{
    ipc::{CloseHandleError, Handle as SessionHandle, SendSyncError},
    raw::Handle as RawHandle,
};

use crate::{cmif::PreparedRequest, hipc::MessageBuffer};

/// A channel able to carry one synchronous request at a time.
pub trait Transport {
    /// Sends the request in `msg` on `session` and blocks until the reply
    /// has been written back into `msg`.
    fn send_sync_request(
        &self,
        session: SessionHandle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError>;

    /// Closes a kernel handle.
    fn close_handle(&self, handle: RawHandle) -> Result<(), CloseHandleError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send_sync_request(
        &self,
        session: SessionHandle,
        msg: &mut MessageBuffer,
    ) -> Result<(), SendSyncError> {
        (**self).send_sync_request(session, msg)
    }

    fn close_handle(&self, handle: RawHandle) -> Result<(), CloseHandleError> {
        (**self).close_handle(handle)
    }
}

/// Dispatches a prepared request and hands back the buffer holding the
/// reply.
///
/// The buffers borrowed by the request stay borrowed for as long as the
/// returned reply is alive.
pub fn dispatch<'a, T: Transport + ?Sized>(
    transport: &T,
    session: SessionHandle,
    request: PreparedRequest<'a>,
) -> Result<&'a mut MessageBuffer, SendSyncError> {
    let msg = request.into_message();
    transport.send_sync_request(session, msg)?;
    Ok(msg)
}

#[cfg(target_os = "horizon")]
pub use kernel::KernelTransport;

#[cfg(target_os = "horizon")]
mod kernel {
    use core::{arch::asm, ptr};

    use nx_svc::{
        ipc::{CloseHandleError, Handle as SessionHandle, SendSyncError},
        raw::{self, Handle as RawHandle},
    };

    use super::Transport;
    use crate::hipc::{MESSAGE_BUFFER_SIZE, MessageBuffer};

    /// Sends requests through `svcSendSyncRequest` on the calling thread's
    /// TLS IPC buffer.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct KernelTransport;

    /// Returns the start of the thread's TLS, whose first 0x100 bytes are the
    /// IPC message area.
    #[inline]
    fn ipc_buffer() -> *mut u8 {
        let tls_ptr: *mut u8;
        // SAFETY: Reading TPIDRRO_EL0 has no side effects; the kernel keeps it
        // pointing at the current thread's TLS.
        unsafe {
            asm!("mrs {:x}, tpidrro_el0", out(reg) tls_ptr, options(nostack, nomem));
        }
        tls_ptr
    }

    impl Transport for KernelTransport {
        fn send_sync_request(
            &self,
            session: SessionHandle,
            msg: &mut MessageBuffer,
        ) -> Result<(), SendSyncError> {
            let tls = ipc_buffer();
            // SAFETY: The TLS IPC area is MESSAGE_BUFFER_SIZE bytes, owned by
            // this thread and never aliased by `msg`.
            unsafe {
                ptr::copy_nonoverlapping(msg.as_bytes().as_ptr(), tls, MESSAGE_BUFFER_SIZE);
            }

            // SAFETY: The message has been placed in the TLS IPC area.
            let rc = unsafe { raw::send_sync_request(session.to_raw()) };

            // SAFETY: Same region as above, now holding the reply.
            unsafe {
                ptr::copy_nonoverlapping(tls, msg.as_bytes_mut().as_mut_ptr(), MESSAGE_BUFFER_SIZE);
            }

            SendSyncError::check(rc)
        }

        fn close_handle(&self, handle: RawHandle) -> Result<(), CloseHandleError> {
            // SAFETY: Closing an arbitrary handle value cannot corrupt memory;
            // invalid values are reported by the kernel.
            let rc = unsafe { raw::close_handle(handle) };
            CloseHandleError::check(rc)
        }
    }
}
