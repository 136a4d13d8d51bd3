//! Raw _Supervisor Call (SVC)_ API.
//!
//! Only the handle types and the two SVCs the IPC layer dispatches through.

#[cfg(target_os = "horizon")]
use crate::result::ResultCode;

/// A raw handle type.
///
/// Alias for `u32`.
pub type Handle = u32;

/// Invalid handle
pub const INVALID_HANDLE: Handle = 0;

/// Closes a handle, decrementing the reference count of the corresponding kernel object.
pub const CLOSE_HANDLE: u16 = 0x16;

/// Sends a synchronous IPC request via the calling thread's TLS buffer.
pub const SEND_SYNC_REQUEST: u16 = 0x21;

/// Closes a handle, decrementing the reference count of the corresponding kernel object.
///
/// `Result svcCloseHandle(Handle handle);`
///
/// Syscall code: [CLOSE_HANDLE] (`0x16`).
///
/// Ref: <https://switchbrew.org/wiki/SVC#CloseHandle>
///
/// # Safety
///
/// The caller must ensure that `handle` is a valid kernel handle owned by the current process.
#[cfg(target_os = "horizon")]
#[unsafe(naked)]
pub unsafe extern "C" fn close_handle(handle: Handle) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}", // Issue the SVC call with immediate value 0x16
        "ret",
        code = const CLOSE_HANDLE,
    );
}

/// Sends an IPC synchronization request to a session.
///
/// `Result svcSendSyncRequest(Handle session);`
///
/// Syscall code: [SEND_SYNC_REQUEST] (`0x21`).
///
/// The request is read from, and the reply written to, the first 0x100 bytes
/// of the calling thread's Thread Local Region.
///
/// Ref: <https://switchbrew.org/wiki/SVC#SendSyncRequest>
///
/// # Safety
///
/// The caller must ensure that `session` is a valid kernel session handle owned by the current process.
#[cfg(target_os = "horizon")]
#[unsafe(naked)]
pub unsafe extern "C" fn send_sync_request(session: Handle) -> ResultCode {
    core::arch::naked_asm!(
        "svc {code}", // Issue the SVC call with immediate value 0x21
        "ret",
        code = const SEND_SYNC_REQUEST,
    );
}

