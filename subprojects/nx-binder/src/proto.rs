//! IHOSBinderDriverRelay protocol constants and argument layouts.

use core::mem::size_of;

use nx_sf::ServiceName;
use static_assertions::const_assert_eq;
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout,
    little_endian::{I32, U32},
};

/// Name of the binder driver service registered with SM.
pub const RELAY_SERVICE_NAME: ServiceName = ServiceName::new_truncate("dispdrv");

/// IHOSBinderDriverRelay command IDs.
pub mod relay_cmds {
    /// Parcel transaction over mapped buffers.
    pub const TRANSACT_PARCEL: u32 = 0;
    /// Adjust a weak or strong reference count.
    pub const ADJUST_REFCOUNT: u32 = 1;
    /// Get a native (event) handle for a binder object.
    pub const GET_NATIVE_HANDLE: u32 = 2;
    /// Parcel transaction over auto-select buffers (3.0.0+).
    pub const TRANSACT_PARCEL_AUTO: u32 = 3;
}

/// Marker written in front of every interface token (strict mode policy).
pub const INTERFACE_TOKEN_STRICT_MODE: i32 = 0x100;

/// Arguments of `TransactParcel` and `TransactParcelAuto`.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct TransactParcelIn {
    /// Binder object ID.
    pub session_id: I32,
    /// Transaction code.
    pub code: U32,
    /// Transaction flags.
    pub flags: U32,
}

const_assert_eq!(size_of::<TransactParcelIn>(), 12);

/// Arguments of `AdjustRefcount`.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct AdjustRefcountIn {
    /// Binder object ID.
    pub session_id: I32,
    /// Amount to add (+1 or -1).
    pub addval: I32,
    /// Reference kind (0 weak, 1 strong).
    pub kind: I32,
}

const_assert_eq!(size_of::<AdjustRefcountIn>(), 12);

/// Arguments of `GetNativeHandle`.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct GetNativeHandleIn {
    /// Binder object ID.
    pub session_id: I32,
    /// Which handle to fetch.
    pub selector: U32,
}

const_assert_eq!(size_of::<GetNativeHandleIn>(), 8);
