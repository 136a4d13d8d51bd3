//! Binder Protocol over IHOSBinderDriverRelay.
//!
//! This crate provides the client side of the Android-style Binder protocol
//! Horizon's display services speak (e.g. `IGraphicBufferProducer`):
//! - [`Parcel`] encoding and decoding
//! - relay commands: parcel transactions, reference counting, native handles
//! - [`Binder`] sessions: strong/weak acquisition, transactions, teardown
//!
//! The relay session itself comes from SM (see [`relay::open`]) and is shared
//! by every binder on it. Every operation takes the transport as an argument.

#![cfg_attr(not(test), no_std)]

pub mod binder;
pub mod config;
pub mod parcel;
mod proto;
pub mod relay;
pub mod types;

pub use self::{
    binder::{
        Binder, BinderError, BinderState, ExitError, InitError, TransactError, TransactMode,
    },
    config::{BinderConfig, COMBINED_TRANSACT_MIN_VERSION},
    parcel::{
        PARCEL_DATA_CAPACITY, PARCEL_OBJECTS_CAPACITY, PARCEL_STAGING_SIZE, Parcel, ParcelError,
        ParcelHeader,
    },
    proto::{INTERFACE_TOKEN_STRICT_MODE, RELAY_SERVICE_NAME, relay_cmds},
    relay::{AdjustRefcountError, GetNativeHandleError, TransactArgs, TransactParcelError},
    types::{BinderObjectId, RefKind},
};
