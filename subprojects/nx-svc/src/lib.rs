//! # nx-svc
//!
//! The kernel ABI surface the IPC layers are built on: raw handles, result
//! codes, the client session handle type and the error types of the two
//! _Supervisor Calls_ (SVCs) the marshaling core depends on,
//! `svcSendSyncRequest` and `svcCloseHandle`.
//!
//! The SVC trampolines themselves are only compiled for the Horizon target.
//! Everywhere else (host tests included) the transport is injected by the
//! caller, see `nx_sf::transport`.
//!
//! ## References:
//! - [Switchbrew Wiki: SVC](https://switchbrew.org/wiki/SVC)
//! - [Switchbrew Wiki: Error Codes](https://switchbrew.org/wiki/Error_codes)

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod handle;

pub mod error;
pub mod ipc;
pub mod raw;
pub mod result;
pub mod version;
