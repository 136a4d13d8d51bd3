//! Service Framework (SF) for Nintendo Switch
//!
//! This crate implements the **Service Framework**, the IPC serialization
//! layer used by Horizon OS services. The name "SF" comes from the CMIF
//! protocol's magic headers: `"SFCI"` (Service Framework Command Input) and
//! `"SFCO"` (Service Framework Command Output).
//!
//! # Architecture
//!
//! The IPC stack on Horizon OS is layered:
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Service APIs (sm, binder)  │  Application layer
//! ├─────────────────────────────┤
//! │  CMIF                       │  Command serialization (SF layer)
//! ├─────────────────────────────┤
//! │  HIPC                       │  Message framing & descriptors
//! ├─────────────────────────────┤
//! │  Transport                  │  SendSyncRequest, or a test double
//! └─────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`hipc`]: bit-exact message framing, descriptors and handles.
//! - [`cmif`]: the command builder and the response parser.
//! - [`transport`]: the [`Transport`](transport::Transport) seam and the
//!   dispatcher.
//! - [`service`]: session wrapper and control requests.
//! - `mock` (feature `mock`): an in-memory transport for tests.
//!
//! Messages are built in caller-owned buffers, never in global state, so any
//! number of sessions can be driven in parallel.

#![cfg_attr(not(test), no_std)]

pub mod cmif;
pub mod hipc;
pub mod service;
mod service_name;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use service_name::ServiceName;
