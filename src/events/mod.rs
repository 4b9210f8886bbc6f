//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `AdmissionQueue`, `ChildGate`, the worker runner, `Hub`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the hub's subscriber listener (fans out to `SubscriberSet`)
//!   and any receiver from `Hub::subscribe()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
