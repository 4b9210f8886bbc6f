//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for plugging custom event handlers
//! (metrics, audit trails, alerts) into the hub.
//!
//! Each subscriber gets a dedicated worker task and a bounded queue; a slow or
//! panicking subscriber only affects itself.
//!
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → EventKind::SubscriberPanicked
//! ```
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use actionvisor::{Event, EventKind, Subscribe};
//!
//! struct TimeoutCounter;
//!
//! #[async_trait]
//! impl Subscribe for TimeoutCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::TimeoutHit) {
//!             // bump a counter, page someone, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "timeouts" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; panics are caught and reported.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event. Events arrive in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue capacity for this subscriber (clamped to at least 1).
    ///
    /// When full, new events are dropped for this subscriber only and
    /// `EventKind::SubscriberOverflow` is published.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
