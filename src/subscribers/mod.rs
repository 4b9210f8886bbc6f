//! # Event subscribers.
//!
//! [`Subscribe`] is the plug-in point for reacting to runtime events;
//! [`SubscriberSet`] fans events out to subscribers without blocking publishers.
//!
//! ```text
//! Bus ──► hub listener ──┬──► SubscriberSet ──► LogWriter / custom subscribers
//!                        └──► LiveWorkers (stuck-worker report on shutdown)
//! ```
//!
//! Built-in:
//! - [`LogWriter`]: structured `tracing` output for every event
//! - [`LiveWorkers`]: which tasks currently own a worker process

mod alive;
mod log;
mod set;
mod subscriber;

pub use alive::LiveWorkers;
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
