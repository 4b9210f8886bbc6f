//! Runtime core: admission, supervision and lifecycle.
//!
//! Public entry points are [`Hub`] / [`HubBuilder`], the two queues and the two
//! supervisors. Internal modules:
//! - [`settle`]: tagged outcome and single-assignment settlement;
//! - [`runner`]: one worker lifetime (spawn, timer, signals, kill) with event publishing;
//! - [`gate`]: semaphore cap on live workers;
//! - [`single_shot`] / [`streaming`]: the two supervisor protocols;
//! - [`admission`]: FIFO queue with bounded in-flight tasks;
//! - [`queue`]: admission queue + supervisor wiring;
//! - [`hub`] / [`builder`]: entry point, event fan-out, graceful shutdown;
//! - [`shutdown`]: OS termination signals.

mod admission;
mod builder;
mod gate;
mod hub;
mod queue;
mod runner;
mod settle;
mod shutdown;
mod single_shot;
mod streaming;

pub use admission::AdmissionQueue;
pub use builder::HubBuilder;
pub use gate::{ChildGate, ChildSlot};
pub use hub::{ExecutionMode, Hub, Response};
pub use queue::{SingleShotQueue, StreamingQueue};
pub use settle::{Outcome, Settlement};
pub use single_shot::SingleShotSupervisor;
pub use streaming::{ResponseStream, StreamingSupervisor};
