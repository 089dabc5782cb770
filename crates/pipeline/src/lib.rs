//! Conversion queue scheduler.
//!
//! Drives queued jobs through the Conversion Service one at a time:
//! - [`Scheduler`] -- single-concurrency executor over a
//!   [`JobQueue`](kenburns_core::queue::JobQueue).
//! - [`ProgressPoller`] -- per-handle polling state machine for deferred
//!   conversions.
//! - [`ConversionPort`] / [`CompletionSink`] -- the seams to the HTTP
//!   client and to whatever consumes finished clips.
//! - [`QueueEvent`] -- lifecycle notifications on a broadcast channel.

pub mod events;
pub mod poller;
pub mod ports;
pub mod scheduler;

pub use events::QueueEvent;
pub use poller::{PollStep, PollerConfig, ProgressPoller};
pub use ports::{Artifact, CompletionSink, ConversionPort, DeliveryError};
pub use scheduler::{Scheduler, SchedulerPhase};
