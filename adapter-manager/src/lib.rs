//! Adapter manager: polling lifecycle and outbound operations.
//!
//! The switchboard crate provides the generic machinery (credentials,
//! rate limiting, dispatch, webhook verification); this crate provides
//! the platform adapters and the processes that drive them:
//!
//! - [`Adapter`]: trait a platform integration implements, with an
//!   operation table for outbound calls, a poll implementation for
//!   inbound streams, and payload normalization
//! - [`PollScheduler`]: per-adapter poll-diff-emit loop with cursor
//!   tracking (at-least-once delivery)
//! - [`AdapterManager`]: starts and supervises schedulers, discovering
//!   newly credentialed adapters at runtime
//! - [`EventSink`]: where normalized events are delivered
//! - `api`: HTTP surface for executing operations and reading poll
//!   status

mod adapter;
pub mod adapters;
pub mod api;
pub mod manager;
pub mod registry;
pub mod scheduler;
pub mod sink;

pub use adapter::{Adapter, PolledItem};
pub use manager::AdapterManager;
pub use scheduler::{PollScheduler, PollStatus};
pub use sink::{EventSink, HttpEventSink};

// Re-exported for adapter implementations and wiring
pub use switchboard::credentials::Credentials;
pub use switchboard::event::NormalizedEvent;
