// Normalized event model and validation
pub mod event;

// Error taxonomy shared across the crate
pub mod error;

// Configuration loading
pub mod config;

// Encrypted credential storage and OAuth refresh
pub mod credentials;

// Keyed rate-limit windows
pub mod rate_limit;

// Inbound webhook signature verification
pub mod webhook;

// Poll cursor persistence
pub mod cursor;

// Operation descriptor table and dispatch
pub mod dispatch;

// Outbound request execution (rate gate, auth, retry)
pub mod executor;

// HTTP APIs
pub mod api;
