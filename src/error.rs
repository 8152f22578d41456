//! Engine-injected error types.
//!
//! User errors never appear here: they travel purely as [`Signal`](crate::signal::Signal)s,
//! since the whole point of the type-tag approach is an open universe of
//! user types that this crate's own error enum must not try to enumerate.

use thiserror::Error;

/// Injected when a [`Promise`](crate::promise::Promise) is dropped while its
/// context is still fulfillable (someone could still receive a result) but
/// not yet ready (no value or error was ever set).
#[derive(Debug, Clone, Copy, Error)]
#[error("broken promise: dropped before it was fulfilled")]
pub struct BrokenPromise;
