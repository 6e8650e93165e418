//! # Hermes Core
//!
//! Core types and traits for the Hermes command-dispatch runtime.
//!
//! This crate provides the foundational types used throughout Hermes:
//!
//! - [`Command`] - Typed command with an associated output type
//! - [`CommandHandler`] - The terminal producer of a command's result
//! - [`CommandMetadata`] / [`ExecutionId`] - Immutable execution identity
//! - [`CommandContext`] - Per-execution mutable store with typed keys
//! - [`CancellationToken`] - Cooperative cancellation with deadlines
//! - [`Observer`] / [`ObserverRegistry`] - Lifecycle observation fan-out
//! - [`HermesError`] - Standard error taxonomy

#![doc(html_root_url = "https://docs.rs/hermes-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancellation;
mod command;
mod context;
mod error;
mod handler;
mod metadata;
mod observer;

pub use cancellation::CancellationToken;
pub use command::{Command, CommandEnvelope, OutputEnvelope};
pub use context::{CommandContext, ContextKey, ContextSnapshot};
pub use error::{
    CacheReason, ErrorCategory, ErrorDetail, ErrorEnvelope, HermesError, HermesResult,
    ResilienceReason, ValidationReason,
};
pub use handler::{CommandHandler, FnHandler};
pub use metadata::{CommandMetadata, ExecutionId};
pub use observer::{Observer, ObserverRegistry};
