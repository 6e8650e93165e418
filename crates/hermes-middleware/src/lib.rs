//! # Hermes Middleware
//!
//! Middleware contract and pipeline implementation for the Hermes runtime.
//!
//! Middleware composes as an onion around each command's handler: stages run
//! in ascending [`Priority`] order on the way in and in reverse on the way
//! out. The [`Pipeline`] owns one handler plus its stable-sorted chain; the
//! [`DynPipeline`] facade lets the bus store pipelines for many command
//! types in one registry.
//!
//! ```text
//! Command → M(100) → M(300) → M(500) → Handler
//!                                         ↓
//! Result  ← M(100) ← M(300) ← M(500) ←───┘
//! ```

#![doc(html_root_url = "https://docs.rs/hermes-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod middleware;
mod pipeline;
mod priority;
pub mod stages;

pub use middleware::{BoxFuture, FnMiddleware, Middleware, MiddlewareResult, MiddlewareTrace, Next};
pub use pipeline::{DynPipeline, MiddlewareDescriptor, Pipeline, PipelineSnapshot};
pub use priority::{Priority, PriorityBand};
