//! # Hermes Bus
//!
//! The type-indexed command bus for the Hermes runtime.
//!
//! - [`CommandBus`] - registry of per-type pipelines, global middleware,
//!   and the dispatch path (gate → breaker → pipeline → recorder)
//! - [`ConcurrencyGate`] - FIFO back-pressure semaphore with RAII permits
//! - [`DispatchOptions`] / [`BackPressureStrategy`] - concurrency limits
//!   and the behaviour at capacity
//! - [`SanitizedBus`] - decorator exposing the secure error surface

#![doc(html_root_url = "https://docs.rs/hermes-bus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bus;
mod gate;
mod options;
mod registry;
mod sanitize;

pub use bus::{CommandBus, CommandBusBuilder};
pub use gate::{ConcurrencyGate, GatePermit, GateStats};
pub use options::{BackPressureStrategy, DispatchOptions};
pub use sanitize::SanitizedBus;
