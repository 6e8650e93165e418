//! # Hermes
//!
//! **Async command-dispatch runtime for the Themis Platform**
//!
//! Hermes routes typed commands to per-type handlers through a
//! priority-ordered middleware onion, with bounded concurrency,
//! cooperative cancellation, and retry + circuit-breaker resilience:
//!
//! - 🚌 **Type-indexed bus** – one pipeline per command type, resolved by
//!   type identity with a monomorphic handler path
//! - 🧅 **Priority middleware chain** – stable-ordered stages wrap every
//!   execution on the way in and out
//! - 🚦 **Back-pressure** – FIFO semaphore with suspend/error/drop
//!   strategies and RAII permits
//! - 🔁 **Resilience** – retry policies with capped and jittered delays,
//!   plus a three-state circuit breaker
//! - 📊 **Diagnostics** – execution records, pipeline inspection, and
//!   standalone metrics accumulators
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hermes::prelude::*;
//!
//! struct AddNumbers { a: i64, b: i64 }
//!
//! impl Command for AddNumbers {
//!     type Output = i64;
//! }
//!
//! struct AddNumbersHandler;
//!
//! impl CommandHandler<AddNumbers> for AddNumbersHandler {
//!     async fn handle(
//!         &self,
//!         command: AddNumbers,
//!         _ctx: &CommandContext,
//!     ) -> Result<i64, HermesError> {
//!         Ok(command.a + command.b)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), HermesError> {
//!     let bus = CommandBus::builder().build();
//!     bus.register::<AddNumbers, _>(AddNumbersHandler)?;
//!
//!     let sum = bus.send(AddNumbers { a: 5, b: 3 }).await?;
//!     assert_eq!(sum, 8);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! Every dispatch flows through the same path:
//!
//! ```text
//! Command → Gate → Breaker → M(100) → M(300) → M(500) → Handler
//!                                                           ↓
//! Result  ← Record ←──────── M(100) ← M(300) ← M(500) ←────┘
//! ```

#![doc(html_root_url = "https://docs.rs/hermes/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use hermes_core as core;

// Re-export middleware types
pub use hermes_middleware as middleware;

// Re-export resilience types
pub use hermes_resilience as resilience;

// Re-export the bus
pub use hermes_bus as bus;

// Re-export diagnostics
pub use hermes_observability as observability;

// Re-export metrics accumulators
pub use hermes_metrics as metrics;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use hermes_bus::{
        BackPressureStrategy, CommandBus, DispatchOptions, GateStats, SanitizedBus,
    };
    pub use hermes_core::{
        CancellationToken, Command, CommandContext, CommandHandler, CommandMetadata, ContextKey,
        ExecutionId, HermesError, HermesResult, Observer, ObserverRegistry,
    };
    pub use hermes_middleware::{
        BoxFuture, Middleware, MiddlewareResult, Next, Pipeline, Priority,
    };
    pub use hermes_observability::{
        ExecutionRecord, ExecutionRecorder, PipelineInspector, RecorderConfig,
    };
    pub use hermes_resilience::{
        CircuitBreaker, CircuitBreakerConfig, DelayStrategy, RetryPolicy,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    struct Echo(String);

    impl Command for Echo {
        type Output = String;
    }

    struct EchoHandler;

    impl CommandHandler<Echo> for EchoHandler {
        async fn handle(
            &self,
            command: Echo,
            _ctx: &CommandContext,
        ) -> Result<String, HermesError> {
            Ok(command.0)
        }
    }

    #[tokio::test]
    async fn test_prelude_covers_basic_dispatch() {
        let bus = CommandBus::builder().options(DispatchOptions::unlimited()).build();
        bus.register::<Echo, _>(EchoHandler).unwrap();

        let output = bus.send(Echo("hello".to_string())).await.unwrap();
        assert_eq!(output, "hello");
    }
}
