//! # Hermes Metrics
//!
//! Self-contained statistics accumulators with windowed aggregation.
//!
//! This crate is independent of the dispatch core: accumulators consume
//! `(value, timestamp)` samples from any source — typically an observer or
//! execution-record side channel — and share nothing else with the runtime.
//!
//! - [`BasicStats`] - count/sum/min/max/last
//! - [`CounterAccumulator`] - monotonic totals with rate derivation
//! - [`HistogramAccumulator`] - percentile reservoir
//! - [`EwmaAccumulator`] - exponentially decayed mean and variance
//! - [`WindowedAccumulator`] - tumbling/sliding/decay/unbounded windows
//!   over any of the above

#![doc(html_root_url = "https://docs.rs/hermes-metrics/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod accumulator;
mod decay;
mod histogram;
mod window;

pub use accumulator::{
    Accumulator, BasicSnapshot, BasicStats, CounterAccumulator, CounterSnapshot, DecaySnapshot,
    HistogramSnapshot, Snapshot,
};
pub use decay::EwmaAccumulator;
pub use histogram::HistogramAccumulator;
pub use window::{AccumulatorFactory, WindowPolicy, WindowedAccumulator};
