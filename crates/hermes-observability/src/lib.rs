//! # Hermes Observability
//!
//! Execution recording and pipeline inspection for the Hermes runtime.
//!
//! - [`ExecutionRecord`] / [`ExecutionRecorder`] - a bounded ring of
//!   per-dispatch diagnostic records with lifetime counters
//! - [`QueuedObserver`] - bounded-queue offloading for slow observers
//! - [`PipelineInspector`] - ASCII chain diagrams and snapshot diffs

#![doc(html_root_url = "https://docs.rs/hermes-observability/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod inspector;
mod queued;
mod record;
mod recorder;

pub use inspector::{OrderChange, PipelineInspector, SnapshotDiff};
pub use queued::{EventSink, ObserverEvent, QueuedObserver};
pub use record::ExecutionRecord;
pub use recorder::{ExecutionRecorder, RecorderConfig, RecorderStats};
