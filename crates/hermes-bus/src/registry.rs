//! Type-indexed pipeline registry.
//!
//! Pipelines are stored keyed by their command's [`TypeId`]. Registration
//! is rare and exclusive per type; lookups sit on the dispatch hot path and
//! go through a sharded map.

use dashmap::DashMap;
use hermes_core::{Command, HermesError, HermesResult};
use hermes_middleware::{DynPipeline, PipelineSnapshot};
use std::any::TypeId;
use std::sync::Arc;

/// Registry mapping command type identity to its bound pipeline.
#[derive(Default)]
pub(crate) struct PipelineRegistry {
    pipelines: DashMap<TypeId, Arc<dyn DynPipeline>>,
}

impl PipelineRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Binds a pipeline to command type `C`.
    ///
    /// Fails with `AlreadyRegistered` when the type is already bound.
    pub(crate) fn insert<C: Command>(&self, pipeline: Arc<dyn DynPipeline>) -> HermesResult<()> {
        match self.pipelines.entry(TypeId::of::<C>()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(HermesError::already_registered(C::name()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(pipeline);
                Ok(())
            }
        }
    }

    /// Resolves the pipeline for command type `C`.
    pub(crate) fn get<C: Command>(&self) -> Option<Arc<dyn DynPipeline>> {
        self.pipelines
            .get(&TypeId::of::<C>())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Applies a closure to every registered pipeline.
    pub(crate) fn for_each(&self, mut f: impl FnMut(&Arc<dyn DynPipeline>)) {
        for entry in self.pipelines.iter() {
            f(entry.value());
        }
    }

    /// Describes every registered pipeline.
    pub(crate) fn describe_all(&self) -> Vec<PipelineSnapshot> {
        let mut snapshots: Vec<PipelineSnapshot> = self
            .pipelines
            .iter()
            .map(|entry| entry.value().describe())
            .collect();
        snapshots.sort_by(|a, b| a.command.cmp(&b.command));
        snapshots
    }

    pub(crate) fn len(&self) -> usize {
        self.pipelines.len()
    }
}
