//! Swappable handle to the current topology snapshot.

use parking_lot::RwLock;
use std::sync::Arc;

use super::graph::TopologyGraph;
use super::source::TopologySource;
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};

#[derive(Debug)]
struct Versioned {
    version: u64,
    graph: Arc<TopologyGraph>,
}

/// Holder of the current topology snapshot.
///
/// Readers clone the `Arc` under a short read lock and then work on a
/// snapshot nobody can mutate. A reload builds the new graph outside the
/// lock and swaps the pointer, so readers see either the old or the new
/// snapshot, never a partial one.
#[derive(Debug)]
pub struct TopologyHandle {
    current: RwLock<Versioned>,
}

impl TopologyHandle {
    /// Wrap an initial snapshot as version 1.
    pub fn new(graph: TopologyGraph) -> Self {
        Self {
            current: RwLock::new(Versioned { version: 1, graph: Arc::new(graph) }),
        }
    }

    /// Build the initial snapshot from a source.
    pub fn from_source(source: &TopologySource) -> KernelResult<Self> {
        Ok(Self::new(source.build()?))
    }

    /// Load the initial snapshot from the configured topology document.
    pub fn from_config(config: &KernelConfig) -> KernelResult<Self> {
        let path = config
            .topology_path
            .as_ref()
            .ok_or_else(|| KernelError::validation("no topology path configured"))?;
        let handle = Self::from_source(&TopologySource::from_path(path)?)?;
        tracing::info!(
            path = %path.display(),
            fingerprint = %handle.current().fingerprint(),
            "topology loaded"
        );
        Ok(handle)
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<TopologyGraph> {
        Arc::clone(&self.current.read().graph)
    }

    /// Current snapshot together with its version.
    pub fn current_versioned(&self) -> (u64, Arc<TopologyGraph>) {
        let guard = self.current.read();
        (guard.version, Arc::clone(&guard.graph))
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Swap in a new snapshot. Returns its version.
    pub fn replace(&self, graph: TopologyGraph) -> u64 {
        let graph = Arc::new(graph);
        let fingerprint = graph.fingerprint().to_string();
        let (nodes, segments) = (graph.node_count(), graph.segment_count());

        let version = {
            let mut guard = self.current.write();
            guard.version += 1;
            guard.graph = graph;
            guard.version
        };

        tracing::info!(
            version,
            fingerprint = %fingerprint,
            nodes,
            segments,
            "topology snapshot replaced"
        );
        version
    }

    /// Rebuild from a source and swap it in.
    ///
    /// On a build failure the current snapshot stays in place.
    pub fn reload(&self, source: &TopologySource) -> KernelResult<u64> {
        let graph = source.build().map_err(|e| {
            tracing::warn!(error = %e, "topology reload rejected");
            e
        })?;
        Ok(self.replace(graph))
    }
}

impl Default for TopologyHandle {
    fn default() -> Self {
        Self::new(TopologyGraph::empty())
    }
}
