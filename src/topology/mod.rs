//! Plant topology: snapshot graph, swappable handle, and source documents.
//!
//! ```text
//! TopologySource (JSON) → TopologyGraph (immutable) → TopologyHandle (Arc swap)
//! ```

pub mod graph;
pub mod handle;
pub mod source;

pub use graph::{NodeRecord, SegmentRecord, TopologyGraph};
pub use handle::TopologyHandle;
pub use source::TopologySource;
