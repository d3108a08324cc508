//! Canvas execution runtime
//!
//! This crate owns everything that happens when a flow runs: the per-session
//! handler registry, path resolution over the edge list, the sequential
//! executor with its status transitions, and the session that ties a canvas
//! to its mounted handlers.

mod executor;
mod path;
mod registry;
mod session;

pub use executor::{ExecutorConfig, FlowExecutor, RunOutcome, RunReport};
pub use path::calculate_execution_path;
pub use registry::{
    MountContext, NodeCatalog, NodeFactory, NodeMetadata, NodeRegistry, Registration,
};
pub use session::{CanvasSession, RuntimeConfig};
