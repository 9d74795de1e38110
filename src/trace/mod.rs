//! Graph capture of a policy's forward pass and replay of the captured graph.

mod graph;
mod module;
mod tracer;

pub use graph::{GraphInput, GraphOutput, Node, Op, TracedGraph, GRAPH_FORMAT_VERSION};
pub use module::TracedModule;
pub use tracer::{trace_policy, Symbol, Tracer};
