use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::fs::write_atomic;
use crate::model::ops::Activation;

/// Bumped whenever the serialized layout changes.
pub const GRAPH_FORMAT_VERSION: u32 = 1;

/// A recorded forward pass with weights inlined.
///
/// Nodes are stored in execution order; every operand refers to an earlier
/// node. All values are 2-D `[rows, cols]`, with rows fixed to `batch_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedGraph {
    pub version: u32,
    pub batch_size: usize,
    pub inputs: Vec<GraphInput>,
    pub nodes: Vec<Node>,
    pub outputs: Vec<GraphOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub name: String,
    pub shape: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphOutput {
    pub name: String,
    pub node: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub op: Op,
    pub shape: [usize; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Input {
        index: usize,
    },
    /// `input @ weight + bias`; `weight` is row-major `[d_in, d_out]`.
    Linear {
        input: usize,
        d_in: usize,
        d_out: usize,
        weight: Vec<f32>,
        bias: Option<Vec<f32>>,
    },
    Activation {
        input: usize,
        kind: Activation,
    },
    Add {
        lhs: usize,
        rhs: usize,
    },
    Sub {
        lhs: usize,
        rhs: usize,
    },
    Mul {
        lhs: usize,
        rhs: usize,
    },
    ArgMax {
        input: usize,
    },
}

impl Op {
    fn operands(&self) -> Vec<usize> {
        match self {
            Op::Input { .. } => Vec::new(),
            Op::Linear { input, .. } | Op::Activation { input, .. } | Op::ArgMax { input } => {
                vec![*input]
            }
            Op::Add { lhs, rhs } | Op::Sub { lhs, rhs } | Op::Mul { lhs, rhs } => {
                vec![*lhs, *rhs]
            }
        }
    }
}

impl TracedGraph {
    /// Serialize to MessagePack at `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let bytes = rmp_serde::to_vec_named(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let bytes = fs::read(path)?;
        let graph: TracedGraph =
            rmp_serde::from_slice(&bytes).map_err(|e| GraphError::Decode {
                path: path.to_path_buf(),
                source: e,
            })?;
        graph.validate()?;
        Ok(graph)
    }

    /// Check the structural invariants a replay relies on.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.version != GRAPH_FORMAT_VERSION {
            return Err(GraphError::UnsupportedVersion {
                expected: GRAPH_FORMAT_VERSION,
                found: self.version,
            });
        }
        if let Some(input) = self.inputs.iter().find(|i| i.shape[0] != self.batch_size) {
            return Err(GraphError::Malformed(format!(
                "input '{}' has {} rows, graph batch size is {}",
                input.name, input.shape[0], self.batch_size
            )));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(bad) = node.op.operands().into_iter().find(|&o| o >= i) {
                return Err(GraphError::Malformed(format!(
                    "node {i} refers to node {bad} which is not computed before it"
                )));
            }
            match &node.op {
                Op::Input { index } if *index >= self.inputs.len() => {
                    return Err(GraphError::Malformed(format!(
                        "node {i} reads input {index} of {}",
                        self.inputs.len()
                    )));
                }
                Op::Linear {
                    d_in,
                    d_out,
                    weight,
                    bias,
                    ..
                } => {
                    if weight.len() != d_in * d_out {
                        return Err(GraphError::Malformed(format!(
                            "node {i} weight has {} values for [{d_in}, {d_out}]",
                            weight.len()
                        )));
                    }
                    if bias.as_ref().is_some_and(|b| b.len() != *d_out) {
                        return Err(GraphError::Malformed(format!(
                            "node {i} bias length does not match {d_out}"
                        )));
                    }
                }
                _ => {}
            }
        }
        if let Some(out) = self.outputs.iter().find(|o| o.node >= self.nodes.len()) {
            return Err(GraphError::Malformed(format!(
                "output '{}' refers to missing node {}",
                out.name, out.node
            )));
        }
        Ok(())
    }

    pub fn num_parameters(&self) -> usize {
        self.nodes
            .iter()
            .map(|n| match &n.op {
                Op::Linear { weight, bias, .. } => {
                    weight.len() + bias.as_ref().map_or(0, Vec::len)
                }
                _ => 0,
            })
            .sum()
    }
}
