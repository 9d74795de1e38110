use burn::nn::Linear;
use burn::prelude::*;

use crate::error::GraphError;
use crate::model::ops::Activation;
use crate::model::{ActorCritic, Executor};
use crate::trace::graph::{GraphInput, GraphOutput, Node, Op, TracedGraph, GRAPH_FORMAT_VERSION};

/// A value flowing through a trace: the node that produces it and its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub node: usize,
    pub shape: [usize; 2],
}

/// Records every operation of a forward pass into a [`TracedGraph`].
#[derive(Debug, Default)]
pub struct Tracer {
    inputs: Vec<GraphInput>,
    nodes: Vec<Node>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a graph input and return its symbol.
    pub fn input(&mut self, name: &str, shape: [usize; 2]) -> Symbol {
        let index = self.inputs.len();
        self.inputs.push(GraphInput {
            name: name.to_string(),
            shape,
        });
        self.push(Op::Input { index }, shape)
    }

    /// Finish the trace with the given named outputs.
    pub fn finish(
        self,
        outputs: impl IntoIterator<Item = (&'static str, Symbol)>,
    ) -> Result<TracedGraph, GraphError> {
        let batch_size = self.inputs.first().map_or(0, |i| i.shape[0]);
        let graph = TracedGraph {
            version: GRAPH_FORMAT_VERSION,
            batch_size,
            inputs: self.inputs,
            nodes: self.nodes,
            outputs: outputs
                .into_iter()
                .map(|(name, sym)| GraphOutput {
                    name: name.to_string(),
                    node: sym.node,
                })
                .collect(),
        };
        graph.validate()?;
        Ok(graph)
    }

    fn push(&mut self, op: Op, shape: [usize; 2]) -> Symbol {
        self.nodes.push(Node { op, shape });
        Symbol {
            node: self.nodes.len() - 1,
            shape,
        }
    }

    fn elementwise(
        &mut self,
        op: &'static str,
        lhs: &Symbol,
        rhs: &Symbol,
        make: impl FnOnce(usize, usize) -> Op,
    ) -> Result<Symbol, GraphError> {
        if lhs.shape != rhs.shape {
            return Err(GraphError::ShapeMismatch {
                op,
                expected: lhs.shape,
                found: rhs.shape,
            });
        }
        Ok(self.push(make(lhs.node, rhs.node), lhs.shape))
    }
}

fn host_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, GraphError> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| GraphError::TensorData(format!("{e:?}")))
}

impl<B: Backend> Executor<B> for Tracer {
    type Value = Symbol;
    type Error = GraphError;

    fn linear(&mut self, layer: &Linear<B>, x: &Symbol) -> Result<Symbol, GraphError> {
        let weight = layer.weight.val();
        let [d_in, d_out] = weight.dims();
        if x.shape[1] != d_in {
            return Err(GraphError::ShapeMismatch {
                op: "linear",
                expected: [x.shape[0], d_in],
                found: x.shape,
            });
        }
        let bias = match &layer.bias {
            Some(b) => Some(host_values(b.val())?),
            None => None,
        };
        let op = Op::Linear {
            input: x.node,
            d_in,
            d_out,
            weight: host_values(weight)?,
            bias,
        };
        Ok(self.push(op, [x.shape[0], d_out]))
    }

    fn activation(&mut self, kind: Activation, x: &Symbol) -> Result<Symbol, GraphError> {
        Ok(self.push(
            Op::Activation {
                input: x.node,
                kind,
            },
            x.shape,
        ))
    }

    fn add(&mut self, lhs: &Symbol, rhs: &Symbol) -> Result<Symbol, GraphError> {
        self.elementwise("add", lhs, rhs, |lhs, rhs| Op::Add { lhs, rhs })
    }

    fn sub(&mut self, lhs: &Symbol, rhs: &Symbol) -> Result<Symbol, GraphError> {
        self.elementwise("sub", lhs, rhs, |lhs, rhs| Op::Sub { lhs, rhs })
    }

    fn mul(&mut self, lhs: &Symbol, rhs: &Symbol) -> Result<Symbol, GraphError> {
        self.elementwise("mul", lhs, rhs, |lhs, rhs| Op::Mul { lhs, rhs })
    }

    fn argmax(&mut self, x: &Symbol) -> Result<Symbol, GraphError> {
        Ok(self.push(Op::ArgMax { input: x.node }, [x.shape[0], 1]))
    }
}

/// Capture the policy's forward pass for inputs `obs` and `rnn_states` of the
/// given shapes.
pub fn trace_policy<B: Backend>(
    policy: &ActorCritic<B>,
    obs_shape: [usize; 2],
    rnn_shape: [usize; 2],
) -> Result<TracedGraph, GraphError> {
    if obs_shape[0] != rnn_shape[0] {
        return Err(GraphError::ShapeMismatch {
            op: "inputs",
            expected: [obs_shape[0], rnn_shape[1]],
            found: rnn_shape,
        });
    }
    let mut tracer = Tracer::new();
    let obs = tracer.input("obs", obs_shape);
    let rnn_states = tracer.input("rnn_states", rnn_shape);
    let outputs = policy.forward_with(&mut tracer, &obs, &rnn_states)?;
    tracer.finish(outputs.into_named())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, Nonlinearity};
    use crate::env::Space;
    use crate::model::create_actor_critic;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn policy(use_rnn: bool) -> ActorCritic<TestBackend> {
        let model = ModelConfig {
            encoder_mlp_layers: vec![32],
            nonlinearity: Nonlinearity::Relu,
            use_rnn,
            rnn_size: 16,
        };
        create_actor_critic(
            &model,
            &Space::Box { shape: vec![8] },
            &Space::Discrete { n: 3 },
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_trace_records_named_outputs() {
        let graph = trace_policy(&policy(true), [1, 8], [1, 16]).unwrap();
        let names: Vec<&str> = graph.outputs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, ["action_logits", "values", "actions", "new_rnn_states"]);
        assert_eq!(graph.batch_size, 1);

        let shape_of = |name: &str| {
            let out = graph.outputs.iter().find(|o| o.name == name).unwrap();
            graph.nodes[out.node].shape
        };
        assert_eq!(shape_of("action_logits"), [1, 3]);
        assert_eq!(shape_of("values"), [1, 1]);
        assert_eq!(shape_of("actions"), [1, 1]);
        assert_eq!(shape_of("new_rnn_states"), [1, 16]);
    }

    #[test]
    fn test_trace_inlines_every_parameter() {
        let net = policy(true);
        let expected: usize = net.state_dict().unwrap().values().map(|r| r.data.len()).sum();
        let graph = trace_policy(&net, [1, 8], [1, 16]).unwrap();
        assert_eq!(graph.num_parameters(), expected);
    }

    #[test]
    fn test_obs_width_mismatch_fails_at_trace_time() {
        let err = trace_policy(&policy(true), [1, 5], [1, 16]).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ShapeMismatch { op: "linear", expected: [1, 8], found: [1, 5] }
        ));
    }

    #[test]
    fn test_state_width_mismatch_fails_at_trace_time() {
        let err = trace_policy(&policy(true), [1, 8], [1, 12]).unwrap_err();
        assert!(matches!(err, GraphError::ShapeMismatch { op: "linear", .. }));
    }

    #[test]
    fn test_state_passes_through_without_rnn() {
        let graph = trace_policy(&policy(false), [1, 8], [1, 4]).unwrap();
        let out = graph.outputs.iter().find(|o| o.name == "new_rnn_states").unwrap();
        assert_eq!(graph.nodes[out.node].op, Op::Input { index: 1 });
    }
}
