use std::collections::BTreeMap;
use std::path::Path;

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::GraphError;
use crate::model::ops;
use crate::trace::graph::{Op, TracedGraph};

enum Step<B: Backend> {
    Input(usize),
    Linear {
        input: usize,
        weight: Tensor<B, 2>,
        bias: Option<Tensor<B, 1>>,
    },
    Activation {
        input: usize,
        kind: ops::Activation,
    },
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    ArgMax(usize),
}

/// A traced graph with its weights materialized on a device, ready to run.
pub struct TracedModule<B: Backend> {
    input_shapes: Vec<(String, [usize; 2])>,
    steps: Vec<Step<B>>,
    outputs: Vec<(String, usize)>,
}

impl<B: Backend> TracedModule<B> {
    pub fn load(path: &Path, device: &B::Device) -> Result<Self, GraphError> {
        let graph = TracedGraph::load(path)?;
        Self::from_graph(&graph, device)
    }

    pub fn from_graph(graph: &TracedGraph, device: &B::Device) -> Result<Self, GraphError> {
        graph.validate()?;
        let steps = graph
            .nodes
            .iter()
            .map(|node| match &node.op {
                Op::Input { index } => Step::Input(*index),
                Op::Linear {
                    input,
                    d_in,
                    d_out,
                    weight,
                    bias,
                } => Step::Linear {
                    input: *input,
                    weight: Tensor::from_data(
                        TensorData::new(weight.clone(), [*d_in, *d_out]),
                        device,
                    ),
                    bias: bias
                        .as_ref()
                        .map(|b| Tensor::from_data(TensorData::new(b.clone(), [*d_out]), device)),
                },
                Op::Activation { input, kind } => Step::Activation {
                    input: *input,
                    kind: *kind,
                },
                Op::Add { lhs, rhs } => Step::Add(*lhs, *rhs),
                Op::Sub { lhs, rhs } => Step::Sub(*lhs, *rhs),
                Op::Mul { lhs, rhs } => Step::Mul(*lhs, *rhs),
                Op::ArgMax { input } => Step::ArgMax(*input),
            })
            .collect();

        Ok(TracedModule {
            input_shapes: graph
                .inputs
                .iter()
                .map(|i| (i.name.clone(), i.shape))
                .collect(),
            steps,
            outputs: graph
                .outputs
                .iter()
                .map(|o| (o.name.clone(), o.node))
                .collect(),
        })
    }

    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.input_shapes.iter().map(|(name, _)| name.as_str())
    }

    /// Run the graph. `inputs` are positional, in declaration order.
    pub fn forward(
        &self,
        inputs: &[Tensor<B, 2>],
    ) -> Result<BTreeMap<String, Tensor<B, 2>>, GraphError> {
        if inputs.len() != self.input_shapes.len() {
            return Err(GraphError::InputCount {
                expected: self.input_shapes.len(),
                found: inputs.len(),
            });
        }
        for (tensor, (name, shape)) in inputs.iter().zip(&self.input_shapes) {
            let dims = tensor.dims();
            if dims != *shape {
                tracing::debug!(input = %name, "input shape mismatch");
                return Err(GraphError::ShapeMismatch {
                    op: "input",
                    expected: *shape,
                    found: dims,
                });
            }
        }

        let mut values: Vec<Tensor<B, 2>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let value = match step {
                Step::Input(index) => inputs[*index].clone(),
                Step::Linear {
                    input,
                    weight,
                    bias,
                } => ops::affine(values[*input].clone(), weight.clone(), bias.clone()),
                Step::Activation { input, kind } => ops::activate(*kind, values[*input].clone()),
                Step::Add(lhs, rhs) => values[*lhs].clone() + values[*rhs].clone(),
                Step::Sub(lhs, rhs) => values[*lhs].clone() - values[*rhs].clone(),
                Step::Mul(lhs, rhs) => values[*lhs].clone() * values[*rhs].clone(),
                Step::ArgMax(input) => ops::argmax_rows(values[*input].clone()),
            };
            values.push(value);
        }

        Ok(self
            .outputs
            .iter()
            .map(|(name, node)| (name.clone(), values[*node].clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, Nonlinearity};
    use crate::env::Space;
    use crate::model::{create_actor_critic, ActorCritic};
    use crate::trace::trace_policy;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    fn policy() -> ActorCritic<TestBackend> {
        let model = ModelConfig {
            encoder_mlp_layers: vec![24, 24],
            nonlinearity: Nonlinearity::Elu,
            use_rnn: true,
            rnn_size: 16,
        };
        create_actor_critic(
            &model,
            &Space::Box { shape: vec![8] },
            &Space::Discrete { n: 4 },
            &Default::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_replay_matches_live_network() {
        let device = Default::default();
        let net = policy();
        let graph = trace_policy(&net, [2, 8], [2, 16]).unwrap();
        let module = TracedModule::<TestBackend>::from_graph(&graph, &device).unwrap();

        let obs = Tensor::<TestBackend, 2>::random([2, 8], Distribution::Normal(0.0, 1.0), &device);
        let state = Tensor::<TestBackend, 2>::random([2, 16], Distribution::Normal(0.0, 1.0), &device);
        let live = net.forward(obs.clone(), state.clone());
        let replay = module.forward(&[obs, state]).unwrap();

        for (name, expected) in live.into_named() {
            assert_eq!(values(replay[name].clone()), values(expected), "{name}");
        }
    }

    #[test]
    fn test_rejects_wrong_input_count() {
        let device = Default::default();
        let graph = trace_policy(&policy(), [1, 8], [1, 16]).unwrap();
        let module = TracedModule::<TestBackend>::from_graph(&graph, &device).unwrap();
        assert_eq!(module.input_names().collect::<Vec<_>>(), ["obs", "rnn_states"]);

        let err = module
            .forward(&[Tensor::zeros([1, 8], &device)])
            .unwrap_err();
        assert!(matches!(err, GraphError::InputCount { expected: 2, found: 1 }));
    }

    #[test]
    fn test_rejects_wrong_input_shape() {
        let device = Default::default();
        let graph = trace_policy(&policy(), [1, 8], [1, 16]).unwrap();
        let module = TracedModule::<TestBackend>::from_graph(&graph, &device).unwrap();

        let err = module
            .forward(&[Tensor::zeros([3, 8], &device), Tensor::zeros([3, 16], &device)])
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::ShapeMismatch { op: "input", expected: [1, 8], found: [3, 8] }
        ));
    }
}
