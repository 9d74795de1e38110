use std::collections::BTreeSet;

use burn::module::{Ignored, Param};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::checkpoint::{StateDict, TensorRecord};
use crate::config::{ModelConfig, Nonlinearity};
use crate::env::Space;
use crate::error::{CheckpointError, ModelError};
use crate::model::executor::{Eager, Executor};
use crate::model::gru::GruCell;
use crate::model::ops::Activation;

/// Outputs of one policy step, in a fixed named layout.
#[derive(Debug, Clone)]
pub struct PolicyOutput<T> {
    /// `[batch, num_actions]`
    pub action_logits: T,
    /// `[batch, 1]`
    pub values: T,
    /// Greedy action per row, `[batch, 1]`.
    pub actions: T,
    /// `[batch, rnn_size]`
    pub new_rnn_states: T,
}

impl<T> PolicyOutput<T> {
    pub fn into_named(self) -> [(&'static str, T); 4] {
        [
            ("action_logits", self.action_logits),
            ("values", self.values),
            ("actions", self.actions),
            ("new_rnn_states", self.new_rnn_states),
        ]
    }
}

/// Actor-critic policy for flat observations and discrete actions.
///
/// ```text
/// obs [batch, obs_dim]
///   -> encoder MLP (Linear + nonlinearity per layer)
///   -> GRU core (optional; state passes through unchanged without it)
///   -> critic_linear       -> values        [batch, 1]
///   -> distribution_linear -> action_logits [batch, num_actions] -> argmax
/// ```
///
/// On an autodiff backend the policy is in training mode; [`valid`] yields the
/// evaluation-mode network without gradient tracking.
///
/// [`valid`]: burn::module::AutodiffModule::valid
#[derive(Module, Debug)]
pub struct ActorCritic<B: Backend> {
    encoder: Vec<Linear<B>>,
    core: Option<GruCell<B>>,
    critic_linear: Linear<B>,
    distribution_linear: Linear<B>,
    nonlinearity: Ignored<Nonlinearity>,
}

/// Build a policy whose input and output widths match the environment's spaces.
pub fn create_actor_critic<B: Backend>(
    model: &ModelConfig,
    obs_space: &Space,
    action_space: &Space,
    device: &B::Device,
) -> Result<ActorCritic<B>, ModelError> {
    let obs_dim = obs_space
        .flat_width()
        .ok_or_else(|| ModelError::UnsupportedObservationSpace(format!("{obs_space:?}")))?;
    let num_actions = match action_space {
        Space::Discrete { n } if *n > 0 => *n,
        other => return Err(ModelError::UnsupportedActionSpace(format!("{other:?}"))),
    };

    let mut encoder = Vec::with_capacity(model.encoder_mlp_layers.len());
    let mut width = obs_dim;
    for &layer_width in &model.encoder_mlp_layers {
        encoder.push(LinearConfig::new(width, layer_width).init(device));
        width = layer_width;
    }

    let core = if model.use_rnn {
        let gru = GruCell::new(width, model.rnn_size, device);
        width = model.rnn_size;
        Some(gru)
    } else {
        None
    };

    Ok(ActorCritic {
        encoder,
        core,
        critic_linear: LinearConfig::new(width, 1).init(device),
        distribution_linear: LinearConfig::new(width, num_actions).init(device),
        nonlinearity: Ignored(model.nonlinearity),
    })
}

impl<B: Backend> ActorCritic<B> {
    /// Forward pass written once against any [`Executor`].
    pub fn forward_with<X: Executor<B>>(
        &self,
        exec: &mut X,
        obs: &X::Value,
        rnn_states: &X::Value,
    ) -> Result<PolicyOutput<X::Value>, X::Error> {
        let activation = Activation::from(self.nonlinearity.0);
        let mut x = obs.clone();
        for layer in &self.encoder {
            let h = exec.linear(layer, &x)?;
            x = exec.activation(activation, &h)?;
        }

        let (core_out, new_rnn_states) = match &self.core {
            Some(gru) => {
                let h = gru.forward_with(exec, &x, rnn_states)?;
                (h.clone(), h)
            }
            None => (x, rnn_states.clone()),
        };

        let values = exec.linear(&self.critic_linear, &core_out)?;
        let action_logits = exec.linear(&self.distribution_linear, &core_out)?;
        let actions = exec.argmax(&action_logits)?;

        Ok(PolicyOutput {
            action_logits,
            values,
            actions,
            new_rnn_states,
        })
    }

    /// Forward pass on tensors: obs `[batch, obs_dim]`, rnn_states `[batch, rnn_size]`.
    pub fn forward(&self, obs: Tensor<B, 2>, rnn_states: Tensor<B, 2>) -> PolicyOutput<Tensor<B, 2>> {
        self.forward_with(&mut Eager, &obs, &rnn_states)
            .unwrap_or_else(|never| match never {})
    }

    fn named_layers(&self) -> Vec<(String, &Linear<B>)> {
        let mut layers: Vec<(String, &Linear<B>)> = self
            .encoder
            .iter()
            .enumerate()
            .map(|(i, l)| (format!("encoder.mlp.{i}"), l))
            .collect();
        if let Some(gru) = &self.core {
            for (name, l) in gru.named_layers() {
                layers.push((format!("core.gru.{name}"), l));
            }
        }
        layers.push(("critic_linear".to_string(), &self.critic_linear));
        layers.push((
            "action_parameterization.distribution_linear".to_string(),
            &self.distribution_linear,
        ));
        layers
    }

    fn named_layers_mut(&mut self) -> Vec<(String, &mut Linear<B>)> {
        let mut layers: Vec<(String, &mut Linear<B>)> = self
            .encoder
            .iter_mut()
            .enumerate()
            .map(|(i, l)| (format!("encoder.mlp.{i}"), l))
            .collect();
        if let Some(gru) = &mut self.core {
            for (name, l) in gru.named_layers_mut() {
                layers.push((format!("core.gru.{name}"), l));
            }
        }
        layers.push(("critic_linear".to_string(), &mut self.critic_linear));
        layers.push((
            "action_parameterization.distribution_linear".to_string(),
            &mut self.distribution_linear,
        ));
        layers
    }

    /// Parameter name → tensor mapping of every weight and bias.
    pub fn state_dict(&self) -> Result<StateDict, CheckpointError> {
        let mut dict = StateDict::new();
        for (name, layer) in self.named_layers() {
            dict.insert(format!("{name}.weight"), record(layer.weight.val())?);
            if let Some(bias) = &layer.bias {
                dict.insert(format!("{name}.bias"), record(bias.val())?);
            }
        }
        Ok(dict)
    }

    /// Replace every parameter with the checkpoint's values, placed on `device`.
    ///
    /// The checkpoint must hold exactly this network's parameters, with matching shapes.
    pub fn load_state_dict(
        mut self,
        dict: &StateDict,
        device: &B::Device,
    ) -> Result<Self, CheckpointError> {
        let mut expected = BTreeSet::new();
        for (name, layer) in self.named_layers_mut() {
            let key = format!("{name}.weight");
            let weight = restore::<B, 2>(dict, &key, layer.weight.val().dims(), device)?;
            layer.weight = Param::from_tensor(weight);
            expected.insert(key);

            if let Some(bias) = &layer.bias {
                let key = format!("{name}.bias");
                let restored = restore::<B, 1>(dict, &key, bias.val().dims(), device)?;
                layer.bias = Some(Param::from_tensor(restored));
                expected.insert(key);
            }
        }
        if let Some(extra) = dict.keys().find(|k| !expected.contains(*k)) {
            return Err(CheckpointError::UnexpectedKey(extra.clone()));
        }
        Ok(self)
    }
}

fn record<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
) -> Result<TensorRecord, CheckpointError> {
    let shape = tensor.dims().to_vec();
    let data = tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| CheckpointError::TensorData(format!("{e:?}")))?;
    Ok(TensorRecord { shape, data })
}

fn restore<B: Backend, const D: usize>(
    dict: &StateDict,
    key: &str,
    expected: [usize; D],
    device: &B::Device,
) -> Result<Tensor<B, D>, CheckpointError> {
    let rec = dict
        .get(key)
        .ok_or_else(|| CheckpointError::MissingKey(key.to_string()))?;
    if rec.shape != expected {
        return Err(CheckpointError::ShapeMismatch {
            key: key.to_string(),
            expected: expected.to_vec(),
            found: rec.shape.clone(),
        });
    }
    if rec.data.len() != expected.iter().product::<usize>() {
        return Err(CheckpointError::BadLength {
            key: key.to_string(),
            shape: rec.shape.clone(),
            len: rec.data.len(),
        });
    }
    Ok(Tensor::from_data(
        TensorData::new(rec.data.clone(), expected),
        device,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;

    type TestBackend = NdArray<f32>;

    fn small_model(use_rnn: bool) -> ModelConfig {
        ModelConfig {
            encoder_mlp_layers: vec![32, 32],
            nonlinearity: Nonlinearity::Elu,
            use_rnn,
            rnn_size: 16,
        }
    }

    fn spaces() -> (Space, Space) {
        (Space::Box { shape: vec![8] }, Space::Discrete { n: 4 })
    }

    fn values(t: Tensor<TestBackend, 2>) -> Vec<f32> {
        t.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let net: ActorCritic<TestBackend> =
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap();

        let out = net.forward(Tensor::zeros([3, 8], &device), Tensor::zeros([3, 16], &device));
        assert_eq!(out.action_logits.dims(), [3, 4]);
        assert_eq!(out.values.dims(), [3, 1]);
        assert_eq!(out.actions.dims(), [3, 1]);
        assert_eq!(out.new_rnn_states.dims(), [3, 16]);
    }

    #[test]
    fn test_without_rnn_state_passes_through() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let net: ActorCritic<TestBackend> =
            create_actor_critic(&small_model(false), &obs_space, &action_space, &device).unwrap();

        let state = Tensor::<TestBackend, 2>::ones([1, 5], &device);
        let out = net.forward(Tensor::zeros([1, 8], &device), state);
        assert_eq!(values(out.new_rnn_states), vec![1.0; 5]);
    }

    #[test]
    fn test_rejects_unsupported_spaces() {
        let device = Default::default();
        let image = Space::Box { shape: vec![3, 64, 64] };
        let err = create_actor_critic::<TestBackend>(
            &small_model(true),
            &image,
            &Space::Discrete { n: 4 },
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedObservationSpace(_)));

        let continuous = Space::Box { shape: vec![2] };
        let err = create_actor_critic::<TestBackend>(
            &small_model(true),
            &Space::Box { shape: vec![8] },
            &continuous,
            &device,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedActionSpace(_)));
    }

    #[test]
    fn test_state_dict_names() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let net: ActorCritic<TestBackend> =
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap();
        let dict = net.state_dict().unwrap();

        assert_eq!(dict["encoder.mlp.0.weight"].shape, vec![8, 32]);
        assert_eq!(dict["encoder.mlp.1.bias"].shape, vec![32]);
        assert_eq!(dict["core.gru.new_hidden.weight"].shape, vec![16, 16]);
        assert_eq!(dict["critic_linear.weight"].shape, vec![16, 1]);
        assert_eq!(
            dict["action_parameterization.distribution_linear.weight"].shape,
            vec![16, 4]
        );
        // 2 encoder + 6 gru + 2 heads, each with weight and bias
        assert_eq!(dict.len(), 20);
    }

    #[test]
    fn test_load_state_dict_restores_outputs() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let trained: ActorCritic<TestBackend> =
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap();
        let fresh: ActorCritic<TestBackend> =
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap();

        let restored = fresh
            .load_state_dict(&trained.state_dict().unwrap(), &device)
            .unwrap();

        let obs = Tensor::<TestBackend, 2>::random(
            [1, 8],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let a = trained.forward(obs.clone(), Tensor::zeros([1, 16], &device));
        let b = restored.forward(obs, Tensor::zeros([1, 16], &device));
        assert_eq!(values(a.action_logits), values(b.action_logits));
        assert_eq!(values(a.new_rnn_states), values(b.new_rnn_states));
    }

    #[test]
    fn test_load_state_dict_rejects_drift() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let net = || -> ActorCritic<TestBackend> {
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap()
        };
        let dict = net().state_dict().unwrap();

        let mut missing = dict.clone();
        missing.remove("critic_linear.bias");
        let err = net().load_state_dict(&missing, &device).unwrap_err();
        assert!(matches!(err, CheckpointError::MissingKey(ref k) if k == "critic_linear.bias"));

        let mut extra = dict.clone();
        extra.insert(
            "obs_normalizer.running_mean".into(),
            TensorRecord { shape: vec![8], data: vec![0.0; 8] },
        );
        let err = net().load_state_dict(&extra, &device).unwrap_err();
        assert!(matches!(err, CheckpointError::UnexpectedKey(_)));

        let mut wrong_shape = dict;
        wrong_shape.insert(
            "encoder.mlp.0.weight".into(),
            TensorRecord { shape: vec![4, 32], data: vec![0.0; 128] },
        );
        let err = net().load_state_dict(&wrong_shape, &device).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::ShapeMismatch { ref expected, ref found, .. }
                if expected == &vec![8, 32] && found == &vec![4, 32]
        ));
    }

    #[test]
    fn test_eval_mode_matches_training_mode() {
        let device = Default::default();
        let (obs_space, action_space) = spaces();
        let training: ActorCritic<Autodiff<TestBackend>> =
            create_actor_critic(&small_model(true), &obs_space, &action_space, &device).unwrap();
        let eval: ActorCritic<TestBackend> = training.valid();

        let obs = Tensor::<TestBackend, 2>::ones([1, 8], &device);
        let out = eval.forward(obs, Tensor::zeros([1, 16], &device));
        assert_eq!(out.action_logits.dims(), [1, 4]);
    }
}
