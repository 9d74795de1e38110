use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use crate::model::executor::Executor;
use crate::model::ops::Activation;

/// Single-step GRU cell.
///
/// ```text
/// r  = sigmoid(W_ir x + b_ir + W_hr h + b_hr)
/// z  = sigmoid(W_iz x + b_iz + W_hz h + b_hz)
/// n  = tanh(W_in x + b_in + r * (W_hn h + b_hn))
/// h' = n + z * (h - n)
/// ```
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    reset_input: Linear<B>,
    reset_hidden: Linear<B>,
    update_input: Linear<B>,
    update_hidden: Linear<B>,
    new_input: Linear<B>,
    new_hidden: Linear<B>,
}

impl<B: Backend> GruCell<B> {
    pub fn new(d_input: usize, d_hidden: usize, device: &B::Device) -> Self {
        let input = || LinearConfig::new(d_input, d_hidden).init(device);
        let hidden = || LinearConfig::new(d_hidden, d_hidden).init(device);
        GruCell {
            reset_input: input(),
            reset_hidden: hidden(),
            update_input: input(),
            update_hidden: hidden(),
            new_input: input(),
            new_hidden: hidden(),
        }
    }

    /// Layers paired with their parameter-name suffix.
    pub(crate) fn named_layers(&self) -> [(&'static str, &Linear<B>); 6] {
        [
            ("reset_input", &self.reset_input),
            ("reset_hidden", &self.reset_hidden),
            ("update_input", &self.update_input),
            ("update_hidden", &self.update_hidden),
            ("new_input", &self.new_input),
            ("new_hidden", &self.new_hidden),
        ]
    }

    pub(crate) fn named_layers_mut(&mut self) -> [(&'static str, &mut Linear<B>); 6] {
        [
            ("reset_input", &mut self.reset_input),
            ("reset_hidden", &mut self.reset_hidden),
            ("update_input", &mut self.update_input),
            ("update_hidden", &mut self.update_hidden),
            ("new_input", &mut self.new_input),
            ("new_hidden", &mut self.new_hidden),
        ]
    }

    /// One recurrent step; returns the new hidden state.
    pub fn forward_with<X: Executor<B>>(
        &self,
        exec: &mut X,
        input: &X::Value,
        hidden: &X::Value,
    ) -> Result<X::Value, X::Error> {
        let r_i = exec.linear(&self.reset_input, input)?;
        let r_h = exec.linear(&self.reset_hidden, hidden)?;
        let r_sum = exec.add(&r_i, &r_h)?;
        let reset = exec.activation(Activation::Sigmoid, &r_sum)?;

        let z_i = exec.linear(&self.update_input, input)?;
        let z_h = exec.linear(&self.update_hidden, hidden)?;
        let z_sum = exec.add(&z_i, &z_h)?;
        let update = exec.activation(Activation::Sigmoid, &z_sum)?;

        let n_i = exec.linear(&self.new_input, input)?;
        let n_h = exec.linear(&self.new_hidden, hidden)?;
        let gated = exec.mul(&reset, &n_h)?;
        let n_sum = exec.add(&n_i, &gated)?;
        let candidate = exec.activation(Activation::Tanh, &n_sum)?;

        let delta = exec.sub(hidden, &candidate)?;
        let kept = exec.mul(&update, &delta)?;
        exec.add(&candidate, &kept)
    }
}
