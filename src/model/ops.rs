//! Tensor primitives shared by the live network and the traced graph replay.
//!
//! Both paths must go through these functions so a replayed graph performs the
//! exact same arithmetic as the network it was traced from.

use burn::prelude::*;
use burn::tensor::activation;

use crate::config::Nonlinearity;

/// Element-wise activation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Activation {
    Relu,
    Elu,
    Tanh,
    Sigmoid,
}

impl From<Nonlinearity> for Activation {
    fn from(n: Nonlinearity) -> Self {
        match n {
            Nonlinearity::Elu => Activation::Elu,
            Nonlinearity::Relu => Activation::Relu,
            Nonlinearity::Tanh => Activation::Tanh,
        }
    }
}

/// `x @ weight + bias` with `weight` laid out as `[d_in, d_out]`.
pub fn affine<B: Backend>(
    x: Tensor<B, 2>,
    weight: Tensor<B, 2>,
    bias: Option<Tensor<B, 1>>,
) -> Tensor<B, 2> {
    let y = x.matmul(weight);
    match bias {
        Some(b) => y + b.unsqueeze::<2>(),
        None => y,
    }
}

pub fn activate<B: Backend>(kind: Activation, x: Tensor<B, 2>) -> Tensor<B, 2> {
    match kind {
        Activation::Relu => activation::relu(x),
        Activation::Elu => {
            // elu(x) = x for x > 0, exp(x) - 1 otherwise
            let negative = x.clone().clamp_max(0.0).exp().sub_scalar(1.0);
            activation::relu(x) + negative
        }
        Activation::Tanh => activation::tanh(x),
        Activation::Sigmoid => activation::sigmoid(x),
    }
}

/// Index of the largest entry in each row, as a `[batch, 1]` float tensor.
pub fn argmax_rows<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    x.argmax(1).float()
}
