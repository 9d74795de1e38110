use std::convert::Infallible;

use burn::nn::Linear;
use burn::prelude::*;

use crate::model::ops::{self, Activation};

/// The operations a policy's forward pass is written against.
///
/// Implemented by [`Eager`] to compute on tensors and by the tracer to record a
/// graph. Values are opaque to the network, so the traced path cannot branch on
/// data.
pub trait Executor<B: Backend> {
    type Value: Clone;
    type Error;

    fn linear(&mut self, layer: &Linear<B>, x: &Self::Value) -> Result<Self::Value, Self::Error>;
    fn activation(&mut self, kind: Activation, x: &Self::Value)
        -> Result<Self::Value, Self::Error>;
    fn add(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error>;
    fn sub(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error>;
    fn mul(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error>;
    fn argmax(&mut self, x: &Self::Value) -> Result<Self::Value, Self::Error>;
}

/// Computes directly on burn tensors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eager;

impl<B: Backend> Executor<B> for Eager {
    type Value = Tensor<B, 2>;
    type Error = Infallible;

    fn linear(&mut self, layer: &Linear<B>, x: &Self::Value) -> Result<Self::Value, Self::Error> {
        Ok(ops::affine(
            x.clone(),
            layer.weight.val(),
            layer.bias.as_ref().map(|b| b.val()),
        ))
    }

    fn activation(
        &mut self,
        kind: Activation,
        x: &Self::Value,
    ) -> Result<Self::Value, Self::Error> {
        Ok(ops::activate(kind, x.clone()))
    }

    fn add(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error> {
        Ok(lhs.clone() + rhs.clone())
    }

    fn sub(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error> {
        Ok(lhs.clone() - rhs.clone())
    }

    fn mul(&mut self, lhs: &Self::Value, rhs: &Self::Value) -> Result<Self::Value, Self::Error> {
        Ok(lhs.clone() * rhs.clone())
    }

    fn argmax(&mut self, x: &Self::Value) -> Result<Self::Value, Self::Error> {
        Ok(ops::argmax_rows(x.clone()))
    }
}
