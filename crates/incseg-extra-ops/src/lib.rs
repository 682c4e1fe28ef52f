//! Additional tensor operations for incremental segmentation losses.
//!
//! This crate provides numerically stable primitives that the loss crate builds on and
//! that are not available in the core Burn framework:
//!
//! - [`logsumexp`] / [`log_normalize`]: stable log-sum-exp along one axis
//! - [`sigmoid_cross_entropy`]: binary cross-entropy fused with the sigmoid
//! - [`flatten_channels_last`] / [`unflatten_channels_last`]: per-pixel class rows

use burn::prelude::*;

mod channels;
mod logsumexp;
mod sigmoid_cross_entropy;

// Convenient re-exports
#[doc(inline)]
pub use channels::{flatten_channels_last, unflatten_channels_last};
#[doc(inline)]
pub use logsumexp::{log_normalize, logsumexp};
#[doc(inline)]
pub use sigmoid_cross_entropy::{neg_log_sigmoid, sigmoid_cross_entropy};

/// Additional operations for Burn float tensors
pub trait TensorExtraOps<B: Backend, const D: usize> {
    /// `log(sum(exp(self)))` along `dim`, keeping the axis.
    fn logsumexp(self, dim: usize) -> Self;

    /// Log-probabilities along `dim`.
    fn log_normalize(self, dim: usize) -> Self;
}

impl<B: Backend, const D: usize> TensorExtraOps<B, D> for Tensor<B, D> {
    fn logsumexp(self, dim: usize) -> Self {
        logsumexp(self, dim)
    }

    fn log_normalize(self, dim: usize) -> Self {
        log_normalize(self, dim)
    }
}
