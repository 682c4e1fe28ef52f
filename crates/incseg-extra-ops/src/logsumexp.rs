//! # Log-Sum-Exp
//!
//! Numerically stable `log(sum(exp(x)))` along one axis.
//!
//! The maximum along the axis is subtracted before exponentiating so that large
//! scores never overflow:
//!
//! ```text
//! lse(x) = m + log(Σ exp(x_i - m)),   m = max_i x_i
//! ```

use burn::prelude::*;

/// Computes `log(sum(exp(tensor)))` along `dim`, keeping the reduced axis with size 1.
///
/// # Shapes
/// - input: `[d_0, ..., d_dim, ..., d_n]`
/// - output: `[d_0, ..., 1, ..., d_n]`
pub fn logsumexp<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let dims = tensor.dims();
    // The shift only stabilises the sum, it must not carry gradient of its own.
    let max = tensor.clone().max_dim(dim).detach();

    (tensor - max.clone().expand(dims))
        .exp()
        .sum_dim(dim)
        .log()
        + max
}

/// Log-probabilities along `dim`: `tensor - logsumexp(tensor, dim)`.
pub fn log_normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let dims = tensor.dims();
    let den = logsumexp(tensor.clone(), dim);
    tensor - den.expand(dims)
}
