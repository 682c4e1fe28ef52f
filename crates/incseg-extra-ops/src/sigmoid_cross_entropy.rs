//! # Sigmoid Cross-Entropy
//!
//! Element-wise binary cross-entropy on raw scores, fused with the sigmoid.
//!
//! The naive form `-[y·log σ(x) + (1-y)·log(1-σ(x))]` overflows for large `|x|`.
//! Writing `-log σ(x)` as a softplus keeps every term bounded:
//!
//! ```text
//! softplus(-x) = max(-x, 0) + log1p(exp(-|x|))
//! loss         = (1 - y)·x + (1 + (p - 1)·y)·softplus(-x)
//! ```
//!
//! where `p` is the optional positive-class weight (1 when absent).

use burn::prelude::*;

/// Stable `-log σ(x)`.
pub fn neg_log_sigmoid<B: Backend, const D: usize>(logits: Tensor<B, D>) -> Tensor<B, D> {
    logits.clone().neg().clamp_min(0.0) + logits.abs().neg().exp().log1p()
}

/// Element-wise sigmoid cross-entropy between `logits` and soft `targets` in `[0, 1]`.
///
/// `pos_weight` holds one weight per entry of the last axis and scales the positive term.
///
/// # Shapes
/// - logits: `[..., num_classes]`
/// - targets: `[..., num_classes]`
/// - pos_weight: `[num_classes]`
/// - output: same as logits
pub fn sigmoid_cross_entropy<B: Backend, const D: usize>(
    logits: Tensor<B, D>,
    targets: Tensor<B, D>,
    pos_weight: Option<Tensor<B, 1>>,
) -> Tensor<B, D> {
    let dims = logits.dims();
    let neg_term = targets.clone().neg().add_scalar(1.0) * logits.clone();
    let softplus = neg_log_sigmoid(logits);

    match pos_weight {
        Some(weight) => {
            let mut weight_shape = [1; D];
            weight_shape[D - 1] = dims[D - 1];
            let weight = weight.reshape(weight_shape).expand(dims);
            let log_weight = (weight.sub_scalar(1.0) * targets).add_scalar(1.0);
            neg_term + log_weight * softplus
        }
        None => neg_term + softplus,
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{activation::sigmoid, cast::ToElement, TensorData, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    fn naive<const D: usize>(
        logits: Tensor<TestBackend, D>,
        targets: Tensor<TestBackend, D>,
    ) -> Tensor<TestBackend, D> {
        let prob = sigmoid(logits);
        (targets.clone() * prob.clone().log()
            + targets.neg().add_scalar(1.0) * prob.neg().add_scalar(1.0).log())
        .neg()
    }

    #[test]
    fn sigmoid_ce_matches_naive_formula_for_moderate_scores() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[-9.5, -3.0, -0.25, 0.0], [0.7, 2.0, 5.5, 9.0]]),
            &device,
        );
        let targets = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0, 1.0, 0.3, 1.0], [0.0, 0.5, 1.0, 1.0]]),
            &device,
        );

        let stable = sigmoid_cross_entropy(logits.clone(), targets.clone(), None);
        let expected = naive(logits, targets);

        let max_diff = (stable - expected).abs().max().into_scalar().to_f64();
        assert!(max_diff < 1e-5, "max difference {max_diff}");
    }

    #[test]
    fn sigmoid_ce_is_finite_for_extreme_scores() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::from_data(
            TensorData::from([1e4, -1e4, 1e4, -1e4]),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1>::from_data(TensorData::from([0.0, 1.0, 1.0, 0.0]), &device);

        let loss = sigmoid_cross_entropy(logits, targets, None);

        loss.into_data().assert_approx_eq::<f32>(
            &TensorData::from([1e4, 1e4, 0.0, 0.0]),
            Tolerance::default(),
        );
    }

    #[test]
    fn sigmoid_ce_pos_weight_scales_positive_term_per_class() {
        let device = Default::default();
        let logits =
            Tensor::<TestBackend, 2>::from_data(TensorData::from([[0.0, 0.0], [0.0, 0.0]]), &device);
        let targets =
            Tensor::<TestBackend, 2>::from_data(TensorData::from([[1.0, 1.0], [0.0, 1.0]]), &device);
        let pos_weight = Tensor::<TestBackend, 1>::from_data(TensorData::from([2.0, 3.0]), &device);

        let loss = sigmoid_cross_entropy(logits, targets, Some(pos_weight));

        let ln2 = core::f64::consts::LN_2;
        loss.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[2.0 * ln2, 3.0 * ln2], [ln2, 3.0 * ln2]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn neg_log_sigmoid_of_zero_is_ln_two() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 1>::zeros([3], &device);

        neg_log_sigmoid(logits).into_data().assert_approx_eq::<f32>(
            &TensorData::from([core::f64::consts::LN_2; 3]),
            Tolerance::default(),
        );
    }
}
