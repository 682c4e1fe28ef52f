//! Soft-label distillation with per-channel binary cross-entropy.
//!
//! The frozen model's outputs are used directly as soft targets for the current scores,
//! without any remapping of the label space. Both maps must have identical shapes.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
};
use incseg_extra_ops::{flatten_channels_last, sigmoid_cross_entropy, unflatten_channels_last};

use crate::{
    error::{check_dims, LossResult},
    reduction::{LossOutput, LossReduction},
};

/// Configuration for creating a [distillation loss](KDLoss).
#[derive(Config, Debug)]
pub struct KDLossConfig {
    /// Weight of the positive term, one entry per class channel.
    pub pos_weight: Option<Vec<f32>>,
    /// Reduction of the per-element loss. Default: mean
    #[config(default = "LossReduction::Mean")]
    pub reduction: LossReduction,
}

impl KDLossConfig {
    /// Initialize [distillation loss](KDLoss).
    pub fn init<B: Backend>(&self, device: &B::Device) -> KDLoss<B> {
        if let Some(weights) = self.pos_weight.as_ref() {
            assert!(
                weights.iter().all(|weight| *weight > 0.0),
                "Positive weights of KDLoss must be positive, got {weights:?}"
            );
        }
        KDLoss {
            pos_weight: self
                .pos_weight
                .as_ref()
                .map(|weights| Tensor::<B, 1>::from_floats(weights.as_slice(), device)),
            reduction: Ignored(self.reduction),
        }
    }
}

/// Binary cross-entropy between current scores and a frozen model's soft targets.
///
/// Should be created using [KDLossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct KDLoss<B: Backend> {
    /// Per-class weight of the positive term.
    pub pos_weight: Option<Tensor<B, 1>>,
    /// Reduction applied by [`KDLoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl<B: Backend> ModuleDisplay for KDLoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("pos_weight", &self.pos_weight)
            .add("reduction", &self.reduction)
            .optional()
    }
}

impl<B: Backend> KDLoss<B> {
    /// Create a new distillation loss with default configuration.
    pub fn new(device: &B::Device) -> Self {
        KDLossConfig::new().init(device)
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// `soft_targets` are taken as given; pass probabilities in `[0, 1]`, for example
    /// the sigmoid of the old model's scores. No gradient flows into them.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]`
    /// - soft_targets: `[batch_size, num_classes, height, width]`
    /// - output: `[batch_size, num_classes, height, width]` unreduced, `[1]` otherwise
    ///
    /// # Errors
    ///
    /// [`crate::LossError::ShapeMismatch`] when the two maps differ in shape.
    pub fn forward(
        &self,
        scores: Tensor<B, 4>,
        soft_targets: Tensor<B, 4>,
    ) -> LossResult<LossOutput<B, 4>> {
        check_dims("scores vs soft targets", &scores.dims(), &soft_targets.dims())?;
        if let Some(weight) = &self.pos_weight {
            check_dims("pos_weight vs classes", &[scores.dims()[1]], &weight.dims())?;
        }

        let dims = scores.dims();
        tracing::debug!(?dims, reduction = %self.reduction.0, "KDLoss forward");

        let loss = sigmoid_cross_entropy(
            flatten_channels_last(scores),
            flatten_channels_last(soft_targets.detach()),
            self.pos_weight.clone(),
        );
        Ok(self.reduction.0.apply(unflatten_channels_last(loss, dims)))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{activation::sigmoid, Distribution, TensorData, Tolerance, Transaction};

    use super::*;
    use crate::{error::LossError, tests::TestBackend};

    const LN_3: f64 = 1.098_612_288_668_109_8;
    const POS: f64 = 0.287_682_072_451_780_9;
    const NEG: f64 = 1.386_294_361_119_890_6;

    #[test]
    fn kd_loss_no_reduction_keeps_shape_and_mean_matches() {
        let device = Default::default();
        let scores =
            Tensor::<TestBackend, 4>::random([1, 3, 2, 2], Distribution::Normal(0.0, 3.0), &device);
        let old = sigmoid(Tensor::<TestBackend, 4>::random(
            [1, 3, 2, 2],
            Distribution::Normal(0.0, 3.0),
            &device,
        ));

        let none = KDLossConfig::new()
            .with_reduction(LossReduction::None)
            .init::<TestBackend>(&device)
            .forward(scores.clone(), old.clone())
            .unwrap()
            .unreduced()
            .expect("unreduced output");
        let mean = KDLoss::<TestBackend>::new(&device)
            .forward(scores, old)
            .unwrap()
            .reduced()
            .expect("reduced output");

        assert_eq!(none.dims(), [1, 3, 2, 2]);
        let [none_mean_data, mean_data] = Transaction::default()
            .register(none.mean())
            .register(mean)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");
        mean_data.assert_approx_eq::<f32>(&none_mean_data, Tolerance::default());
    }

    #[test]
    fn kd_loss_uses_soft_targets_verbatim() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::full([1, 1, 1, 3], LN_3, &device);
        let soft = Tensor::<TestBackend, 4>::from_data(TensorData::from([[[[0.0, 0.5, 1.0]]]]), &device);

        let result = KDLossConfig::new()
            .with_reduction(LossReduction::Sum)
            .init::<TestBackend>(&device)
            .forward(scores, soft)
            .unwrap()
            .into_data();

        let half = 0.5 * LN_3 + POS;
        result.assert_approx_eq::<f32>(&TensorData::from([NEG + half + POS]), Tolerance::default());
    }

    #[test]
    fn kd_loss_mismatched_shapes_returns_error() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &device);
        let old = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);

        let err = KDLoss::<TestBackend>::new(&device)
            .forward(scores, old)
            .unwrap_err();

        assert_eq!(
            err,
            LossError::ShapeMismatch {
                what: "scores vs soft targets",
                expected: vec![1, 3, 2, 2],
                actual: vec![1, 2, 2, 2],
            }
        );
    }
}
