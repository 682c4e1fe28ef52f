//! Binary loss restricted to the classes introduced at the current stage.
//!
//! The score map only holds the `C_new` new classes. Ordinal labels still use the full
//! class id space, so class `k` is supervised on channel `k - n_old_classes`.
//! Background and void pixels produce all-zero target rows.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
};
use incseg_extra_ops::{flatten_channels_last, sigmoid_cross_entropy, unflatten_channels_last};

use crate::{
    error::{check_dims, LossError, LossResult},
    label::IgnoreSet,
    partition::ClassPartition,
    reduction::{LossOutput, LossReduction},
    target::one_hot_window,
};

/// Configuration for creating a [new-class binary loss](WBCELoss).
#[derive(Config, Debug)]
pub struct WBCELossConfig {
    /// Label value of void pixels. Default: 255
    #[config(default = 255)]
    pub ignore_index: usize,
    /// Weight of the positive term, one entry per new class.
    pub pos_weight: Option<Vec<f32>>,
    /// Reduction of the per-element loss, `none` or `mean`. Default: none
    #[config(default = "LossReduction::None")]
    pub reduction: LossReduction,
    /// Classes known before this stage, background included. Default: 0
    #[config(default = 0)]
    pub n_old_classes: usize,
    /// Classes introduced by this stage; 0 accepts any channel count. Default: 0
    #[config(default = 0)]
    pub n_new_classes: usize,
}

impl WBCELossConfig {
    /// Configuration for the classes of `partition`.
    pub fn from_partition(partition: &ClassPartition) -> Self {
        Self::new()
            .with_n_old_classes(partition.n_old_classes)
            .with_n_new_classes(partition.n_new_classes)
    }

    /// Initialize [new-class binary loss](WBCELoss).
    pub fn init<B: Backend>(&self, device: &B::Device) -> WBCELoss<B> {
        self.assertions();
        WBCELoss {
            pos_weight: self
                .pos_weight
                .as_ref()
                .map(|weights| Tensor::<B, 1>::from_floats(weights.as_slice(), device)),
            ignore_index: self.ignore_index,
            n_old_classes: self.n_old_classes,
            n_new_classes: self.n_new_classes,
            reduction: Ignored(self.reduction),
        }
    }

    fn assertions(&self) {
        if let Some(weights) = self.pos_weight.as_ref() {
            assert!(
                weights.iter().all(|weight| *weight > 0.0),
                "Positive weights of WBCELoss must be positive, got {weights:?}"
            );
        }
    }
}

/// Binary cross-entropy on a new-classes-only score map.
///
/// Should be created using [WBCELossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct WBCELoss<B: Backend> {
    /// Per-class weight of the positive term.
    pub pos_weight: Option<Tensor<B, 1>>,
    /// Label value of void pixels.
    pub ignore_index: usize,
    /// Classes known before this stage, background included.
    pub n_old_classes: usize,
    /// Classes introduced by this stage.
    pub n_new_classes: usize,
    /// Reduction applied by [`WBCELoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl<B: Backend> ModuleDisplay for WBCELoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("ignore_index", &self.ignore_index)
            .add("n_old_classes", &self.n_old_classes)
            .add("n_new_classes", &self.n_new_classes)
            .add("reduction", &self.reduction)
            .optional()
    }
}

impl<B: Backend> WBCELoss<B> {
    /// The class partition this loss was configured with.
    pub fn partition(&self) -> ClassPartition {
        ClassPartition::new()
            .with_n_old_classes(self.n_old_classes)
            .with_n_new_classes(self.n_new_classes)
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_new_classes, height, width]`
    /// - label: `[batch_size, height, width]`, full class id space
    /// - output: `[batch_size, num_new_classes, height, width]` for `none`, `[1]` for `mean`
    ///
    /// # Errors
    ///
    /// - [`LossError::UnsupportedReduction`] when configured with `sum`
    /// - [`LossError::ShapeMismatch`] when batch, spatial or class counts disagree
    /// - [`LossError::LabelOutOfRange`] for a labelled class outside the new-class window
    pub fn forward(
        &self,
        scores: Tensor<B, 4>,
        label: Tensor<B, 3, Int>,
    ) -> LossResult<LossOutput<B, 4>> {
        let reduction = self.reduction.0;
        if reduction == LossReduction::Sum {
            return Err(LossError::UnsupportedReduction {
                loss: "WBCELoss",
                reduction,
            });
        }
        let loss = self.forward_no_reduction(scores, label)?;
        Ok(reduction.apply(loss))
    }

    /// Compute the criterion without reduction.
    ///
    /// # Shapes
    ///
    /// - output: `[batch_size, num_new_classes, height, width]`
    ///
    /// # Errors
    ///
    /// See [`WBCELoss::forward`], except for the reduction check.
    pub fn forward_no_reduction(
        &self,
        scores: Tensor<B, 4>,
        label: Tensor<B, 3, Int>,
    ) -> LossResult<Tensor<B, 4>> {
        self.assertions(&scores, &label)?;

        let dims = scores.dims();
        let channels = dims[1];
        tracing::debug!(
            ?dims,
            n_old_classes = self.n_old_classes,
            reduction = %self.reduction.0,
            "WBCELoss forward"
        );

        let ignore = IgnoreSet::new(self.ignore_index, true);
        ignore.check_range(
            label.clone(),
            self.n_old_classes,
            self.n_old_classes + channels,
        )?;
        let target = one_hot_window(label, self.n_old_classes, channels, &ignore);

        let loss = sigmoid_cross_entropy(
            flatten_channels_last(scores),
            flatten_channels_last(target),
            self.pos_weight.clone(),
        );
        Ok(unflatten_channels_last(loss, dims))
    }

    fn assertions(&self, scores: &Tensor<B, 4>, label: &Tensor<B, 3, Int>) -> LossResult<()> {
        let [batch_size, channels, height, width] = scores.dims();
        check_dims("scores vs label", &[batch_size, height, width], &label.dims())?;
        if self.n_new_classes > 0 {
            check_dims("scores vs new classes", &[self.n_new_classes], &[channels])?;
        }
        if let Some(weight) = &self.pos_weight {
            check_dims("pos_weight vs classes", &[channels], &weight.dims())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, TensorData, Tolerance, Transaction};

    use super::*;
    use crate::tests::TestBackend;

    const LN_3: f64 = 1.098_612_288_668_109_8;
    const POS: f64 = 0.287_682_072_451_780_9;
    const NEG: f64 = 1.386_294_361_119_890_6;

    fn label(data: TensorData) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(data, &Default::default())
    }

    fn stage_loss(reduction: LossReduction) -> WBCELoss<TestBackend> {
        // Two old classes (background + 1), two new classes with ids 2 and 3.
        let partition = ClassPartition::new()
            .with_n_old_classes(2)
            .with_n_new_classes(2);
        WBCELossConfig::from_partition(&partition)
            .with_reduction(reduction)
            .init(&Default::default())
    }

    #[test]
    fn wbce_loss_no_reduction_maps_classes_onto_new_channels() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::full([1, 2, 2, 2], LN_3, &device);
        let label = label(TensorData::from([[[0, 2], [3, 255]]]));

        let result = stage_loss(LossReduction::None)
            .forward(scores, label)
            .unwrap()
            .unreduced()
            .expect("unreduced output");

        assert_eq!(result.dims(), [1, 2, 2, 2]);
        let expected = TensorData::from([[[[NEG, POS], [NEG, NEG]], [[NEG, NEG], [POS, NEG]]]]);
        result
            .into_data()
            .assert_approx_eq::<f32>(&expected, Tolerance::default());
    }

    #[test]
    fn wbce_loss_mean_equals_mean_of_unreduced() {
        let device = Default::default();
        let scores =
            Tensor::<TestBackend, 4>::random([2, 2, 3, 3], Distribution::Normal(0.0, 2.0), &device);
        let label = label(TensorData::from([
            [[0, 2, 3], [255, 2, 0], [3, 3, 0]],
            [[2, 2, 2], [0, 0, 0], [255, 3, 255]],
        ]));

        let none = stage_loss(LossReduction::None)
            .forward(scores.clone(), label.clone())
            .unwrap()
            .unreduced()
            .expect("unreduced output");
        let mean = stage_loss(LossReduction::Mean)
            .forward(scores, label)
            .unwrap()
            .reduced()
            .expect("reduced output");

        let [none_mean_data, mean_data] = Transaction::default()
            .register(none.mean())
            .register(mean)
            .execute()
            .try_into()
            .expect("Correct amount of tensor data");
        mean_data.assert_approx_eq::<f32>(&none_mean_data, Tolerance::default());
    }

    #[test]
    fn wbce_loss_unreduced_output_reflattens_to_per_pixel_rows() {
        let device = Default::default();
        let scores =
            Tensor::<TestBackend, 4>::random([2, 2, 3, 4], Distribution::Normal(0.0, 1.0), &device);
        let label = Tensor::<TestBackend, 3>::random([2, 3, 4], Distribution::Uniform(2.0, 4.0), &device)
            .int();
        let target = one_hot_window(label.clone(), 2, 2, &IgnoreSet::new(255, true));

        let flat = sigmoid_cross_entropy(
            flatten_channels_last(scores.clone()),
            flatten_channels_last(target),
            None,
        );
        let unreduced = stage_loss(LossReduction::None)
            .forward_no_reduction(scores, label)
            .unwrap();

        flatten_channels_last(unreduced)
            .into_data()
            .assert_eq(&flat.into_data(), true);
    }

    #[test]
    fn wbce_loss_sum_reduction_returns_error() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let label = Tensor::<TestBackend, 3, Int>::zeros([1, 2, 2], &device);

        let err = stage_loss(LossReduction::Sum)
            .forward(scores, label)
            .unwrap_err();

        assert_eq!(
            err,
            LossError::UnsupportedReduction {
                loss: "WBCELoss",
                reduction: LossReduction::Sum,
            }
        );
    }

    #[test]
    fn wbce_loss_old_class_label_returns_error() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 2], &device);
        let label = label(TensorData::from([[[0, 1], [2, 255]]]));

        let err = stage_loss(LossReduction::None)
            .forward(scores, label)
            .unwrap_err();

        assert_eq!(
            err,
            LossError::LabelOutOfRange {
                label: 1,
                start: 2,
                end: 4
            }
        );
    }

    #[test]
    fn wbce_loss_channel_count_must_match_new_classes() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 4>::zeros([1, 3, 2, 2], &device);
        let label = Tensor::<TestBackend, 3, Int>::zeros([1, 2, 2], &device);

        let err = stage_loss(LossReduction::None)
            .forward(scores, label)
            .unwrap_err();

        assert!(matches!(err, LossError::ShapeMismatch { .. }));
    }

    #[test]
    fn wbce_loss_exposes_its_partition() {
        let loss = stage_loss(LossReduction::None);

        assert_eq!(loss.partition().total_classes(), 4);
        assert_eq!(loss.partition().new_channel(3), Some(1));
    }
}
