//! Binary multi-label loss with optional distillation targets.
//!
//! Each class channel is an independent binary problem. Ordinal labels are expanded to
//! a `[N, C, H, W]` target (see [`crate::target`]), scores and targets are flattened to
//! one row per pixel and compared with the stable sigmoid cross-entropy:
//!
//! ```text
//! l(x, y) = (1 - y)·x + (1 + (p_c - 1)·y)·softplus(-x)
//! ```
//!
//! When the previous stage's scores are supplied, pixels without a usable hard label
//! are supervised on the old-class channels by the old model's sigmoid outputs.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
};
use incseg_extra_ops::{flatten_channels_last, sigmoid_cross_entropy, unflatten_channels_last};

use crate::{
    error::{check_dims, LossError, LossResult},
    label::{IgnoreSet, SegmentationLabel},
    reduction::{LossOutput, LossReduction},
    target::{distilled_target, multilabel_target},
};

/// Configuration for creating a [binary multi-label loss](BCELoss).
#[derive(Config, Debug)]
pub struct BCELossConfig {
    /// Label value of void pixels. Default: 255
    #[config(default = 255)]
    pub ignore_index: usize,
    /// Exclude background (class 0) from the targets. Default: true
    #[config(default = true)]
    pub ignore_bg: bool,
    /// Weight of the positive term, one entry per class channel.
    pub pos_weight: Option<Vec<f32>>,
    /// Reduction of the per-element loss. Default: mean
    #[config(default = "LossReduction::Mean")]
    pub reduction: LossReduction,
}

impl BCELossConfig {
    /// Initialize [binary multi-label loss](BCELoss).
    pub fn init<B: Backend>(&self, device: &B::Device) -> BCELoss<B> {
        self.assertions();
        BCELoss {
            pos_weight: self
                .pos_weight
                .as_ref()
                .map(|weights| Tensor::<B, 1>::from_floats(weights.as_slice(), device)),
            ignore_index: self.ignore_index,
            ignore_bg: self.ignore_bg,
            reduction: Ignored(self.reduction),
        }
    }

    fn assertions(&self) {
        if let Some(weights) = self.pos_weight.as_ref() {
            assert!(
                weights.iter().all(|weight| *weight > 0.0),
                "Positive weights of BCELoss must be positive, got {weights:?}"
            );
        }
    }
}

/// Binary cross-entropy over every class channel of a segmentation map.
///
/// Should be created using [BCELossConfig].
#[derive(Module, Debug)]
#[module(custom_display)]
pub struct BCELoss<B: Backend> {
    /// Per-class weight of the positive term.
    pub pos_weight: Option<Tensor<B, 1>>,
    /// Label value of void pixels.
    pub ignore_index: usize,
    /// Whether background labels are excluded from the targets.
    pub ignore_bg: bool,
    /// Reduction applied by [`BCELoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl<B: Backend> ModuleDisplay for BCELoss<B> {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("pos_weight", &self.pos_weight)
            .add("ignore_index", &self.ignore_index)
            .add("ignore_bg", &self.ignore_bg)
            .add("reduction", &self.reduction)
            .optional()
    }
}

impl<B: Backend> BCELoss<B> {
    /// Create a new loss with default configuration.
    pub fn new(device: &B::Device) -> Self {
        BCELossConfig::new().init(device)
    }

    /// Label values excluded from the targets.
    pub const fn ignore_set(&self) -> IgnoreSet {
        IgnoreSet::new(self.ignore_index, self.ignore_bg)
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]`
    /// - label: `[batch_size, height, width]` or `[batch_size, num_classes, height, width]`
    /// - old_scores: `[batch_size, num_old_classes, height, width]`, ordinal labels only
    /// - output: `[batch_size, num_classes, height, width]` unreduced, `[1]` otherwise
    ///
    /// # Errors
    ///
    /// - [`LossError::DistillationRequiresOrdinalLabels`] for old scores with multi-labels
    /// - [`LossError::ShapeMismatch`] when batch or spatial sizes disagree
    /// - [`LossError::LabelOutOfRange`] for a non-ignored label without channel
    pub fn forward(
        &self,
        scores: Tensor<B, 4>,
        label: impl Into<SegmentationLabel<B>>,
        old_scores: Option<Tensor<B, 4>>,
    ) -> LossResult<LossOutput<B, 4>> {
        let loss = self.forward_no_reduction(scores, label, old_scores)?;
        Ok(self.reduction.0.apply(loss))
    }

    /// Compute the criterion without reduction.
    ///
    /// # Shapes
    ///
    /// - output: `[batch_size, num_classes, height, width]`
    ///
    /// # Errors
    ///
    /// See [`BCELoss::forward`].
    pub fn forward_no_reduction(
        &self,
        scores: Tensor<B, 4>,
        label: impl Into<SegmentationLabel<B>>,
        old_scores: Option<Tensor<B, 4>>,
    ) -> LossResult<Tensor<B, 4>> {
        let label = label.into();
        self.assertions(&scores, &label, old_scores.as_ref())?;

        let dims = scores.dims();
        let channels = dims[1];
        tracing::debug!(
            ?dims,
            label_rank = label.rank(),
            distill = old_scores.is_some(),
            reduction = %self.reduction.0,
            "BCELoss forward"
        );

        let ignore = self.ignore_set();
        let target = match (label, old_scores) {
            (SegmentationLabel::Ordinal(label), None) => {
                multilabel_target(label, channels, &ignore)?
            }
            (SegmentationLabel::Ordinal(label), Some(old_scores)) => {
                distilled_target(label, old_scores, channels, &ignore)?
            }
            (SegmentationLabel::MultiLabel(target), None) => target,
            (SegmentationLabel::MultiLabel(_), Some(_)) => {
                return Err(LossError::DistillationRequiresOrdinalLabels)
            }
        };

        let loss = sigmoid_cross_entropy(
            flatten_channels_last(scores),
            flatten_channels_last(target),
            self.pos_weight.clone(),
        );
        Ok(unflatten_channels_last(loss, dims))
    }

    fn assertions(
        &self,
        scores: &Tensor<B, 4>,
        label: &SegmentationLabel<B>,
        old_scores: Option<&Tensor<B, 4>>,
    ) -> LossResult<()> {
        let [batch_size, channels, height, width] = scores.dims();

        if matches!(label, SegmentationLabel::MultiLabel(_)) && old_scores.is_some() {
            return Err(LossError::DistillationRequiresOrdinalLabels);
        }
        match label {
            SegmentationLabel::Ordinal(label) => {
                check_dims("scores vs label", &[batch_size, height, width], &label.dims())?
            }
            SegmentationLabel::MultiLabel(target) => {
                check_dims("scores vs multi-label", &scores.dims(), &target.dims())?
            }
        }
        if let Some(old_scores) = old_scores {
            let [old_batch, _, old_height, old_width] = old_scores.dims();
            check_dims(
                "scores vs old scores",
                &[batch_size, height, width],
                &[old_batch, old_height, old_width],
            )?;
        }
        if let Some(weight) = &self.pos_weight {
            check_dims("pos_weight vs classes", &[channels], &weight.dims())?;
        }
        Ok(())
    }
}
