//! Unbiased knowledge distillation.
//!
//! The previous model's background channel stands for both true background and every
//! class it has not seen yet. Before comparing distributions, the current model's
//! background probability therefore absorbs the mass of the new classes:
//!
//! ```text
//! den          = logsumexp(x[0..C])
//! log p̂_bkg    = logsumexp(x[{0} ∪ C_prev..C]) - den
//! log p̂_c      = x_c - den                          for c in 1..C_prev
//! q            = softmax(alpha · x_old)
//! l            = -(q_0 · log p̂_bkg + Σ_c q_c · log p̂_c) / C_prev
//! ```
//!
//! When both models have the same number of channels only the background term remains.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
    tensor::{activation::softmax, s},
};
use incseg_extra_ops::TensorExtraOps;

use crate::{
    error::{check_dims, LossError, LossResult},
    reduction::{LossOutput, LossReduction},
};

/// Configuration for creating an [unbiased distillation loss](UnbiasedKDLoss).
#[derive(Config, Debug)]
pub struct UnbiasedKDLossConfig {
    /// Reduction of the per-pixel loss. Default: mean
    #[config(default = "LossReduction::Mean")]
    pub reduction: LossReduction,
    /// Scale applied to the old scores before the softmax. Default: 1.0
    #[config(default = 1.0)]
    pub alpha: f64,
}

impl UnbiasedKDLossConfig {
    /// Initialize [unbiased distillation loss](UnbiasedKDLoss).
    pub fn init(&self) -> UnbiasedKDLoss {
        self.assertions();
        UnbiasedKDLoss {
            alpha: self.alpha,
            reduction: Ignored(self.reduction),
        }
    }

    fn assertions(&self) {
        assert!(
            self.alpha.is_finite() && self.alpha >= 0.0,
            "Alpha for UnbiasedKDLoss must be finite and non-negative, got {}",
            self.alpha
        );
    }
}

/// Distillation loss that folds unseen classes into the background.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct UnbiasedKDLoss {
    /// Scale applied to the old scores before the softmax.
    pub alpha: f64,
    /// Reduction applied by [`UnbiasedKDLoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl Default for UnbiasedKDLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for UnbiasedKDLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("alpha", &self.alpha)
            .add("reduction", &self.reduction)
            .optional()
    }
}

impl UnbiasedKDLoss {
    /// Create a new unbiased distillation loss with default configuration.
    pub fn new() -> Self {
        UnbiasedKDLossConfig::new().init()
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// Pixels where `mask` is `false` contribute zero but still count towards the mean.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]`
    /// - old_scores: `[batch_size, num_old_classes, height, width]`, `num_old_classes <= num_classes`
    /// - mask: `[batch_size, height, width]`
    /// - output: `[batch_size, height, width]` unreduced, `[1]` otherwise
    ///
    /// # Errors
    ///
    /// - [`LossError::ChannelPartition`] when the old model has more channels, or none
    /// - [`LossError::ShapeMismatch`] when batch or spatial sizes disagree
    pub fn forward<B: Backend>(
        &self,
        scores: Tensor<B, 4>,
        old_scores: Tensor<B, 4>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> LossResult<LossOutput<B, 3>> {
        let loss = self.forward_no_reduction(scores, old_scores, mask)?;
        Ok(self.reduction.0.apply(loss))
    }

    /// Compute the criterion without reduction.
    ///
    /// # Shapes
    ///
    /// - output: `[batch_size, height, width]`
    ///
    /// # Errors
    ///
    /// See [`UnbiasedKDLoss::forward`].
    pub fn forward_no_reduction<B: Backend>(
        &self,
        scores: Tensor<B, 4>,
        old_scores: Tensor<B, 4>,
        mask: Option<Tensor<B, 3, Bool>>,
    ) -> LossResult<Tensor<B, 3>> {
        Self::assertions(&scores, &old_scores, mask.as_ref())?;

        let [batch_size, channels, height, width] = scores.dims();
        let old_channels = old_scores.dims()[1];
        let new_channels = channels - old_channels;
        tracing::debug!(
            dims = ?scores.dims(),
            old_channels,
            new_channels,
            alpha = self.alpha,
            reduction = %self.reduction.0,
            "UnbiasedKDLoss forward"
        );

        let labels = softmax(old_scores.detach().mul_scalar(self.alpha), 1);
        let den = scores.clone().logsumexp(1);

        let background = scores.clone().slice(s![.., 0..1, .., ..]);
        let background = if new_channels > 0 {
            Tensor::cat(
                vec![
                    background,
                    scores.clone().slice(s![.., old_channels..channels, .., ..]),
                ],
                1,
            )
        } else {
            background
        };
        let outputs_bkg = background.logsumexp(1) - den.clone();
        let mut loss = labels.clone().slice(s![.., 0..1, .., ..]) * outputs_bkg;

        // With no new classes the old-class range is empty and only background remains.
        if new_channels > 0 && old_channels > 1 {
            let old_shape = [batch_size, old_channels - 1, height, width];
            let outputs_old =
                scores.slice(s![.., 1..old_channels, .., ..]) - den.expand(old_shape);
            let labels_old = labels.slice(s![.., 1..old_channels, .., ..]);
            loss = loss + (labels_old * outputs_old).sum_dim(1);
        }

        let mut loss = loss.div_scalar(old_channels as f64).squeeze::<3>(1);
        if let Some(mask) = mask {
            loss = loss * mask.float();
        }
        Ok(loss.neg())
    }

    fn assertions<B: Backend>(
        scores: &Tensor<B, 4>,
        old_scores: &Tensor<B, 4>,
        mask: Option<&Tensor<B, 3, Bool>>,
    ) -> LossResult<()> {
        let [batch_size, channels, height, width] = scores.dims();
        let [old_batch, old_channels, old_height, old_width] = old_scores.dims();

        if old_channels == 0 || old_channels > channels {
            return Err(LossError::ChannelPartition {
                reason: format!(
                    "old scores need between 1 and {channels} channels, got {old_channels}"
                ),
            });
        }
        check_dims(
            "scores vs old scores",
            &[batch_size, height, width],
            &[old_batch, old_height, old_width],
        )?;
        if let Some(mask) = mask {
            check_dims("scores vs mask", &[batch_size, height, width], &mask.dims())?;
        }
        Ok(())
    }
}
