//! Unbiased cross-entropy.
//!
//! Ground truth at a later stage only annotates the new classes; pixels of classes seen
//! before are labelled background. The background probability is therefore taken as the
//! total mass of every old class:
//!
//! ```text
//! den        = logsumexp(x[0..C])
//! log p̂_0    = logsumexp(x[0..old_cl]) - den
//! log p̂_c    = x_c - den                     for c in old_cl..C
//! ```
//!
//! and labels below `old_cl` are mapped to 0 before the negative log-likelihood is taken.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
    tensor::{cast::ToElement, s},
};
use incseg_extra_ops::TensorExtraOps;

use crate::{
    error::{check_dims, LossError, LossResult},
    label::IgnoreSet,
    reduction::{LossOutput, LossReduction},
};

/// Configuration for creating an [unbiased cross-entropy](UnbiasedCrossEntropyLoss).
#[derive(Config, Debug)]
pub struct UnbiasedCrossEntropyLossConfig {
    /// Classes known before this stage, background included.
    pub old_cl: usize,
    /// Label value of void pixels. Default: 255
    #[config(default = 255)]
    pub ignore_index: usize,
    /// Reduction of the per-pixel loss. Default: mean
    #[config(default = "LossReduction::Mean")]
    pub reduction: LossReduction,
}

impl UnbiasedCrossEntropyLossConfig {
    /// Initialize [unbiased cross-entropy](UnbiasedCrossEntropyLoss).
    pub fn init(&self) -> UnbiasedCrossEntropyLoss {
        self.assertions();
        UnbiasedCrossEntropyLoss {
            old_cl: self.old_cl,
            ignore_index: self.ignore_index,
            reduction: Ignored(self.reduction),
        }
    }

    fn assertions(&self) {
        assert!(
            self.old_cl >= 1,
            "UnbiasedCrossEntropyLoss needs at least the background as old class"
        );
    }
}

/// Cross-entropy whose background absorbs all previously learned classes.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct UnbiasedCrossEntropyLoss {
    /// Classes known before this stage, background included.
    pub old_cl: usize,
    /// Label value of void pixels.
    pub ignore_index: usize,
    /// Reduction applied by [`UnbiasedCrossEntropyLoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl ModuleDisplay for UnbiasedCrossEntropyLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("old_cl", &self.old_cl)
            .add("ignore_index", &self.ignore_index)
            .add("reduction", &self.reduction)
            .optional()
    }
}

impl UnbiasedCrossEntropyLoss {
    /// Per-class log-probabilities with the old classes merged into background.
    ///
    /// Channels `1..old_cl` are zero; no label points at them after remapping.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]`
    /// - output: `[batch_size, num_classes, height, width]`
    pub fn log_probabilities<B: Backend>(&self, scores: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, channels, height, width] = scores.dims();
        let old_cl = self.old_cl;
        let den = scores.clone().logsumexp(1);

        let mut outputs = vec![
            scores.clone().slice(s![.., 0..old_cl, .., ..]).logsumexp(1) - den.clone(),
        ];
        if old_cl > 1 {
            outputs.push(Tensor::zeros(
                [batch_size, old_cl - 1, height, width],
                &scores.device(),
            ));
        }
        if old_cl < channels {
            let new_shape = [batch_size, channels - old_cl, height, width];
            outputs.push(scores.slice(s![.., old_cl..channels, .., ..]) - den.expand(new_shape));
        }
        Tensor::cat(outputs, 1)
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// Void pixels are left out of both the sum and the pixel count of the mean. A batch
    /// with no labelled pixel yields a zero mean.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, num_classes, height, width]`
    /// - label: `[batch_size, height, width]`
    /// - output: `[batch_size, height, width]` unreduced, `[1]` otherwise
    ///
    /// # Errors
    ///
    /// - [`LossError::ChannelPartition`] when `old_cl` exceeds the channel count
    /// - [`LossError::ShapeMismatch`] when batch or spatial sizes disagree
    /// - [`LossError::LabelOutOfRange`] for a non-void label outside `0..num_classes`
    pub fn forward<B: Backend>(
        &self,
        scores: Tensor<B, 4>,
        label: Tensor<B, 3, Int>,
    ) -> LossResult<LossOutput<B, 3>> {
        let (loss, valid) = self.masked_nll(scores, label)?;
        let output = match self.reduction.0 {
            LossReduction::None => LossOutput::Unreduced(loss),
            LossReduction::Sum => LossOutput::Reduced(loss.sum()),
            LossReduction::Mean => {
                let count = valid.int().sum();
                if count.clone().into_scalar().to_i64() == 0 {
                    tracing::warn!("UnbiasedCrossEntropyLoss: every pixel is ignored");
                }
                LossOutput::Reduced(loss.sum() / count.float().clamp_min(1.0))
            }
        };
        Ok(output)
    }

    /// Compute the criterion without reduction. Void pixels hold zero.
    ///
    /// # Shapes
    ///
    /// - output: `[batch_size, height, width]`
    ///
    /// # Errors
    ///
    /// See [`UnbiasedCrossEntropyLoss::forward`].
    pub fn forward_no_reduction<B: Backend>(
        &self,
        scores: Tensor<B, 4>,
        label: Tensor<B, 3, Int>,
    ) -> LossResult<Tensor<B, 3>> {
        self.masked_nll(scores, label).map(|(loss, _)| loss)
    }

    fn masked_nll<B: Backend>(
        &self,
        scores: Tensor<B, 4>,
        label: Tensor<B, 3, Int>,
    ) -> LossResult<(Tensor<B, 3>, Tensor<B, 3, Bool>)> {
        let [batch_size, channels, height, width] = scores.dims();
        if self.old_cl > channels {
            return Err(LossError::ChannelPartition {
                reason: format!(
                    "old_cl is {} but the scores only have {channels} channels",
                    self.old_cl
                ),
            });
        }
        check_dims("scores vs label", &[batch_size, height, width], &label.dims())?;

        let ignore = IgnoreSet::new(self.ignore_index, false);
        ignore.check_range(label.clone(), 0, channels)?;
        tracing::debug!(
            dims = ?scores.dims(),
            old_cl = self.old_cl,
            reduction = %self.reduction.0,
            "UnbiasedCrossEntropyLoss forward"
        );

        let outputs = self.log_probabilities(scores);

        let valid = ignore.valid_mask(label.clone());
        let old = label.clone().lower_elem(self.old_cl as i64);
        let index = label
            .mask_fill(old, 0)
            .mask_fill(valid.clone().bool_not(), 0)
            .unsqueeze_dim::<4>(1);
        let picked = outputs.gather(1, index).squeeze::<3>(1);
        let loss = picked.neg() * valid.clone().float();

        Ok((loss, valid))
    }
}
