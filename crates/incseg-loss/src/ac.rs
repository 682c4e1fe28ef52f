//! Auxiliary classifier loss.
//!
//! Drives a single-channel auxiliary score map towards the negative class by comparing
//! it with an all-zero target:
//!
//! ```text
//! l(x) = -log(1 - σ(x)) = softplus(x)
//! ```
//!
//! computed through the stable sigmoid cross-entropy so it stays finite for any score.

use burn::{
    module::{Content, DisplaySettings, Ignored, Module, ModuleDisplay},
    prelude::*,
};
use incseg_extra_ops::sigmoid_cross_entropy;

use crate::{
    error::{check_dims, LossResult},
    reduction::{LossOutput, LossReduction},
};

/// Configuration for creating an [auxiliary classifier loss](ACLoss).
#[derive(Config, Debug)]
pub struct ACLossConfig {
    /// Reduction of the per-pixel loss. Default: none
    #[config(default = "LossReduction::None")]
    pub reduction: LossReduction,
}

impl ACLossConfig {
    /// Initialize [auxiliary classifier loss](ACLoss).
    pub fn init(&self) -> ACLoss {
        ACLoss {
            reduction: Ignored(self.reduction),
        }
    }
}

/// Auxiliary classifier loss.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct ACLoss {
    /// Reduction applied by [`ACLoss::forward`].
    pub reduction: Ignored<LossReduction>,
}

impl Default for ACLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDisplay for ACLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content.add("reduction", &self.reduction).optional()
    }
}

impl ACLoss {
    /// Create a new auxiliary classifier loss with default configuration.
    pub fn new() -> Self {
        ACLossConfig::new().init()
    }

    /// Compute the criterion with the configured reduction.
    ///
    /// # Shapes
    ///
    /// - scores: `[batch_size, 1, height, width]`
    /// - output: `[batch_size, 1, height, width]` unreduced, `[1]` otherwise
    ///
    /// # Errors
    ///
    /// [`crate::LossError::ShapeMismatch`] when the map has more than one channel.
    pub fn forward<B: Backend>(&self, scores: Tensor<B, 4>) -> LossResult<LossOutput<B, 4>> {
        let [batch_size, channels, height, width] = scores.dims();
        check_dims(
            "auxiliary scores",
            &[batch_size, 1, height, width],
            &[batch_size, channels, height, width],
        )?;
        tracing::debug!(dims = ?scores.dims(), reduction = %self.reduction.0, "ACLoss forward");

        let target = scores.zeros_like();
        let loss = sigmoid_cross_entropy(scores, target, None);
        Ok(self.reduction.0.apply(loss))
    }
}
