//! Errors raised while computing incremental segmentation losses.
//!
//! Every variant is reported before any numeric work happens, so a failed call never
//! produces a partially computed loss.

use thiserror::Error;

use crate::reduction::LossReduction;

/// Error type for loss computation in incseg-loss.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LossError {
    /// The configured reduction is not supported by this loss.
    #[error("unsupported reduction '{reduction}' for {loss}")]
    UnsupportedReduction {
        /// Name of the loss that rejected the reduction.
        loss: &'static str,
        /// The rejected reduction.
        reduction: LossReduction,
    },

    /// Label data whose rank is neither 3 (ordinal) nor 4 (multi-label).
    #[error("unsupported label shape: expected rank 3 [N, H, W] or rank 4 [N, C, H, W], got rank {rank}")]
    UnsupportedLabelShape {
        /// Rank of the rejected label data.
        rank: usize,
    },

    /// Soft targets from old scores can only be merged into ordinal labels.
    #[error("old scores require ordinal [N, H, W] labels, got pre-expanded [N, C, H, W] labels")]
    DistillationRequiresOrdinalLabels,

    /// Two tensors of the same call disagree on a dimension.
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which pairing failed.
        what: &'static str,
        /// Expected dimensions.
        expected: Vec<usize>,
        /// Actual dimensions.
        actual: Vec<usize>,
    },

    /// A label outside the ignore set that has no matching channel.
    #[error("label {label} is outside the valid class range {start}..{end}")]
    LabelOutOfRange {
        /// Offending label value.
        label: i64,
        /// First class id with a channel.
        start: usize,
        /// One past the last class id with a channel.
        end: usize,
    },

    /// Channel counts that cannot be split into background, old and new classes.
    #[error("invalid channel partition: {reason}")]
    ChannelPartition {
        /// Description of the violated constraint.
        reason: String,
    },
}

/// A specialized `Result` type for loss computation.
pub type LossResult<T> = Result<T, LossError>;

/// Checks that `actual` equals `expected` on the given axes.
pub(crate) fn check_dims(
    what: &'static str,
    expected: &[usize],
    actual: &[usize],
) -> LossResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(LossError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
