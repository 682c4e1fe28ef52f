//! Dense multi-label targets built from ordinal labels.
//!
//! For a label map `L` of shape `[N, H, W]` and a window of `C` classes starting at
//! `first_class`, the target `T` of shape `[N, C, H, W]` is
//!
//! ```text
//! T[n, c, h, w] = 1  if L[n, h, w] == first_class + c and L[n, h, w] is not ignored
//!                 0  otherwise
//! ```
//!
//! Ignored pixels therefore contribute an all-zero row. With old scores available the
//! old-class channels start from the old model's sigmoid outputs instead of zero, and
//! every pixel with a non-ignored label has its whole row replaced by the hard one-hot.

use burn::{
    prelude::*,
    tensor::{activation::sigmoid, s},
};

use crate::{
    error::{LossError, LossResult},
    label::IgnoreSet,
};

/// One-hot expansion of `label` onto `channels` classes starting at `first_class`.
///
/// Labels outside the window are not checked here; they simply produce no positive.
pub fn one_hot_window<B: Backend>(
    label: Tensor<B, 3, Int>,
    first_class: usize,
    channels: usize,
    ignore: &IgnoreSet,
) -> Tensor<B, 4> {
    let [batch_size, height, width] = label.dims();
    let shape = [batch_size, channels, height, width];
    let device = label.device();

    let classes = Tensor::<B, 1, Int>::arange(
        first_class as i64..(first_class + channels) as i64,
        &device,
    )
    .reshape([1, channels, 1, 1])
    .expand(shape);
    let valid = ignore
        .valid_mask(label.clone())
        .unsqueeze_dim::<4>(1)
        .expand(shape);

    let hits = label.unsqueeze_dim::<4>(1).expand(shape).equal(classes);
    hits.float() * valid.float()
}

/// Multi-label target of `channels` classes for an ordinal label map.
///
/// # Errors
/// [`LossError::LabelOutOfRange`] when a non-ignored label has no channel.
pub fn multilabel_target<B: Backend>(
    label: Tensor<B, 3, Int>,
    channels: usize,
    ignore: &IgnoreSet,
) -> LossResult<Tensor<B, 4>> {
    ignore.check_range(label.clone(), 0, channels)?;
    let target = one_hot_window(label, 0, channels, ignore);
    tracing::trace!(channels, dims = ?target.dims(), "built multi-label target");
    Ok(target)
}

/// Multi-label target whose old-class channels default to the old model's beliefs.
///
/// Channels `1..C_prev` start at `sigmoid(old_scores)`; channel 0 and the new-class
/// channels start at zero. At every pixel whose label is not ignored the row is then
/// replaced by the hard one-hot, so hard labels win wherever both are available.
///
/// # Shapes
/// - label: `[batch_size, height, width]`
/// - old_scores: `[batch_size, C_prev, height, width]` with `C_prev <= channels`
/// - output: `[batch_size, channels, height, width]`
///
/// # Errors
/// - [`LossError::ChannelPartition`] when `C_prev > channels`
/// - [`LossError::LabelOutOfRange`] when a non-ignored label has no channel
pub fn distilled_target<B: Backend>(
    label: Tensor<B, 3, Int>,
    old_scores: Tensor<B, 4>,
    channels: usize,
    ignore: &IgnoreSet,
) -> LossResult<Tensor<B, 4>> {
    let [batch_size, old_channels, height, width] = old_scores.dims();
    if old_channels > channels {
        return Err(LossError::ChannelPartition {
            reason: format!(
                "old scores have {old_channels} channels but the target only has {channels}"
            ),
        });
    }
    ignore.check_range(label.clone(), 0, channels)?;

    let device = label.device();
    let shape = [batch_size, channels, height, width];
    let mut target = Tensor::<B, 4>::zeros(shape, &device);
    if old_channels > 1 {
        let soft = sigmoid(old_scores.detach().slice(s![.., 1..old_channels, .., ..]));
        target = target.slice_assign(
            [0..batch_size, 1..old_channels, 0..height, 0..width],
            soft,
        );
    }

    let labelled = ignore
        .valid_mask(label.clone())
        .unsqueeze_dim::<4>(1)
        .expand(shape);
    let hard = one_hot_window(label, 0, channels, ignore);
    tracing::trace!(channels, old_channels, "merged hard labels into distilled target");

    Ok(target.mask_where(labelled, hard))
}
