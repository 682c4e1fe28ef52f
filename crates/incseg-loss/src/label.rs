//! Segmentation labels and the set of label values excluded from supervision.

use burn::{
    prelude::*,
    tensor::{cast::ToElement, TensorData},
};

use crate::error::{LossError, LossResult};

/// Per-pixel ground truth accepted by the multi-label losses.
#[derive(Debug, Clone)]
pub enum SegmentationLabel<B: Backend> {
    /// One class id per pixel, `[batch_size, height, width]`.
    Ordinal(Tensor<B, 3, Int>),
    /// Already expanded {0, 1} targets, `[batch_size, num_classes, height, width]`.
    MultiLabel(Tensor<B, 4>),
}

impl<B: Backend> SegmentationLabel<B> {
    /// Builds a label from host data, choosing the form from its rank.
    ///
    /// # Errors
    /// [`LossError::UnsupportedLabelShape`] for ranks other than 3 and 4.
    pub fn from_data(data: TensorData, device: &B::Device) -> LossResult<Self> {
        match data.shape.len() {
            3 => Ok(Self::Ordinal(Tensor::from_data(data, device))),
            4 => Ok(Self::MultiLabel(Tensor::from_data(data, device))),
            rank => Err(LossError::UnsupportedLabelShape { rank }),
        }
    }

    /// Rank of the wrapped tensor.
    pub const fn rank(&self) -> usize {
        match self {
            Self::Ordinal(_) => 3,
            Self::MultiLabel(_) => 4,
        }
    }

    /// `[batch_size, height, width]` of the wrapped tensor.
    pub fn spatial_dims(&self) -> [usize; 3] {
        match self {
            Self::Ordinal(label) => label.dims(),
            Self::MultiLabel(label) => {
                let [batch_size, _, height, width] = label.dims();
                [batch_size, height, width]
            }
        }
    }
}

impl<B: Backend> From<Tensor<B, 3, Int>> for SegmentationLabel<B> {
    fn from(label: Tensor<B, 3, Int>) -> Self {
        Self::Ordinal(label)
    }
}

impl<B: Backend> From<Tensor<B, 4>> for SegmentationLabel<B> {
    fn from(label: Tensor<B, 4>) -> Self {
        Self::MultiLabel(label)
    }
}

/// Label values that never produce a positive target.
///
/// Always holds the ignore sentinel; holds background (class 0) as well when
/// background supervision is handled elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreSet {
    /// Sentinel for void or unlabeled pixels.
    pub ignore_index: usize,
    /// Whether class 0 is ignored too.
    pub ignore_bg: bool,
}

impl IgnoreSet {
    /// Creates an ignore set.
    pub const fn new(ignore_index: usize, ignore_bg: bool) -> Self {
        Self {
            ignore_index,
            ignore_bg,
        }
    }

    /// Whether `value` is ignored.
    pub const fn contains(&self, value: i64) -> bool {
        value == self.ignore_index as i64 || (self.ignore_bg && value == 0)
    }

    /// `true` where the label is not ignored.
    pub fn valid_mask<B: Backend>(&self, label: Tensor<B, 3, Int>) -> Tensor<B, 3, Bool> {
        let not_void = label.clone().not_equal_elem(self.ignore_index as i64);
        if self.ignore_bg {
            (not_void.int() * label.not_equal_elem(0).int()).greater_elem(0)
        } else {
            not_void
        }
    }

    /// Checks that every non-ignored label lies in `start..end`.
    ///
    /// # Errors
    /// [`LossError::LabelOutOfRange`] with the first offending extreme found.
    pub fn check_range<B: Backend>(
        &self,
        label: Tensor<B, 3, Int>,
        start: usize,
        end: usize,
    ) -> LossResult<()> {
        let valid = self.valid_mask(label.clone());
        let valid_count = valid.clone().int().sum().into_scalar().to_i64();
        if valid_count == 0 {
            return Ok(());
        }

        let ignored = valid.bool_not();
        // Ignored pixels are moved inside the window so they never win min/max.
        let low = label
            .clone()
            .mask_fill(ignored.clone(), start as i64)
            .min()
            .into_scalar()
            .to_i64();
        let high = label
            .mask_fill(ignored, start as i64)
            .max()
            .into_scalar()
            .to_i64();

        for value in [low, high] {
            if value < start as i64 || value >= end as i64 {
                return Err(LossError::LabelOutOfRange {
                    label: value,
                    start,
                    end,
                });
            }
        }
        Ok(())
    }
}

impl Default for IgnoreSet {
    fn default() -> Self {
        Self::new(255, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;

    fn label(data: TensorData) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_data(data, &Default::default())
    }

    #[test]
    fn ignore_set_contains_sentinel_and_optional_background() {
        let with_bg = IgnoreSet::new(255, true);
        let without_bg = IgnoreSet::new(255, false);

        assert!(with_bg.contains(255));
        assert!(with_bg.contains(0));
        assert!(!with_bg.contains(3));
        assert!(without_bg.contains(255));
        assert!(!without_bg.contains(0));
    }

    #[test]
    fn valid_mask_excludes_ignored_values() {
        let label = label(TensorData::from([[[0, 1], [255, 2]]]));

        let mask = IgnoreSet::new(255, true).valid_mask(label.clone());
        let mask_keep_bg = IgnoreSet::new(255, false).valid_mask(label);

        mask.into_data()
            .assert_eq(&TensorData::from([[[false, true], [false, true]]]), false);
        mask_keep_bg
            .into_data()
            .assert_eq(&TensorData::from([[[true, true], [false, true]]]), false);
    }

    #[test]
    fn check_range_accepts_ignored_values_past_the_end() {
        let label = label(TensorData::from([[[0, 2], [255, 1]]]));

        assert_eq!(IgnoreSet::new(255, false).check_range(label, 0, 3), Ok(()));
    }

    #[test]
    fn check_range_rejects_label_without_channel() {
        let label = label(TensorData::from([[[0, 3], [255, 1]]]));

        let err = IgnoreSet::new(255, false)
            .check_range(label, 0, 3)
            .unwrap_err();

        assert_eq!(
            err,
            LossError::LabelOutOfRange {
                label: 3,
                start: 0,
                end: 3
            }
        );
    }

    #[test]
    fn check_range_rejects_label_below_window() {
        let label = label(TensorData::from([[[0, 5], [255, 7]]]));

        let err = IgnoreSet::new(255, true)
            .check_range(label, 6, 8)
            .unwrap_err();

        assert_eq!(
            err,
            LossError::LabelOutOfRange {
                label: 5,
                start: 6,
                end: 8
            }
        );
    }

    #[test]
    fn check_range_passes_when_every_pixel_is_ignored() {
        let label = label(TensorData::from([[[255, 255], [255, 255]]]));

        assert_eq!(IgnoreSet::new(255, true).check_range(label, 1, 2), Ok(()));
    }

    #[test]
    fn label_from_data_dispatches_on_rank() {
        let device = Default::default();

        let ordinal = SegmentationLabel::<TestBackend>::from_data(
            TensorData::from([[[0, 1], [2, 255]]]),
            &device,
        )
        .expect("rank 3 label");
        let multi = SegmentationLabel::<TestBackend>::from_data(
            TensorData::from([[[[0.0, 1.0]], [[1.0, 0.0]]]]),
            &device,
        )
        .expect("rank 4 label");
        let flat = SegmentationLabel::<TestBackend>::from_data(TensorData::from([0, 1]), &device);

        assert_eq!(ordinal.rank(), 3);
        assert_eq!(ordinal.spatial_dims(), [1, 2, 2]);
        assert_eq!(multi.rank(), 4);
        assert_eq!(multi.spatial_dims(), [1, 1, 2]);
        assert_eq!(
            flat.unwrap_err(),
            LossError::UnsupportedLabelShape { rank: 1 }
        );
    }
}
