//! Split of the label space at an incremental training stage.
//!
//! Classes `0..n_old_classes` (background included) were learned by earlier stages,
//! classes `n_old_classes..n_old_classes + n_new_classes` are introduced by the current
//! one. Heads that only score new classes index them from zero.

use burn::config::Config;

/// Class partition of one training stage.
#[derive(Config, Debug, PartialEq, Eq)]
pub struct ClassPartition {
    /// Classes known before this stage, background included. Default: 0
    #[config(default = 0)]
    pub n_old_classes: usize,
    /// Classes introduced by this stage. Default: 0
    #[config(default = 0)]
    pub n_new_classes: usize,
}

impl ClassPartition {
    /// Number of classes seen once this stage is complete.
    pub const fn total_classes(&self) -> usize {
        self.n_old_classes + self.n_new_classes
    }

    /// Channel of class `class_id` in a new-classes-only score map.
    ///
    /// Returns `None` for old classes and ids past the end of the stage.
    pub fn new_channel(&self, class_id: usize) -> Option<usize> {
        class_id
            .checked_sub(self.n_old_classes)
            .filter(|channel| *channel < self.n_new_classes)
    }

    /// Whether `class_id` was learned by an earlier stage.
    pub const fn is_old(&self, class_id: usize) -> bool {
        class_id < self.n_old_classes
    }
}
