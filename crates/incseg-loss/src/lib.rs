//! Loss functions for class-incremental semantic segmentation.
//!
//! A model trained in stages learns new classes at every step while the ground truth of
//! a step only annotates the classes introduced by it. The losses in this crate cover
//! the supervision of the new classes as well as distillation from the frozen model of
//! the previous stage, on top of the Burn deep learning framework.
//!
//! ## Core Loss Functions
//!
//! ### Binary Multi-label Losses
//! - **[`BCELoss`]**: Per-class binary cross-entropy, optionally filling unlabelled old
//!   classes with the previous model's predictions
//! - **[`WBCELoss`]**: Binary cross-entropy on a score map holding only the new classes
//! - **[`ACLoss`]**: Auxiliary classifier loss pushing a single channel to negative
//!
//! ### Distillation Losses
//! - **[`KDLoss`]**: Binary cross-entropy against the previous model's soft targets
//! - **[`UnbiasedKDLoss`]**: Softmax distillation folding new classes into background
//!
//! ### Classification Losses
//! - **[`UnbiasedCrossEntropyLoss`]**: Cross-entropy folding old classes into background
//!
//! ## Usage Example
//!
//! ```rust
//! use burn::prelude::*;
//! use incseg_loss::{
//!     ClassPartition, UnbiasedCrossEntropyLoss, UnbiasedCrossEntropyLossConfig,
//!     UnbiasedKDLoss, UnbiasedKDLossConfig,
//! };
//!
//! fn create_stage_losses(partition: &ClassPartition) -> (UnbiasedCrossEntropyLoss, UnbiasedKDLoss) {
//!     let ce = UnbiasedCrossEntropyLossConfig::new(partition.n_old_classes).init();
//!     let kd = UnbiasedKDLossConfig::new().with_alpha(1.0).init();
//!
//!     (ce, kd)
//! }
//! ```
//!
//! Every loss exposes `forward` applying its configured [`LossReduction`] and
//! `forward_no_reduction` keeping the per-element shape. Malformed inputs are reported
//! through [`LossError`]; invalid configurations panic in `init`.

mod ac;
mod bce;
mod error;
mod kd;
mod label;
mod partition;
mod reduction;
pub mod target;
mod unbiased_ce;
mod unbiased_kd;
mod wbce;

// Re-export loss functions and configurations
pub use ac::{ACLoss, ACLossConfig};
pub use bce::{BCELoss, BCELossConfig};
pub use kd::{KDLoss, KDLossConfig};
pub use unbiased_ce::{UnbiasedCrossEntropyLoss, UnbiasedCrossEntropyLossConfig};
pub use unbiased_kd::{UnbiasedKDLoss, UnbiasedKDLossConfig};
pub use wbce::{WBCELoss, WBCELossConfig};

// Shared building blocks
pub use error::{LossError, LossResult};
pub use label::{IgnoreSet, SegmentationLabel};
pub use partition::ClassPartition;
pub use reduction::{LossOutput, LossReduction};
pub use target::{distilled_target, multilabel_target, one_hot_window};
