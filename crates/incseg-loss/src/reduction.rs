//! Reduction modes and the output they produce.
//!
//! The reduction of a loss is fixed when it is configured. Depending on the mode a
//! forward pass yields either the per-element loss or a single-element tensor, both
//! carried by [`LossOutput`].

use core::fmt;

use burn::{prelude::*, tensor::TensorData};
use serde::{Deserialize, Serialize};

/// How per-element losses are collapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LossReduction {
    /// Keep the per-element loss.
    None,
    /// Arithmetic mean over all elements.
    #[default]
    Mean,
    /// Sum over all elements.
    Sum,
}

impl fmt::Display for LossReduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Mean => "mean",
            Self::Sum => "sum",
        };
        f.write_str(name)
    }
}

impl LossReduction {
    /// Collapses `loss` according to this mode.
    pub fn apply<B: Backend, const D: usize>(self, loss: Tensor<B, D>) -> LossOutput<B, D> {
        match self {
            Self::None => LossOutput::Unreduced(loss),
            Self::Mean => LossOutput::Reduced(loss.mean()),
            Self::Sum => LossOutput::Reduced(loss.sum()),
        }
    }
}

/// Result of a loss forward pass.
#[derive(Debug, Clone)]
pub enum LossOutput<B: Backend, const D: usize> {
    /// Per-element loss, produced by [`LossReduction::None`].
    Unreduced(Tensor<B, D>),
    /// Single-element tensor, produced by [`LossReduction::Mean`] or [`LossReduction::Sum`].
    Reduced(Tensor<B, 1>),
}

impl<B: Backend, const D: usize> LossOutput<B, D> {
    /// The reduced loss, or `None` for an unreduced output.
    pub fn reduced(self) -> Option<Tensor<B, 1>> {
        match self {
            Self::Reduced(loss) => Some(loss),
            Self::Unreduced(_) => None,
        }
    }

    /// The per-element loss, or `None` for a reduced output.
    pub fn unreduced(self) -> Option<Tensor<B, D>> {
        match self {
            Self::Unreduced(loss) => Some(loss),
            Self::Reduced(_) => None,
        }
    }

    /// Whether the output has been collapsed to a single element.
    pub const fn is_reduced(&self) -> bool {
        matches!(self, Self::Reduced(_))
    }

    /// Dimensions of the carried tensor.
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Unreduced(loss) => loss.dims().to_vec(),
            Self::Reduced(loss) => loss.dims().to_vec(),
        }
    }

    /// Reads the carried tensor back to the host.
    pub fn into_data(self) -> TensorData {
        match self {
            Self::Unreduced(loss) => loss.into_data(),
            Self::Reduced(loss) => loss.into_data(),
        }
    }
}
