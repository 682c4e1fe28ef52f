//! # Channels-Last Flattening
//!
//! Moves the channel axis of a dense `[N, C, H, W]` map last and collapses the
//! rest, producing one row of class scores per pixel. [`unflatten_channels_last`]
//! applies the inverse permutation.

use burn::prelude::*;

/// `[N, C, H, W]` to `[N * H * W, C]`, rows ordered by `(n, h, w)`.
pub fn flatten_channels_last<B: Backend>(tensor: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch_size, channels, height, width] = tensor.dims();
    tensor
        .permute([0, 2, 3, 1])
        .reshape([batch_size * height * width, channels])
}

/// `[N * H * W, C]` back to `[N, C, H, W]`.
///
/// # Panics
/// If the number of elements does not match `dims`.
pub fn unflatten_channels_last<B: Backend>(tensor: Tensor<B, 2>, dims: [usize; 4]) -> Tensor<B, 4> {
    let [batch_size, channels, height, width] = dims;
    tensor
        .reshape([batch_size, height, width, channels])
        .permute([0, 3, 1, 2])
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Distribution, TensorData, Tolerance};

    use super::*;
    use crate::tests::TestBackend;

    #[test]
    fn flatten_puts_one_pixel_per_row() {
        let device = Default::default();
        // [1, 2, 1, 2]: channel 0 = [1, 2], channel 1 = [3, 4]
        let tensor = Tensor::<TestBackend, 4>::from_data(
            TensorData::from([[[[1.0, 2.0]], [[3.0, 4.0]]]]),
            &device,
        );

        let flat = flatten_channels_last(tensor);

        flat.into_data().assert_approx_eq::<f32>(
            &TensorData::from([[1.0, 3.0], [2.0, 4.0]]),
            Tolerance::default(),
        );
    }

    #[test]
    fn unflatten_inverts_flatten_exactly() {
        let device = Default::default();
        let tensor =
            Tensor::<TestBackend, 4>::random([2, 3, 4, 5], Distribution::Normal(0.0, 1.0), &device);

        let flat = flatten_channels_last(tensor.clone());
        let restored = unflatten_channels_last(flat.clone(), [2, 3, 4, 5]);
        let reflattened = flatten_channels_last(restored.clone());

        restored.into_data().assert_eq(&tensor.into_data(), true);
        reflattened.into_data().assert_eq(&flat.into_data(), true);
    }
}
