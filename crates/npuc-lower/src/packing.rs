//! Brick-format packing of linear data.
//!
//! Fully-connected inputs are one-dimensional, but the DMA moves data in
//! brick groups. The packer picks the smallest 4-D shape whose brick-format
//! layout covers a given element count contiguously.

use npuc_ir::{div_round_up, TensorShape};

const PATCH_HEIGHT: u32 = 4;
const PATCH_WIDTH: u32 = 4;

/// Returns the smallest shape that contains `num_elements` linear elements
/// when interpreted in brick format.
///
/// Fewer than one brick of elements fits a single 4x4 patch with up to
/// `BC` channels. Between one and four bricks the XY footprint grows to a
/// patch column and then a full brick group, always at `BC` channels since
/// the leading bricks are full. Beyond that, whole brick groups stack
/// along depth and only the final group may be partially filled.
pub(crate) fn shape_containing_linear_elements(
    brick_group_shape: TensorShape,
    num_elements: u32,
) -> TensorShape {
    let brick_group_height = brick_group_shape[1];
    let brick_group_width = brick_group_shape[2];
    let brick_group_channels = brick_group_shape[3];
    let patches_per_group_height = brick_group_height / PATCH_HEIGHT;
    let patches_per_group_width = brick_group_width / PATCH_WIDTH;
    let patches_per_brick_group =
        patches_per_group_height * patches_per_group_width * brick_group_channels;

    let num_patches = div_round_up(num_elements, PATCH_WIDTH * PATCH_HEIGHT);

    let width = if num_patches <= brick_group_channels * patches_per_group_height {
        PATCH_WIDTH
    } else {
        brick_group_width
    };
    let height = if num_patches <= brick_group_channels {
        PATCH_HEIGHT
    } else {
        brick_group_height
    };
    let num_full_brick_groups = num_patches / patches_per_brick_group;
    let channels = brick_group_channels * num_full_brick_groups
        + brick_group_channels.min(num_patches % patches_per_brick_group);

    [1, height, width, channels]
}

/// Copies `data` and extends it to `new_size` with `pad_value`.
pub(crate) fn pad(data: &[u8], new_size: usize, pad_value: u8) -> Vec<u8> {
    let mut result = data.to_vec();
    result.resize(new_size, pad_value);
    result
}
