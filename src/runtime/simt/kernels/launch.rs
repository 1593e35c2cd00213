//! Block sizes and tiling constants shared by the primitive kernels

use crate::runtime::simt::MAX_GRID_DIM_YZ;

/// Threads per block and number of blocks of the `doti` reduction
pub const DOTI_DIM: u32 = 1024;

/// Threads per block of the ELL row-count and fill kernels
pub const ELL2CSR_DIM: u32 = 256;

/// Threads of the single-block row-pointer scan
pub const SCAN_DIM: u32 = 1024;

/// Threads per block of the `mcscm` kernels
pub const MCSCMNN_DIM: u32 = 256;

/// Lanes per lane group of the `mcscm` kernels
pub const MCSCM_SUB_WF_SIZE: u32 = 8;

/// Threads per block of the `im2col` kernels
pub const IM2COL_DIM: u32 = 256;

/// Output columns per `im2col` tile
pub const IM2COL_TILE_X: u32 = 32;

/// Output rows per `im2col` tile
pub const IM2COL_TILE_Y: u32 = 8;

/// Number of blocks of `block` threads needed to cover `n` items
#[inline]
pub(crate) fn div_blocks(n: usize, block: u32) -> u64 {
    (n as u64).div_ceil(block as u64)
}

/// Narrow a grid extent, reporting extents the device cannot address
#[inline]
pub(crate) fn grid_extent(kernel: &'static str, extent: u64) -> crate::error::Result<u32> {
    u32::try_from(extent)
        .map_err(|_| crate::error::Error::launch(kernel, format!("grid extent {extent} overflows")))
}

/// Grid extent along y or z covering `groups` work groups
///
/// Extents past the device limit are clamped; kernels stride over the
/// remaining groups by the grid extent.
#[inline]
pub(crate) fn grid_extent_yz(groups: u64) -> u32 {
    groups.clamp(1, MAX_GRID_DIM_YZ as u64) as u32
}
