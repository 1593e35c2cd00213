//! Image to column kernels
//!
//! Every block produces one [`IM2COL_TILE_X`] x [`IM2COL_TILE_Y`] tile of
//! output positions for one `(batch, channel)` plane at a time, striding over
//! planes by the grid's y extent. It first stages the
//! receptive field of the tile, padding included, in dynamic shared memory,
//! then writes every window offset of every output position of the tile.
//!
//! The two storage layouts differ only in how an image element and a column
//! element are addressed; they are separate kernel types selected by a
//! marker.

use std::marker::PhantomData;

use super::launch::{IM2COL_DIM, IM2COL_TILE_X, IM2COL_TILE_Y, grid_extent, grid_extent_yz};
use crate::dtype::Element;
use crate::error::Result;
use crate::ops::im2col_common::Im2colParams;
use crate::runtime::simt::{BlockCtx, DeviceSlice, DeviceSliceMut, Kernel, LaunchConfig, launch_config};

const TILE_X: usize = IM2COL_TILE_X as usize;
const TILE_Y: usize = IM2COL_TILE_Y as usize;

/// Element addressing of an im2col storage layout
pub trait Im2colAddressing: Send + Sync + 'static {
    /// Kernel symbol for this layout
    const KERNEL_NAME: &'static str;

    /// Position of image element `(b, ch, iy, ix)`
    fn im_index(p: &Im2colParams, b: usize, ch: usize, iy: usize, ix: usize) -> usize;

    /// Position of the column element for window offset `(ky, kx)` at output
    /// position `(oy, ox)`
    #[allow(clippy::too_many_arguments)]
    fn col_index(
        p: &Im2colParams,
        b: usize,
        ch: usize,
        ky: usize,
        kx: usize,
        oy: usize,
        ox: usize,
    ) -> usize;
}

/// Batch, channel, row, column
pub struct Nchw;

/// Batch, row, column, channel
pub struct Nhwc;

impl Im2colAddressing for Nchw {
    const KERNEL_NAME: &'static str = "im2col_nchw_kernel";

    #[inline]
    fn im_index(p: &Im2colParams, b: usize, ch: usize, iy: usize, ix: usize) -> usize {
        ((b * p.channels + ch) * p.height + iy) * p.width + ix
    }

    #[inline]
    fn col_index(
        p: &Im2colParams,
        b: usize,
        ch: usize,
        ky: usize,
        kx: usize,
        oy: usize,
        ox: usize,
    ) -> usize {
        let window = p.kernel_h * p.kernel_w;
        let plane = p.output_h * p.output_w;
        ((b * p.channels + ch) * window + ky * p.kernel_w + kx) * plane + oy * p.output_w + ox
    }
}

impl Im2colAddressing for Nhwc {
    const KERNEL_NAME: &'static str = "im2col_nhwc_kernel";

    #[inline]
    fn im_index(p: &Im2colParams, b: usize, ch: usize, iy: usize, ix: usize) -> usize {
        ((b * p.height + iy) * p.width + ix) * p.channels + ch
    }

    #[inline]
    fn col_index(
        p: &Im2colParams,
        b: usize,
        ch: usize,
        ky: usize,
        kx: usize,
        oy: usize,
        ox: usize,
    ) -> usize {
        let window = p.kernel_h * p.kernel_w;
        let plane = p.output_h * p.output_w;
        ((b * plane + oy * p.output_w + ox) * window + ky * p.kernel_w + kx) * p.channels + ch
    }
}

/// Elements of shared memory staged by one block
pub fn im2col_lds_len(p: &Im2colParams) -> usize {
    (TILE_X * p.stride_w + p.kernel_w) * (TILE_Y * p.stride_h + p.kernel_h)
}

/// Grid `(tiles_x * tiles_y, min(batch * channels, 65535))` with the staged
/// receptive field as dynamic shared memory
pub fn launch_im2col<T: Element>(p: &Im2colParams) -> Result<LaunchConfig> {
    let tiles = p.output_w.div_ceil(TILE_X) as u64 * p.output_h.div_ceil(TILE_Y) as u64;
    let planes = p.batch as u64 * p.channels as u64;
    let bytes = im2col_lds_len(p) as u64 * T::DTYPE.size_in_bytes() as u64;
    Ok(launch_config(
        (grid_extent("im2col", tiles)?, grid_extent_yz(planes), 1),
        IM2COL_DIM,
        u32::try_from(bytes).unwrap_or(u32::MAX),
    ))
}

/// im2col over one storage layout
pub struct Im2col<'a, T, L> {
    pub(crate) params: Im2colParams,
    pub(crate) im: DeviceSlice<'a, T>,
    pub(crate) col: DeviceSliceMut<'a, T>,
    pub(crate) _layout: PhantomData<L>,
}

impl<'a, T, L> Im2col<'a, T, L> {
    pub(crate) fn new(params: Im2colParams, im: DeviceSlice<'a, T>, col: DeviceSliceMut<'a, T>) -> Self {
        Self {
            params,
            im,
            col,
            _layout: PhantomData,
        }
    }
}

impl<T: Element, L: Im2colAddressing> Kernel for Im2col<'_, T, L> {
    const NAME: &'static str = L::KERNEL_NAME;

    fn run_block(&self, ctx: &BlockCtx) {
        let p = &self.params;
        let Im2colParams {
            channels,
            height,
            width,
            kernel_h,
            kernel_w,
            output_h,
            output_w,
            pad_h,
            pad_w,
            stride_h,
            stride_w,
            ..
        } = *p;
        let block = ctx.block_dim().x as usize;

        let blk = ctx.block_idx().x as usize;
        let tiles_x = output_w.div_ceil(TILE_X);
        let tile_x0 = (blk % tiles_x) * TILE_X;
        let tile_y0 = (blk / tiles_x) * TILE_Y;
        let tile_cols = TILE_X.min(output_w - tile_x0);
        let tile_rows = TILE_Y.min(output_h - tile_y0);

        let im_cols = TILE_X * stride_w + kernel_w;
        let mut local = ctx.dynamic_shared::<T>();
        let lds = local.len();

        let planes = p.batch * channels;
        let mut plane = ctx.block_idx().y as usize;
        while plane < planes {
            let (b, ch) = (plane / channels, plane % channels);

            // Stage the receptive field; positions in the padding read as zero
            ctx.threads(|tid| {
                let mut i = tid as usize;
                while i < lds {
                    let y = tile_y0 * stride_h + i / im_cols;
                    let x = tile_x0 * stride_w + i % im_cols;
                    local[i] = if y >= pad_h && y < height + pad_h && x >= pad_w && x < width + pad_w {
                        self.im.load(L::im_index(p, b, ch, y - pad_h, x - pad_w))
                    } else {
                        T::zero()
                    };
                    i += block;
                }
            });

            ctx.threads(|tid| {
                let mut i = tid as usize;
                while i < tile_cols * tile_rows {
                    let ox = i % tile_cols;
                    let oy = i / tile_cols;
                    for ky in 0..kernel_h {
                        for kx in 0..kernel_w {
                            let v = local[(oy * stride_h + ky) * im_cols + ox * stride_w + kx];
                            let dst = L::col_index(p, b, ch, ky, kx, tile_y0 + oy, tile_x0 + ox);
                            // SAFETY: each (plane, output position) is owned by one thread
                            unsafe { self.col.store(dst, v) };
                        }
                    }
                    i += block;
                }
            });

            plane += ctx.grid_dim().y as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::simt::Stream;

    fn params_3x3() -> Im2colParams {
        // 1 x 1 x 3 x 3 image, 2 x 2 window, no padding, stride 1
        Im2colParams::new(1, 1, 3, 3, (2, 2), (0, 0), (1, 1))
    }

    #[test]
    fn test_nchw_small() {
        let p = params_3x3();
        assert_eq!((p.output_h, p.output_w), (2, 2));
        let im: Vec<f32> = (1..=9).map(|v| v as f32).collect();
        let mut col = vec![0.0f32; p.col_len()];

        let stream = Stream::new();
        stream
            .launch(
                &launch_im2col::<f32>(&p).unwrap(),
                &Im2col::<_, Nchw>::new(p, DeviceSlice::new(&im), DeviceSliceMut::new(&mut col)),
            )
            .unwrap();

        // Row (ky, kx), column output position
        #[rustfmt::skip]
        let expected = [
            1.0, 2.0, 4.0, 5.0,
            2.0, 3.0, 5.0, 6.0,
            4.0, 5.0, 7.0, 8.0,
            5.0, 6.0, 8.0, 9.0,
        ];
        assert_eq!(col, expected);
    }

    #[test]
    fn test_padding_reads_zero() {
        // 1 x 1 x 1 x 1 image, 3 x 3 window, pad 1
        let p = Im2colParams::new(1, 1, 1, 1, (3, 3), (1, 1), (1, 1));
        assert_eq!((p.output_h, p.output_w), (1, 1));
        let im = [7.0f64];
        let mut col = vec![-1.0f64; 9];

        let stream = Stream::new();
        stream
            .launch(
                &launch_im2col::<f64>(&p).unwrap(),
                &Im2col::<_, Nhwc>::new(p, DeviceSlice::new(&im), DeviceSliceMut::new(&mut col)),
            )
            .unwrap();
        assert_eq!(col, [0.0, 0.0, 0.0, 0.0, 7.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shared_footprint() {
        let p = Im2colParams::new(2, 3, 64, 64, (3, 3), (1, 1), (2, 2));
        assert_eq!(im2col_lds_len(&p), (32 * 2 + 3) * (8 * 2 + 3));
        let cfg = launch_im2col::<f32>(&p).unwrap();
        assert_eq!(cfg.shared_mem_bytes as usize, im2col_lds_len(&p) * 4);
        assert_eq!(cfg.grid_dim.y, 6);
        // 32 x 32 outputs -> 1 x 4 tiles
        assert_eq!(cfg.grid_dim.x, 4);
    }

    #[test]
    fn test_planes_past_grid_limit() {
        // 65537 planes of a 1 x 1 image, 1 x 1 window
        let p = Im2colParams::new(1, 65_537, 1, 1, (1, 1), (0, 0), (1, 1));
        let cfg = launch_im2col::<f32>(&p).unwrap();
        assert_eq!(cfg.grid_dim.y, 65_535);

        let im: Vec<f32> = (0..p.im_len()).map(|v| v as f32).collect();
        let mut col = vec![-1.0f32; p.col_len()];
        let stream = Stream::new();
        stream
            .launch(
                &cfg,
                &Im2col::<_, Nchw>::new(p, DeviceSlice::new(&im), DeviceSliceMut::new(&mut col)),
            )
            .unwrap();
        assert_eq!(col, im);
    }
}
