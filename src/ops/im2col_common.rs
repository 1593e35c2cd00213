//! Parameters of the im2col lowering.

use std::fmt;

use crate::error::{Error, Result};

/// Storage layout of the image and column buffers
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Im2colLayout {
    /// Batch, channel, row, column
    #[default]
    Nchw = 0,
    /// Batch, row, column, channel
    Nhwc = 1,
}

impl TryFrom<i32> for Im2colLayout {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Im2colLayout::Nchw),
            1 => Ok(Im2colLayout::Nhwc),
            _ => Err(Error::invalid_value(
                "type",
                format!("{code} is not an im2col layout"),
            )),
        }
    }
}

impl fmt::Display for Im2colLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Shape of an im2col problem.
///
/// The image is `batch x channels x height x width`; a `kernel_h x kernel_w`
/// window slides over it with the given stride after `pad_h`/`pad_w` zeros
/// are added on every side, producing `output_h x output_w` positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Im2colParams {
    /// Images in the batch
    pub batch: usize,
    /// Channels per image
    pub channels: usize,
    /// Image rows
    pub height: usize,
    /// Image columns
    pub width: usize,
    /// Window rows
    pub kernel_h: usize,
    /// Window columns
    pub kernel_w: usize,
    /// Output rows
    pub output_h: usize,
    /// Output columns
    pub output_w: usize,
    /// Zero rows added above and below
    pub pad_h: usize,
    /// Zero columns added left and right
    pub pad_w: usize,
    /// Vertical window step
    pub stride_h: usize,
    /// Horizontal window step
    pub stride_w: usize,
}

impl Im2colParams {
    /// Build parameters and derive the output size from the window geometry
    pub fn new(
        batch: usize,
        channels: usize,
        height: usize,
        width: usize,
        (kernel_h, kernel_w): (usize, usize),
        (pad_h, pad_w): (usize, usize),
        (stride_h, stride_w): (usize, usize),
    ) -> Self {
        let mut p = Self {
            batch,
            channels,
            height,
            width,
            kernel_h,
            kernel_w,
            output_h: 0,
            output_w: 0,
            pad_h,
            pad_w,
            stride_h,
            stride_w,
        };
        (p.output_h, p.output_w) = p.output_dims();
        p
    }

    /// Output size `(h + 2 * pad - k) / stride + 1` along both axes
    ///
    /// A window larger than the padded image, or a zero stride, yields zero.
    pub fn output_dims(&self) -> (usize, usize) {
        let dim = |size: usize, pad: usize, k: usize, stride: usize| {
            if stride == 0 {
                return 0;
            }
            (size + 2 * pad)
                .checked_sub(k)
                .map_or(0, |span| span / stride + 1)
        };
        (
            dim(self.height, self.pad_h, self.kernel_h, self.stride_h),
            dim(self.width, self.pad_w, self.kernel_w, self.stride_w),
        )
    }

    /// Replace the output size
    pub fn with_output(mut self, output_h: usize, output_w: usize) -> Self {
        self.output_h = output_h;
        self.output_w = output_w;
        self
    }

    /// Elements of the image buffer
    pub fn im_len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Elements of the column buffer
    pub fn col_len(&self) -> usize {
        self.batch * self.channels * self.kernel_h * self.kernel_w * self.output_h * self.output_w
    }

    /// Returns true if there is nothing to unroll
    pub fn is_degenerate(&self) -> bool {
        [
            self.batch,
            self.channels,
            self.height,
            self.width,
            self.kernel_h,
            self.kernel_w,
            self.output_h,
            self.output_w,
        ]
        .contains(&0)
    }
}
