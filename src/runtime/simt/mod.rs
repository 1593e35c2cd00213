//! Emulated SIMT device
//!
//! Every primitive is written as a device kernel against the execution model
//! of a GPU, and this module executes those kernels on the host:
//!
//! ```text
//! Stream::launch(cfg, &kernel)
//! └── grid: cfg.grid_dim blocks, run in parallel, no ordering between blocks
//!     └── Kernel::run_block(&BlockCtx)
//!         ├── ctx.shared::<T>(len)        block-private shared memory
//!         ├── ctx.threads(|tid| ...)      phase 0: every thread of the block
//!         │   (barrier)
//!         └── ctx.threads(|tid| ...)      phase 1 sees every phase-0 write
//! ```
//!
//! # Guarantees
//!
//! - Blocks of one launch never synchronise with each other; a kernel must
//!   give every block a disjoint output region.
//! - Inside a block, each call to [`BlockCtx::threads`] is one phase between
//!   two barriers. Threads of the same phase must not race on shared memory
//!   (the emulator runs them in thread order, a GPU runs them concurrently).
//! - Launches on one [`Stream`] complete in submission order.
//! - A panic inside a kernel is a device fault: the launch returns
//!   [`Error::DeviceFault`](crate::error::Error::DeviceFault).

mod memory;
mod stream;

pub mod kernels;

pub use memory::{DeviceSlice, DeviceSliceMut, Scratch};
pub use stream::Stream;

use bytemuck::Pod;
use std::cell::Cell;
use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// Device Limits
// ============================================================================

/// Maximum number of threads in one block
pub const MAX_THREADS_PER_BLOCK: u32 = 1024;

/// Maximum grid extent along x
pub const MAX_GRID_DIM_X: u32 = i32::MAX as u32;

/// Maximum grid extent along y and z
pub const MAX_GRID_DIM_YZ: u32 = 65_535;

/// Shared memory available to one block (static + dynamic)
pub const MAX_SHARED_MEMORY_BYTES: u32 = 64 * 1024;

// ============================================================================
// Launch Configuration
// ============================================================================

/// Three-dimensional extent of a grid or block
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dim3 {
    /// Extent along x
    pub x: u32,
    /// Extent along y
    pub y: u32,
    /// Extent along z
    pub z: u32,
}

impl Dim3 {
    /// Create a new extent
    #[inline]
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of points covered by the extent
    #[inline]
    pub const fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// Inverse of row-major linearisation with x fastest
    #[inline]
    pub(crate) fn unflatten(&self, linear: u64) -> Dim3 {
        let x = (linear % self.x as u64) as u32;
        let rest = linear / self.x as u64;
        let y = (rest % self.y as u64) as u32;
        let z = (rest / self.y as u64) as u32;
        Dim3 { x, y, z }
    }
}

impl From<u32> for Dim3 {
    fn from(x: u32) -> Self {
        Dim3::new(x, 1, 1)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Dim3::new(x, y, z)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Grid, block and dynamic shared memory of one launch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of blocks along each axis
    pub grid_dim: Dim3,
    /// Number of threads along each axis of a block
    pub block_dim: Dim3,
    /// Dynamic shared memory per block, in bytes
    pub shared_mem_bytes: u32,
}

impl LaunchConfig {
    /// Threads per block
    #[inline]
    pub fn threads_per_block(&self) -> u64 {
        self.block_dim.volume()
    }

    /// Number of blocks in the grid
    #[inline]
    pub fn num_blocks(&self) -> u64 {
        self.grid_dim.volume()
    }

    /// Check the configuration against the device limits
    pub fn validate(&self, kernel: &'static str) -> Result<()> {
        let threads = self.threads_per_block();
        if threads == 0 || threads > MAX_THREADS_PER_BLOCK as u64 {
            return Err(Error::launch(
                kernel,
                format!("block {} has {threads} threads (limit {MAX_THREADS_PER_BLOCK})", self.block_dim),
            ));
        }
        let g = self.grid_dim;
        if g.x == 0 || g.y == 0 || g.z == 0 {
            return Err(Error::launch(kernel, format!("empty grid {g}")));
        }
        if g.x > MAX_GRID_DIM_X || g.y > MAX_GRID_DIM_YZ || g.z > MAX_GRID_DIM_YZ {
            return Err(Error::launch(kernel, format!("grid {g} exceeds device limits")));
        }
        if self.shared_mem_bytes > MAX_SHARED_MEMORY_BYTES {
            return Err(Error::launch(
                kernel,
                format!(
                    "{} bytes of shared memory requested (limit {MAX_SHARED_MEMORY_BYTES})",
                    self.shared_mem_bytes
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for LaunchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "grid={} block={} shared={}B",
            self.grid_dim, self.block_dim, self.shared_mem_bytes
        )
    }
}

/// Build a launch configuration
#[inline]
pub fn launch_config(
    grid: impl Into<Dim3>,
    block: impl Into<Dim3>,
    shared_mem: u32,
) -> LaunchConfig {
    LaunchConfig {
        grid_dim: grid.into(),
        block_dim: block.into(),
        shared_mem_bytes: shared_mem,
    }
}

// ============================================================================
// Kernels
// ============================================================================

/// A device kernel
///
/// `run_block` is the body executed by one block. The kernel value itself is
/// the argument list of the launch and is shared by all blocks.
pub trait Kernel: Sync {
    /// Kernel symbol, used in launch logs and fault reports
    const NAME: &'static str;

    /// Execute one block of the grid
    fn run_block(&self, ctx: &BlockCtx);
}

/// Execution context of one block
pub struct BlockCtx {
    block_idx: Dim3,
    block_dim: Dim3,
    grid_dim: Dim3,
    dynamic_shared_bytes: usize,
    shared_used: Cell<usize>,
}

impl BlockCtx {
    pub(crate) fn new(cfg: &LaunchConfig, block_idx: Dim3) -> Self {
        Self {
            block_idx,
            block_dim: cfg.block_dim,
            grid_dim: cfg.grid_dim,
            dynamic_shared_bytes: cfg.shared_mem_bytes as usize,
            shared_used: Cell::new(cfg.shared_mem_bytes as usize),
        }
    }

    /// Index of this block in the grid
    #[inline]
    pub fn block_idx(&self) -> Dim3 {
        self.block_idx
    }

    /// Extent of a block
    #[inline]
    pub fn block_dim(&self) -> Dim3 {
        self.block_dim
    }

    /// Extent of the grid
    #[inline]
    pub fn grid_dim(&self) -> Dim3 {
        self.grid_dim
    }

    /// Threads in this block
    #[inline]
    pub fn num_threads(&self) -> u32 {
        self.block_dim.volume() as u32
    }

    /// Run one phase: `f(tid)` for every thread of the block.
    ///
    /// Returning from `threads` is a block-wide barrier.
    #[inline]
    pub fn threads<F: FnMut(u32)>(&self, mut f: F) {
        for tid in 0..self.num_threads() {
            f(tid);
        }
    }

    /// Allocate `len` zeroed elements of static shared memory.
    ///
    /// # Panics
    ///
    /// Panics (a device fault) when the block exceeds
    /// [`MAX_SHARED_MEMORY_BYTES`].
    pub fn shared<T: Pod>(&self, len: usize) -> Vec<T> {
        self.charge_shared(len * std::mem::size_of::<T>());
        vec![T::zeroed(); len]
    }

    /// The dynamic shared memory region of the launch, viewed as `T`
    pub fn dynamic_shared<T: Pod>(&self) -> Vec<T> {
        vec![T::zeroed(); self.dynamic_shared_bytes / std::mem::size_of::<T>()]
    }

    fn charge_shared(&self, bytes: usize) {
        let used = self.shared_used.get() + bytes;
        assert!(
            used <= MAX_SHARED_MEMORY_BYTES as usize,
            "shared memory overflow: {used} bytes (limit {MAX_SHARED_MEMORY_BYTES})"
        );
        self.shared_used.set(used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dim3_unflatten() {
        let grid = Dim3::new(4, 3, 2);
        assert_eq!(grid.volume(), 24);
        assert_eq!(grid.unflatten(0), Dim3::new(0, 0, 0));
        assert_eq!(grid.unflatten(5), Dim3::new(1, 1, 0));
        assert_eq!(grid.unflatten(23), Dim3::new(3, 2, 1));
    }

    #[test]
    fn test_validate_limits() {
        assert!(launch_config(1, 1024, 0).validate("k").is_ok());
        assert!(launch_config(1, 1025, 0).validate("k").is_err());
        assert!(launch_config(0, 32, 0).validate("k").is_err());
        assert!(launch_config((1, 65_536, 1), 32, 0).validate("k").is_err());
        assert!(
            launch_config(1, 32, MAX_SHARED_MEMORY_BYTES + 1)
                .validate("k")
                .is_err()
        );
    }

    #[test]
    fn test_shared_budget() {
        let cfg = launch_config(1, 32, 1024);
        let ctx = BlockCtx::new(&cfg, Dim3::new(0, 0, 0));
        let dynamic: Vec<f32> = ctx.dynamic_shared();
        assert_eq!(dynamic.len(), 256);
        let s: Vec<f64> = ctx.shared(16);
        assert_eq!(s.len(), 16);
        assert!(s.iter().all(|&v| v == 0.0));
    }

    #[test]
    #[should_panic(expected = "shared memory overflow")]
    fn test_shared_overflow_panics() {
        let cfg = launch_config(1, 32, 0);
        let ctx = BlockCtx::new(&cfg, Dim3::new(0, 0, 0));
        let _s: Vec<f64> = ctx.shared(MAX_SHARED_MEMORY_BYTES as usize);
    }

    #[test]
    fn test_threads_phase_visits_every_thread() {
        let cfg = launch_config(1, 64, 0);
        let ctx = BlockCtx::new(&cfg, Dim3::new(0, 0, 0));
        let mut seen = vec![false; 64];
        ctx.threads(|tid| seen[tid as usize] = true);
        assert!(seen.iter().all(|&s| s));
    }
}
