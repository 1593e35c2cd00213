//! Block-wide reductions and scans over shared memory

use std::ops::Add;

use crate::runtime::simt::BlockCtx;

/// Sum `sdata` into `sdata[0]` with a halving tree
///
/// `sdata` holds one value per thread and its length must be a power of two
/// no larger than the block. Each level is one phase: thread `tid < stride`
/// adds `sdata[tid + stride]` into `sdata[tid]`. The summation order depends
/// only on the length, never on scheduling.
pub fn block_reduce_sum<T>(ctx: &BlockCtx, sdata: &mut [T])
where
    T: Copy + Add<Output = T>,
{
    debug_assert!(sdata.len().is_power_of_two());
    let mut stride = sdata.len() / 2;
    while stride > 0 {
        ctx.threads(|tid| {
            let tid = tid as usize;
            if tid < stride {
                sdata[tid] = sdata[tid] + sdata[tid + stride];
            }
        });
        stride /= 2;
    }
}

/// Inclusive prefix sum of `sdata` (Hillis-Steele)
///
/// `sdata` holds one value per thread. Every level reads the previous level
/// into registers in one phase and stores in the next, so no thread observes
/// a half-updated level.
pub fn block_inclusive_scan<T>(ctx: &BlockCtx, sdata: &mut [T])
where
    T: Copy + Default + Add<Output = T>,
{
    let n = sdata.len();
    let mut regs = vec![T::default(); n];
    let mut offset = 1;
    while offset < n {
        ctx.threads(|tid| {
            let tid = tid as usize;
            if tid < n {
                regs[tid] = if tid >= offset {
                    sdata[tid - offset] + sdata[tid]
                } else {
                    sdata[tid]
                };
            }
        });
        ctx.threads(|tid| {
            let tid = tid as usize;
            if tid < n {
                sdata[tid] = regs[tid];
            }
        });
        offset *= 2;
    }
}
