//! Ordered command queue of the emulated device

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
#[cfg(feature = "rayon")]
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use super::{BlockCtx, DeviceSlice, Kernel, LaunchConfig};
use crate::error::{Error, Result};

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(0);

/// Ordered queue of kernel launches and copies
///
/// Work is executed synchronously on submission, so a launch has completed
/// (and its writes are visible to the host) when `launch` returns. Blocks of a
/// grid run on the stream's rayon pool, or on the global pool when the stream
/// has none.
pub struct Stream {
    id: u64,
    launches: AtomicU64,
    #[cfg(feature = "rayon")]
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Stream {
    /// Create a stream that runs blocks on the global worker pool
    pub fn new() -> Self {
        Self {
            id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
            launches: AtomicU64::new(0),
            #[cfg(feature = "rayon")]
            pool: None,
        }
    }

    /// Create a stream with a dedicated pool of `num_threads` workers
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        #[cfg(feature = "rayon")]
        {
            let mut stream = Self::new();
            let id = stream.id;
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(move |i| format!("sparsekit-s{id}-w{i}"))
                .build()
                .map_err(|e| Error::Internal(format!("failed to build worker pool: {e}")))?;
            stream.pool = Some(Arc::new(pool));
            Ok(stream)
        }
        #[cfg(not(feature = "rayon"))]
        {
            let _ = num_threads;
            Ok(Self::new())
        }
    }

    /// Stream identifier, unique within the process
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of kernels launched on this stream so far
    #[inline]
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Acquire)
    }

    /// Launch `kernel` over the grid described by `cfg`
    pub fn launch<K: Kernel>(&self, cfg: &LaunchConfig, kernel: &K) -> Result<()> {
        cfg.validate(K::NAME)?;
        debug!(
            "stream {}: launching {} with {}",
            self.id,
            K::NAME,
            cfg
        );
        self.launches.fetch_add(1, Ordering::AcqRel);

        panic::catch_unwind(AssertUnwindSafe(|| self.run_grid(cfg, kernel))).map_err(|payload| {
            Error::DeviceFault {
                kernel: K::NAME,
                reason: panic_message(payload.as_ref()),
            }
        })
    }

    /// Copy `dst.len()` elements from device memory to the host
    pub fn memcpy_dtoh<T: Copy>(&self, src: DeviceSlice<'_, T>, dst: &mut [T]) -> Result<()> {
        if src.len() < dst.len() {
            return Err(Error::Internal(format!(
                "memcpy of {} elements from a {}-element buffer",
                dst.len(),
                src.len()
            )));
        }
        trace!("stream {}: memcpy_dtoh {} elements", self.id, dst.len());
        for (i, d) in dst.iter_mut().enumerate() {
            *d = src.load(i);
        }
        Ok(())
    }

    /// Wait for all submitted work
    ///
    /// Launches complete on submission, so this only reports the stream state.
    pub fn synchronize(&self) -> Result<()> {
        trace!("stream {}: synchronize", self.id);
        Ok(())
    }

    fn run_grid<K: Kernel>(&self, cfg: &LaunchConfig, kernel: &K) {
        let grid = cfg.grid_dim;
        let total = cfg.num_blocks() as usize;
        let run_block = |linear: usize| {
            let ctx = BlockCtx::new(cfg, grid.unflatten(linear as u64));
            kernel.run_block(&ctx);
        };

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;

            if total == 1 {
                run_block(0);
                return;
            }
            let run = || (0..total).into_par_iter().for_each(run_block);
            match &self.pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        }

        #[cfg(not(feature = "rayon"))]
        (0..total).for_each(run_block);
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("launches", &self.launch_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "kernel panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::simt::{DeviceSliceMut, launch_config};

    struct Iota<'a> {
        out: DeviceSliceMut<'a, u32>,
    }

    impl Kernel for Iota<'_> {
        const NAME: &'static str = "iota";

        fn run_block(&self, ctx: &BlockCtx) {
            let base = ctx.block_idx().x * ctx.block_dim().x;
            ctx.threads(|tid| {
                let gid = (base + tid) as usize;
                if gid < self.out.len() {
                    unsafe { self.out.store(gid, gid as u32) };
                }
            });
        }
    }

    #[test]
    fn test_launch_covers_grid() {
        let stream = Stream::new();
        let mut out = vec![0u32; 1000];
        let kernel = Iota {
            out: DeviceSliceMut::new(&mut out),
        };
        stream.launch(&launch_config(4, 256, 0), &kernel).unwrap();
        assert_eq!(stream.launch_count(), 1);
        assert!(out.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    fn test_dedicated_pool() {
        let stream = Stream::with_threads(2).unwrap();
        let mut out = vec![0u32; 64];
        let kernel = Iota {
            out: DeviceSliceMut::new(&mut out),
        };
        stream.launch(&launch_config(8, 8, 0), &kernel).unwrap();
        assert_eq!(out[63], 63);
    }

    struct Unmasked<'a>(DeviceSliceMut<'a, u32>);

    impl Kernel for Unmasked<'_> {
        const NAME: &'static str = "unmasked";

        fn run_block(&self, ctx: &BlockCtx) {
            ctx.threads(|tid| unsafe { self.0.store(tid as usize, tid) });
        }
    }

    #[test]
    fn test_fault_is_reported() {
        let stream = Stream::new();
        let mut out = vec![0u32; 2];
        let kernel = Unmasked(DeviceSliceMut::new(&mut out));
        let err = stream.launch(&launch_config(1, 4, 0), &kernel).unwrap_err();
        match err {
            Error::DeviceFault { kernel, reason } => {
                assert_eq!(kernel, "unmasked");
                assert!(reason.contains("out of bounds"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_rejected_launch_is_not_counted() {
        let stream = Stream::new();
        let mut out = vec![0u32; 4];
        let kernel = Iota {
            out: DeviceSliceMut::new(&mut out),
        };
        let err = stream
            .launch(&launch_config(1, 2048, 0), &kernel)
            .unwrap_err();
        assert!(matches!(err, Error::Launch { kernel: "iota", .. }));
        assert_eq!(stream.launch_count(), 0);
    }

    #[test]
    fn test_memcpy_dtoh() {
        let stream = Stream::new();
        let src = [1.0f64, 2.0, 3.0];
        let mut dst = [0.0f64; 2];
        stream.memcpy_dtoh(DeviceSlice::new(&src), &mut dst).unwrap();
        assert_eq!(dst, [1.0, 2.0]);
        assert!(stream.memcpy_dtoh(DeviceSlice::new(&src[..1]), &mut dst).is_err());
    }
}
