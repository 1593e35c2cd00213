//! Execution backends
//!
//! ```text
//! runtime
//! ├── simt   block/thread device model every Handle runs on
//! │   ├── Stream (ordered launches, launch counter)
//! │   ├── BlockCtx (barrier phases, shared memory)
//! │   └── kernels (one Kernel type per device function)
//! └── cuda   native kernels through cudarc (feature `cuda`)
//! ```

pub mod simt;

#[cfg(feature = "cuda")]
pub mod cuda;
