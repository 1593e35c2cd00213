//! PTX module loading, caching and launch plumbing
//!
//! - PTX files are compiled by `build.rs` using nvcc
//! - Modules are loaded on first use and cached per device
//! - Launch geometry is computed by the same `launch_*` functions the SIMT
//!   runtime uses and converted here

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use cudarc::driver::safe::LaunchConfig;
use cudarc::driver::safe::{CudaContext, CudaFunction, CudaModule};
use cudarc::nvrtc::Ptx;
use log::debug;
use parking_lot::Mutex;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::simt;

/// Directory containing compiled PTX files (set by build.rs)
const KERNEL_DIR: &str = env!("CUDA_KERNEL_DIR");

fn load_ptx(name: &str) -> Ptx {
    Ptx::from_file(format!("{KERNEL_DIR}/{name}.ptx"))
}

/// Loaded modules keyed by (device_index, module_name)
static MODULE_CACHE: OnceLock<Mutex<HashMap<(usize, &'static str), Arc<CudaModule>>>> =
    OnceLock::new();

/// Get or load a CUDA module from PTX.
///
/// # Errors
///
/// Returns an error if the PTX file cannot be loaded or the module cannot be created.
pub fn get_or_load_module(
    context: &Arc<CudaContext>,
    device_index: usize,
    module_name: &'static str,
) -> Result<Arc<CudaModule>> {
    let cache = MODULE_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock();

    let key = (device_index, module_name);
    if let Some(module) = guard.get(&key) {
        return Ok(module.clone());
    }

    let module = context.load_module(load_ptx(module_name)).map_err(|e| {
        Error::Cuda(format!(
            "failed to load module '{module_name}': {e:?}; check that build.rs compiled the kernels"
        ))
    })?;
    debug!("loaded CUDA module '{module_name}' on device {device_index}");

    guard.insert(key, module.clone());
    Ok(module)
}

/// Get a kernel function from a loaded module.
pub fn get_kernel_function(module: &Arc<CudaModule>, kernel_name: &str) -> Result<CudaFunction> {
    module
        .load_function(kernel_name)
        .map_err(|e| Error::Cuda(format!("failed to get kernel '{kernel_name}': {e:?}")))
}

/// Symbol of the `dtype` instantiation of a typed kernel
#[inline]
pub fn kernel_name(base: &str, dtype: DType) -> String {
    format!("{base}_{}", dtype.short_name())
}

/// Check a launch against the device model and convert it for cudarc
pub fn cuda_launch_config(kernel: &'static str, cfg: &simt::LaunchConfig) -> Result<LaunchConfig> {
    cfg.validate(kernel)?;
    Ok(LaunchConfig {
        grid_dim: (cfg.grid_dim.x, cfg.grid_dim.y, cfg.grid_dim.z),
        block_dim: (cfg.block_dim.x, cfg.block_dim.y, cfg.block_dim.z),
        shared_mem_bytes: cfg.shared_mem_bytes,
    })
}

/// PTX module names, one per `.cu` file
pub mod kernel_names {
    /// Sparse dot product
    pub const DOTI_MODULE: &str = "doti";
    /// ELL to CSR conversion
    pub const ELL2CSR_MODULE: &str = "ell2csr";
    /// Dense x CSC product
    pub const MCSCM_MODULE: &str = "mcscm";
    /// Image to column unrolling
    pub const IM2COL_MODULE: &str = "im2col";
}
