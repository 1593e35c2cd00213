//! CUDA backend
//!
//! [`CudaHandle`] runs the primitives as native CUDA kernels through cudarc.
//! Buffers are raw device addresses (`u64`); scalars and results follow the
//! handle's [`PointerMode`](crate::handle::PointerMode) exactly as in
//! [`Handle`](crate::handle::Handle): in host mode they are host addresses,
//! in device mode device addresses.
//!
//! Launch geometry comes from the `launch_*` functions of
//! [`simt::kernels`](crate::runtime::simt::kernels), so both runtimes run the
//! same grids.

mod handle;
mod kernels;

pub use handle::CudaHandle;

use cudarc::driver::DeviceRepr;

use crate::dtype::Element;

/// Element types the CUDA kernels are instantiated for
pub trait CudaElement: Element + DeviceRepr {}

impl CudaElement for f32 {}
impl CudaElement for f64 {}
