//! Primitive entry points
//!
//! Every primitive has one generic `*_template` function that logs the call,
//! validates its arguments, short-circuits degenerate problems and launches
//! the kernels. The safe [`Handle`](crate::handle::Handle) methods and the C
//! ABI in [`ffi`](crate::ffi) both reduce to these templates: the former
//! build device views from slices, the latter from raw pointers.
//!
//! ```text
//! Handle::doti / sparsekit_sdoti / sparsekit_ddoti
//!   └── doti_template::<T>
//!         ├── log (trace, bench)
//!         ├── validate
//!         ├── quick return
//!         └── Stream::launch(kernel) ...
//! ```
//!
//! | Module | Primitives |
//! |--------|------------|
//! | `level1` | `doti` |
//! | `conversion` | `ell2csr_nnz`, `ell2csr`, `im2col` |
//! | `level3` | `mcscm` |

mod conversion;
mod level1;
mod level3;

pub mod im2col_common;
pub mod validate;

pub(crate) use conversion::{ell2csr_nnz_template, ell2csr_template, im2col_template};
pub(crate) use level1::doti_template;
pub(crate) use level3::mcscm_template;

pub use im2col_common::{Im2colLayout, Im2colParams};
