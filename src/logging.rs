//! Per-call logging layers
//!
//! Entry points report each call through the `log` facade. Two layers exist,
//! switched on per handle by its [`LayerMode`]:
//!
//! - trace (`target: "sparsekit::trace"`): `name,arg,arg,...` with the full
//!   argument list, buffers rendered as addresses
//! - bench (`target: "sparsekit::bench"`): a reproducer command line for the
//!   benchmark client
//!
//! Logging never affects control flow.

use std::fmt::{self, Write};

use log::info;

use crate::config::LayerMode;
use crate::dtype::Element;
use crate::handle::PointerMode;
use crate::runtime::simt::DeviceSlice;

/// Log target of the trace layer
pub const TRACE_TARGET: &str = "sparsekit::trace";
/// Log target of the bench layer
pub const BENCH_TARGET: &str = "sparsekit::bench";

const BENCH_BINARY: &str = "./sparsekit-bench";

/// Address of a caller buffer, printed as hex
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Addr(usize);

impl Addr {
    /// Address of the first element of a buffer
    #[inline]
    pub fn of<T>(ptr: *const T) -> Self {
        Addr(ptr as usize)
    }

    /// Address of a slice
    #[inline]
    pub fn of_slice<T>(slice: &[T]) -> Self {
        Addr(slice.as_ptr() as usize)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A scalar argument as printed in a trace line
///
/// Host pointer mode prints the value, device pointer mode the address.
#[derive(Clone, Copy, Debug)]
pub enum ScalarArg<T> {
    /// Host scalar
    Value(T),
    /// Device scalar
    Device(Addr),
}

impl<T: Copy> ScalarArg<T> {
    /// Read or locate `scalar` according to the pointer mode
    pub fn of(mode: PointerMode, scalar: DeviceSlice<'_, T>) -> Self {
        match mode {
            PointerMode::Host => ScalarArg::Value(scalar.load(0)),
            PointerMode::Device => ScalarArg::Device(Addr::of(scalar.as_ptr())),
        }
    }
}

impl<T: fmt::Display> fmt::Display for ScalarArg<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarArg::Value(v) => write!(f, "{v}"),
            ScalarArg::Device(addr) => write!(f, "{addr}"),
        }
    }
}

/// Replace the `X` placeholder of an entry point name with the precision letter
///
/// `replace_x::<f32>("sparsekit_Xdoti")` is `"sparsekit_sdoti"`.
pub fn replace_x<T: Element>(name: &str) -> String {
    let mut prefix = [0u8; 4];
    name.replacen('X', T::DTYPE.prefix().encode_utf8(&mut prefix), 1)
}

/// Join a name and its arguments into a trace line
pub fn trace_line(name: &str, args: &[&dyn fmt::Display]) -> String {
    let mut line = String::from(name);
    for arg in args {
        // Writing into a String cannot fail
        let _ = write!(line, ",{arg}");
    }
    line
}

/// Emit a trace line if the trace layer is active
pub fn log_trace(layer: LayerMode, name: &str, args: &[&dyn fmt::Display]) {
    if layer.contains(LayerMode::TRACE) {
        info!(target: TRACE_TARGET, "{}", trace_line(name, args));
    }
}

/// Emit a bench reproducer if the bench layer is active
pub fn log_bench(layer: LayerMode, function: &str, precision: char, extra: &str) {
    if layer.contains(LayerMode::BENCH) {
        info!(
            target: BENCH_TARGET,
            "{BENCH_BINARY} -f {function} -r {precision} {extra}"
        );
    }
}
