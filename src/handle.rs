//! Execution context
//!
//! A [`Handle`] owns everything a primitive needs besides the caller's
//! buffers: the stream its kernels are queued on, the pointer mode that says
//! where scalar arguments live, the scratch arena and the logging layers.
//!
//! ```
//! use sparsekit::prelude::*;
//!
//! let handle = Handle::with_config(Config::default())?;
//! let x_val = [1.0f64, 2.0];
//! let x_ind = [0, 2];
//! let y = [3.0f64, 0.0, 4.0];
//! let mut result = 0.0;
//! handle.doti(&x_val, &x_ind, &y, &mut result, IndexBase::Zero)?;
//! assert_eq!(result, 11.0);
//! # Ok::<(), sparsekit::error::Error>(())
//! ```

use std::fmt;

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::config::{Config, LayerMode};
use crate::error::{Error, Result};
use crate::runtime::simt::{Scratch, Stream};

/// Where scalar arguments and results live
///
/// In host mode scalars are read (and results written) by the host: a
/// result is copied back before the call returns. In device mode they stay in
/// device memory and are only touched by kernels.
#[repr(i32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PointerMode {
    /// Scalars are host values
    #[default]
    Host = 0,
    /// Scalars are device values
    Device = 1,
}

impl TryFrom<i32> for PointerMode {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(PointerMode::Host),
            1 => Ok(PointerMode::Device),
            _ => Err(Error::invalid_value(
                "pointer_mode",
                format!("{code} is not a pointer mode"),
            )),
        }
    }
}

impl fmt::Display for PointerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerMode::Host => write!(f, "host"),
            PointerMode::Device => write!(f, "device"),
        }
    }
}

/// Execution context of the primitives
///
/// Calls through one handle are serialised: each call holds the scratch
/// arena for its whole sequence of launches and copies.
pub struct Handle {
    stream: Stream,
    pointer_mode: PointerMode,
    layer: LayerMode,
    scratch: Mutex<Scratch>,
}

impl Handle {
    /// Create a handle from the process-wide configuration
    pub fn new() -> Result<Self> {
        Self::with_config(Config::global().clone())
    }

    /// Create a handle from an explicit configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let stream = match config.num_threads {
            Some(n) => Stream::with_threads(n)?,
            None => Stream::new(),
        };
        debug!(
            "handle created: stream={} pointer_mode={} scratch={}B layer={}",
            stream.id(),
            config.pointer_mode,
            config.scratch_bytes,
            config.layer.bits()
        );
        Ok(Self {
            stream,
            pointer_mode: config.pointer_mode,
            layer: config.layer,
            scratch: Mutex::new(Scratch::new(config.scratch_bytes)),
        })
    }

    /// Current pointer mode
    #[inline]
    pub fn pointer_mode(&self) -> PointerMode {
        self.pointer_mode
    }

    /// Change where scalar arguments live for subsequent calls
    pub fn set_pointer_mode(&mut self, mode: PointerMode) {
        self.pointer_mode = mode;
    }

    /// Active logging layers
    #[inline]
    pub fn layer(&self) -> LayerMode {
        self.layer
    }

    /// Change the logging layers for subsequent calls
    pub fn set_layer(&mut self, layer: LayerMode) {
        self.layer = layer;
    }

    /// The stream all kernels of this handle are launched on
    #[inline]
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Capacity of the scratch arena in bytes
    pub fn scratch_bytes(&self) -> usize {
        self.scratch.lock().size_bytes()
    }

    /// Take exclusive use of the scratch arena for one call
    pub(crate) fn lock_scratch(&self) -> MutexGuard<'_, Scratch> {
        self.scratch.lock()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("stream", &self.stream)
            .field("pointer_mode", &self.pointer_mode)
            .field("layer", &self.layer)
            .finish_non_exhaustive()
    }
}
