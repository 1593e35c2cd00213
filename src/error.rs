//! Error types for sparsekit
//!
//! Every entry point reports failures through [`Error`]. The C ABI flattens an
//! error into a [`Status`] code with [`Error::status`]; the variants are listed
//! in the order in which they are checked.

use thiserror::Error;

/// Result type alias using sparsekit's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sparsekit operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The execution context is missing or unusable
    #[error("Invalid handle")]
    InvalidHandle,

    /// A required buffer or descriptor is null
    #[error("Invalid pointer: '{arg}' is null")]
    InvalidPointer {
        /// The argument name
        arg: &'static str,
    },

    /// An enumerated argument is outside its supported encoding
    #[error("Invalid value for '{arg}': {reason}")]
    InvalidValue {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// A dimension, count, stride or leading dimension is unusable
    #[error("Invalid size for '{arg}': {reason}")]
    InvalidSize {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// The argument combination is valid but not supported
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// Description of the unimplemented feature
        feature: &'static str,
    },

    /// Device memory (including the handle scratch arena) is too small
    #[error("Out of memory: failed to provide {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// A kernel could not be launched with the requested configuration
    #[error("Launch of '{kernel}' failed: {reason}")]
    Launch {
        /// Kernel symbol
        kernel: &'static str,
        /// Why the launch was rejected
        reason: String,
    },

    /// A kernel faulted while executing
    #[error("Device fault in '{kernel}': {reason}")]
    DeviceFault {
        /// Kernel symbol
        kernel: &'static str,
        /// Fault description
        reason: String,
    },

    /// CUDA driver error
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid pointer error
    pub fn invalid_pointer(arg: &'static str) -> Self {
        Self::InvalidPointer { arg }
    }

    /// Create an invalid value error
    pub fn invalid_value(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            arg,
            reason: reason.into(),
        }
    }

    /// Create an invalid size error
    pub fn invalid_size(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            arg,
            reason: reason.into(),
        }
    }

    /// Create a not implemented error
    pub fn not_implemented(feature: &'static str) -> Self {
        Self::NotImplemented { feature }
    }

    /// Create a launch error
    pub fn launch(kernel: &'static str, reason: impl Into<String>) -> Self {
        Self::Launch {
            kernel,
            reason: reason.into(),
        }
    }

    /// Status code reported across the C boundary for this error
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidHandle => Status::InvalidHandle,
            Self::InvalidPointer { .. } => Status::InvalidPointer,
            Self::InvalidValue { .. } => Status::InvalidValue,
            Self::InvalidSize { .. } => Status::InvalidSize,
            Self::NotImplemented { .. } => Status::NotImplemented,
            Self::OutOfMemory { .. } => Status::MemoryError,
            Self::Launch { .. } | Self::DeviceFault { .. } => Status::DeviceFailure,
            #[cfg(feature = "cuda")]
            Self::Cuda(_) => Status::DeviceFailure,
            Self::Internal(_) => Status::InternalError,
        }
    }
}

/// Status code returned by every C entry point
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Success
    Success = 0,
    /// Handle not initialized, invalid or null
    InvalidHandle = 1,
    /// Function is not implemented
    NotImplemented = 2,
    /// Invalid pointer parameter
    InvalidPointer = 3,
    /// Invalid size parameter
    InvalidSize = 4,
    /// Failed memory allocation, copy or scratch exhaustion
    MemoryError = 5,
    /// Other internal library failure
    InternalError = 6,
    /// Invalid value parameter
    InvalidValue = 7,
    /// Kernel launch failed or a kernel faulted
    DeviceFailure = 8,
}

impl Status {
    /// Returns true for [`Status::Success`]
    #[inline]
    pub fn is_success(self) -> bool {
        self == Status::Success
    }
}

impl<T> From<Result<T>> for Status {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }
}
