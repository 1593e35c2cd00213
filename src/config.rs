//! Handle configuration
//!
//! A [`Config`] decides how a freshly created [`Handle`](crate::handle::Handle)
//! behaves: which logging layers are active, how large the scratch arena is,
//! how many worker threads execute blocks, and the initial pointer mode.
//!
//! # Environment Variables
//!
//! | Variable | Meaning | Default |
//! |----------|---------|---------|
//! | `SPARSEKIT_LAYER` | Logging layer mask (1 = trace, 2 = bench) | `0` |
//! | `SPARSEKIT_SCRATCH_BYTES` | Scratch arena size in bytes | 4 MiB |
//! | `SPARSEKIT_NUM_THREADS` | Worker threads for block execution | rayon global pool |
//! | `SPARSEKIT_POINTER_MODE` | `host` or `device` | `host` |
//!
//! Unparsable values fall back to the default with a warning.

use std::env;
use std::ops::BitOr;
use std::sync::OnceLock;

use log::warn;

use crate::handle::PointerMode;

/// Default size of the handle scratch arena
pub const DEFAULT_SCRATCH_BYTES: usize = 4 * 1024 * 1024;

const ENV_LAYER: &str = "SPARSEKIT_LAYER";
const ENV_SCRATCH_BYTES: &str = "SPARSEKIT_SCRATCH_BYTES";
const ENV_NUM_THREADS: &str = "SPARSEKIT_NUM_THREADS";
const ENV_POINTER_MODE: &str = "SPARSEKIT_POINTER_MODE";

/// Bit mask of active logging layers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LayerMode(u32);

impl LayerMode {
    /// No logging
    pub const NONE: LayerMode = LayerMode(0);
    /// One line per call with the full argument list
    pub const TRACE: LayerMode = LayerMode(1);
    /// One reproducer command line per call
    pub const BENCH: LayerMode = LayerMode(2);

    /// Build a mask from raw bits, dropping unknown bits
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        LayerMode(bits & (Self::TRACE.0 | Self::BENCH.0))
    }

    /// Raw bits of the mask
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every layer of `other` is active
    #[inline]
    pub const fn contains(self, other: LayerMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LayerMode {
    type Output = LayerMode;

    fn bitor(self, rhs: LayerMode) -> LayerMode {
        LayerMode(self.0 | rhs.0)
    }
}

/// Configuration for a handle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Active logging layers
    pub layer: LayerMode,
    /// Size of the scratch arena in bytes
    pub scratch_bytes: usize,
    /// Worker threads for block execution (`None` = shared global pool)
    pub num_threads: Option<usize>,
    /// Initial pointer mode
    pub pointer_mode: PointerMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layer: LayerMode::NONE,
            scratch_bytes: DEFAULT_SCRATCH_BYTES,
            num_threads: None,
            pointer_mode: PointerMode::Host,
        }
    }
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// `from_env` is `from_lookup` over `std::env::var`; tests use a map.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        if let Some(raw) = lookup(ENV_LAYER) {
            match raw.trim().parse::<u32>() {
                Ok(bits) => cfg.layer = LayerMode::from_bits(bits),
                Err(_) => warn!("{ENV_LAYER}={raw:?} is not a layer mask, logging disabled"),
            }
        }

        if let Some(raw) = lookup(ENV_SCRATCH_BYTES) {
            match raw.trim().parse::<usize>() {
                Ok(bytes) => cfg.scratch_bytes = bytes,
                Err(_) => warn!(
                    "{ENV_SCRATCH_BYTES}={raw:?} is not a byte count, using {DEFAULT_SCRATCH_BYTES}"
                ),
            }
        }

        if let Some(raw) = lookup(ENV_NUM_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.num_threads = Some(n),
                _ => warn!("{ENV_NUM_THREADS}={raw:?} ignored, using the global pool"),
            }
        }

        if let Some(raw) = lookup(ENV_POINTER_MODE) {
            match parse_pointer_mode(&raw) {
                Some(mode) => cfg.pointer_mode = mode,
                None => warn!("{ENV_POINTER_MODE}={raw:?} ignored, using host pointer mode"),
            }
        }

        cfg
    }

    /// Process-wide configuration, read from the environment once
    pub fn global() -> &'static Config {
        static GLOBAL: OnceLock<Config> = OnceLock::new();
        GLOBAL.get_or_init(Config::from_env)
    }

    /// Set the logging layers
    pub fn with_layer(mut self, layer: LayerMode) -> Self {
        self.layer = layer;
        self
    }

    /// Set the scratch arena size
    pub fn with_scratch_bytes(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }

    /// Use a dedicated worker pool with `n` threads
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set the initial pointer mode
    pub fn with_pointer_mode(mut self, mode: PointerMode) -> Self {
        self.pointer_mode = mode;
        self
    }
}

fn parse_pointer_mode(s: &str) -> Option<PointerMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "host" | "0" => Some(PointerMode::Host),
        "device" | "1" => Some(PointerMode::Device),
        _ => None,
    }
}
