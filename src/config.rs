//! Runtime-configurable tuning parameters.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `COALESCE_`) or by constructing a custom `CoalesceConfig`.

use std::time::Duration;

/// 4 GiB, clamped to the address space on 32-bit targets.
const DEFAULT_MAX_FRAME_BYTES: u64 = 4 << 30;

/// Tuning parameters for the coalescer and the reference ring transport.
#[derive(Debug, Clone)]
pub struct CoalesceConfig {
    /// Timeout for individual send/recv steps inside the ring transport.
    pub collective_timeout: Duration,

    /// Use the chunk-list reduce-scatter even when the transport offers the
    /// direct flat-buffer primitive.
    pub force_chunked: bool,

    /// Largest frame a TCP link accepts before closing the connection.
    pub max_frame_bytes: usize,
}

impl Default for CoalesceConfig {
    fn default() -> Self {
        Self {
            collective_timeout: Duration::from_secs(30),
            force_chunked: false,
            max_frame_bytes: usize::try_from(DEFAULT_MAX_FRAME_BYTES).unwrap_or(usize::MAX),
        }
    }
}

impl CoalesceConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `COALESCE_COLLECTIVE_TIMEOUT_SECS`
    /// - `COALESCE_FORCE_CHUNKED` (`1`/`true`/`yes`)
    /// - `COALESCE_MAX_FRAME_BYTES`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("COALESCE_COLLECTIVE_TIMEOUT_SECS")
            && let Ok(s) = v.parse::<u64>()
        {
            cfg.collective_timeout = Duration::from_secs(s);
        }
        if let Ok(v) = std::env::var("COALESCE_FORCE_CHUNKED") {
            cfg.force_chunked = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("COALESCE_MAX_FRAME_BYTES")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.max_frame_bytes = n;
        }

        cfg
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
