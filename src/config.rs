//! # Muxer Configuration
//!
//! Process-wide tunables for the muxer core: PSI refresh intervals and
//! the default PID assignment scheme for synthetic programs. The
//! engine itself persists no state between runs (§6); this module only
//! resolves defaults, optionally overridden by environment variables,
//! the way the teacher's `Config` resolves its RTSP URL from env/file.

use std::env;
use std::sync::OnceLock;

/// Default PSI table refresh interval in milliseconds.
pub const DEFAULT_REFRESH_RATE_MS: u32 = 500;
/// Refresh interval used for PAT and PMT streams specifically.
pub const PAT_PMT_REFRESH_RATE_MS: u32 = 200;
/// Default PMT PID assigned to the first synthetic program.
pub const DEFAULT_PMT_PID: u16 = 100;
/// Default base PID for the first elementary stream of a program.
pub const DEFAULT_ES_PID_BASE: u16 = 110;

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Resolved, process-wide muxer defaults.
#[derive(Debug, Clone, Copy)]
pub struct MuxerDefaults {
    /// Refresh interval for ordinary PSI tables (ms).
    pub refresh_rate_ms: u32,
    /// Refresh interval for PAT/PMT specifically (ms).
    pub pat_pmt_refresh_rate_ms: u32,
    /// Default PMT PID for the first synthetic program.
    pub default_pmt_pid: u16,
    /// Default base PID for elementary streams.
    pub default_es_pid_base: u16,
}

impl MuxerDefaults {
    fn from_env() -> Self {
        Self {
            refresh_rate_ms: env_u32("M2TS_REFRESH_RATE_MS", DEFAULT_REFRESH_RATE_MS),
            pat_pmt_refresh_rate_ms: env_u32(
                "M2TS_PAT_PMT_REFRESH_RATE_MS",
                PAT_PMT_REFRESH_RATE_MS,
            ),
            default_pmt_pid: env_u16("M2TS_DEFAULT_PMT_PID", DEFAULT_PMT_PID),
            default_es_pid_base: env_u16("M2TS_DEFAULT_ES_PID_BASE", DEFAULT_ES_PID_BASE),
        }
    }
}

static DEFAULTS: OnceLock<MuxerDefaults> = OnceLock::new();

/// Returns the resolved muxer defaults, reading environment overrides
/// on first access and caching the result for the life of the process.
pub fn defaults() -> MuxerDefaults {
    *DEFAULTS.get_or_init(MuxerDefaults::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_positive() {
        let d = defaults();
        assert!(d.refresh_rate_ms > 0);
        assert!(d.pat_pmt_refresh_rate_ms > 0);
    }
}
