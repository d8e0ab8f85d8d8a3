//! Bitrate resolution
//!
//! The pacing rate of a track is either fixed by configuration or probed
//! from the file. Probe failures never propagate: the resolver logs them
//! and paces at [`FALLBACK_BITRATE`].

pub mod probe;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::Track;
use crate::constants::FALLBACK_BITRATE;
use crate::error::ProbeError;

pub use probe::FfprobeProbe;

/// External media inspection
#[async_trait]
pub trait BitrateProbe: Send + Sync {
    /// Bitrate of the file in bits per second
    async fn probe(&self, path: &Path) -> Result<u32, ProbeError>;
}

/// Picks the pacing bitrate for each track
#[derive(Clone)]
pub struct BitrateResolver {
    fixed: Option<u32>,
    probe: Arc<dyn BitrateProbe>,
}

impl BitrateResolver {
    pub fn new(fixed: Option<u32>, probe: Arc<dyn BitrateProbe>) -> Self {
        Self { fixed, probe }
    }

    /// Resolver that never probes
    pub fn fixed(bitrate: u32) -> Self {
        Self::new(Some(bitrate), Arc::new(FfprobeProbe::default()))
    }

    pub async fn resolve(&self, track: &Track) -> u32 {
        if let Some(bitrate) = self.fixed {
            return bitrate;
        }

        match self.probe.probe(&track.path).await {
            Ok(bitrate) => {
                tracing::debug!("Probed {}: {} bps", track.name, bitrate);
                bitrate
            }
            Err(e) => {
                tracing::warn!(
                    "Bitrate probe failed for {}: {}; using {} bps",
                    track.name,
                    e,
                    FALLBACK_BITRATE
                );
                FALLBACK_BITRATE
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Probe returning a scripted answer and counting calls
    pub(crate) struct ScriptedProbe {
        answer: Option<u32>,
        pub calls: AtomicUsize,
    }

    impl ScriptedProbe {
        pub(crate) fn ok(bitrate: u32) -> Self {
            Self {
                answer: Some(bitrate),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                answer: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BitrateProbe for ScriptedProbe {
        async fn probe(&self, _path: &Path) -> Result<u32, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.ok_or(ProbeError::MissingBitrate)
        }
    }

    fn track() -> Track {
        Track::new("a.mp3", "/music/a.mp3")
    }

    #[tokio::test]
    async fn test_fixed_bitrate_skips_probe() {
        let probe = Arc::new(ScriptedProbe::ok(320_000));
        let resolver = BitrateResolver::new(Some(96_000), probe.clone());

        assert_eq!(resolver.resolve(&track()).await, 96_000);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fixed_bitrate_wins_over_failing_probe() {
        let resolver = BitrateResolver::new(Some(64_000), Arc::new(ScriptedProbe::failing()));
        assert_eq!(resolver.resolve(&track()).await, 64_000);
    }

    #[tokio::test]
    async fn test_probed_bitrate() {
        let probe = Arc::new(ScriptedProbe::ok(320_000));
        let resolver = BitrateResolver::new(None, probe.clone());

        assert_eq!(resolver.resolve(&track()).await, 320_000);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back() {
        let resolver = BitrateResolver::new(None, Arc::new(ScriptedProbe::failing()));
        assert_eq!(resolver.resolve(&track()).await, 128_000);
    }

    #[tokio::test]
    async fn test_missing_probe_program_falls_back() {
        let resolver = BitrateResolver::new(
            None,
            Arc::new(FfprobeProbe::new("/nonexistent/ffprobe-for-tests")),
        );
        assert_eq!(resolver.resolve(&track()).await, FALLBACK_BITRATE);
    }
}
