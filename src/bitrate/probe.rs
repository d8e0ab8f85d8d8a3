//! ffprobe-backed bitrate probe

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::bitrate::BitrateProbe;
use crate::error::ProbeError;

/// Runs `ffprobe` and reads the container bitrate
pub struct FfprobeProbe {
    program: PathBuf,
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    // ffprobe prints numbers as strings in JSON output
    bit_rate: Option<String>,
}

impl FfprobeProbe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl BitrateProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<u32, ProbeError> {
        let output = Command::new(&self.program)
            .args(["-v", "error", "-show_entries", "format=bit_rate", "-of", "json"])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_bitrate(&output.stdout)
    }
}

/// Extract `format.bit_rate` from ffprobe's JSON output
pub(crate) fn parse_bitrate(stdout: &[u8]) -> Result<u32, ProbeError> {
    let parsed: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| ProbeError::Malformed(e.to_string()))?;

    let raw = parsed
        .format
        .and_then(|f| f.bit_rate)
        .ok_or(ProbeError::MissingBitrate)?;

    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ProbeError::MissingBitrate),
        Ok(bitrate) => Ok(bitrate),
        Err(_) => Err(ProbeError::Malformed(format!("bit_rate = {raw:?}"))),
    }
}
