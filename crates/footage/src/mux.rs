// External multiplexer adapter.
//
// Separately-downloaded video and audio streams are handed to ffmpeg to be
// merged into a single container. Intermediate-file cleanup on success is the
// engine's job, not this adapter's.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EngineError;

/// Seam for combining a video and an audio file into one output file.
#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), EngineError>;
}

/// Invokes the `ffmpeg` binary to copy-mux the two streams.
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
}

impl FfmpegMuxer {
    pub fn new() -> Self {
        Self {
            program: "ffmpeg".to_owned(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), EngineError> {
        debug!(video = %video.display(), audio = %audio.display(), output = %output.display(), "muxing streams");

        let result = tokio::process::Command::new(&self.program)
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .arg("-map")
            .arg("0:v:0")
            .arg("-map")
            .arg("1:a:0")
            .arg("-c")
            .arg("copy")
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::mux(format!("failed to spawn {}: {e}", self.program)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(EngineError::mux(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
