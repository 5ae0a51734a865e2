//! Invocation of the external transcoder (ffmpeg).

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ToolsConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Transcoder {
    program: PathBuf,
}

impl Transcoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self::new(&tools.ffmpeg)
    }

    /// Run with `args` and return stdout. A non-zero exit becomes a
    /// processing error for `input` carrying the last line of stderr.
    pub fn run(&self, input: &Path, args: &[String]) -> Result<Vec<u8>> {
        tracing::debug!(program = %self.program.display(), args = %args.join(" "), "Running transcoder");

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| Error::Processing {
                path: input.to_path_buf(),
                message: format!("failed to start {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no output")
                .to_string();
            tracing::warn!(path = %input.display(), status = %output.status, error = %message, "Transcoder failed");
            return Err(Error::Processing {
                path: input.to_path_buf(),
                message: format!("{}: {message}", output.status),
            });
        }

        Ok(output.stdout)
    }

    /// Decode to mono 32-bit float samples at `sample_rate`.
    pub fn decode_audio(&self, input: &Path, sample_rate: u32) -> Result<Vec<f32>> {
        let args = [
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-f".to_string(),
            "f32le".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-".to_string(),
        ];
        let bytes = self.run(input, &args)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Write the frame at `time` seconds to `output`.
    pub fn extract_frame(&self, input: &Path, time: f64, output: &Path) -> Result<()> {
        let args = [
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            time.to_string(),
            "-i".to_string(),
            input.display().to_string(),
            "-frames:v".to_string(),
            "1".to_string(),
            output.display().to_string(),
        ];
        self.run(input, &args).map(|_| ())
    }
}
