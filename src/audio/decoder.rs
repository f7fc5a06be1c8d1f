//! # External Decoder Invocation
//!
//! Demuxing and decoding of uploaded audio containers (webm, ogg, mp3, wav)
//! is delegated to an ffmpeg executable rather than done in-process. ffmpeg
//! writes raw little-endian f32 samples to stdout, already downmixed to mono
//! and resampled to the 16 kHz rate Whisper expects.
//!
//! ## Binary resolution:
//! A bundled copy at `models/ffmpeg/bin/ffmpeg` (relative to the working
//! directory) is preferred when present; otherwise the plain `ffmpeg` name is
//! handed to the OS search path.

use crate::error::ApiError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Sample rate the model front-end expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Relative location of a bundled ffmpeg copy, checked before the search path.
const BUNDLED_FFMPEG: &str = "models/ffmpeg/bin/ffmpeg";

/// Why decoding an upload failed.
#[derive(Debug)]
pub enum DecodeError {
    /// The ffmpeg executable could not be spawned because it does not exist
    NotInstalled,

    /// ffmpeg ran but exited non-zero; carries the tail of its stderr
    Failed(String),

    /// Reading ffmpeg's output failed
    Io(io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::NotInstalled => write!(f, "decoder binary not found"),
            DecodeError::Failed(stderr) => write!(f, "decoder failed: {}", stderr),
            DecodeError::Io(e) => write!(f, "decoder I/O error: {}", e),
        }
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::NotInstalled => ApiError::DecoderMissing,
            DecodeError::Failed(stderr) => {
                ApiError::Inference(format!("Audio decoding failed: {}", stderr))
            }
            DecodeError::Io(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// Locate the ffmpeg executable to invoke.
fn ffmpeg_program() -> PathBuf {
    let bundled = if cfg!(target_os = "windows") {
        Path::new(BUNDLED_FFMPEG).with_extension("exe")
    } else {
        PathBuf::from(BUNDLED_FFMPEG)
    };

    if bundled.exists() {
        debug!(path = %bundled.display(), "Using bundled ffmpeg");
        bundled
    } else {
        PathBuf::from("ffmpeg")
    }
}

/// Decode an audio file into 16 kHz mono f32 samples.
///
/// Runs `ffmpeg -i <input> -f f32le -ac 1 -ar 16000 pipe:1` and parses the
/// captured stdout. The input format is sniffed by ffmpeg itself, so any
/// container it understands works here.
pub fn decode_to_samples(input: &Path) -> Result<Vec<f32>, DecodeError> {
    decode_with_program(&ffmpeg_program(), input)
}

fn decode_with_program(program: &Path, input: &Path) -> Result<Vec<f32>, DecodeError> {
    debug!(input = %input.display(), "Decoding upload with ffmpeg");

    let output = Command::new(program)
        .arg("-i")
        .arg(input)
        .args([
            "-f",
            "f32le",
            "-ac",
            "1",
            "-ar",
            &TARGET_SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                DecodeError::NotInstalled
            } else {
                DecodeError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // The interesting part of ffmpeg's stderr is the last few lines
        let tail: String = stderr
            .lines()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" ");
        warn!(status = %output.status, stderr = %tail, "ffmpeg exited non-zero");
        return Err(DecodeError::Failed(tail));
    }

    let samples = parse_f32le(&output.stdout)?;
    debug!(
        samples = samples.len(),
        seconds = samples.len() as f64 / TARGET_SAMPLE_RATE as f64,
        "Decoded upload"
    );

    Ok(samples)
}

/// Parse raw little-endian f32 bytes into samples.
fn parse_f32le(bytes: &[u8]) -> Result<Vec<f32>, DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 4);

    while let Ok(sample) = cursor.read_f32::<LittleEndian>() {
        samples.push(sample);
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_f32le() {
        let mut bytes = Vec::new();
        for value in [0.0f32, 0.5, -0.5, 1.0] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let samples = parse_f32le(&bytes).unwrap();
        assert_eq!(samples, vec![0.0, 0.5, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_f32le_ignores_trailing_partial_sample() {
        let mut bytes = 0.25f32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0x00, 0x01]);
        let samples = parse_f32le(&bytes).unwrap();
        assert_eq!(samples, vec![0.25]);
    }

    #[test]
    fn test_missing_binary_maps_to_not_installed() {
        let program = Path::new("ffmpeg-definitely-not-installed-here");
        let err = decode_with_program(program, Path::new("input.webm")).unwrap_err();
        assert!(matches!(err, DecodeError::NotInstalled));
        assert!(matches!(
            ApiError::from(err),
            ApiError::DecoderMissing
        ));
    }
}
