//! # Audio Handling
//!
//! Format decoding is delegated entirely to an external ffmpeg binary; this
//! module turns an uploaded container file into the 16 kHz mono f32 samples
//! the Whisper model consumes.

pub mod decoder;

pub use decoder::{decode_to_samples, DecodeError};
