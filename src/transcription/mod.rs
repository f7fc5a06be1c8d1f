//! # Transcription Module
//!
//! Speech-to-text via Whisper models running on Candle-rs. Pure Rust
//! inference, no FFI bindings to whisper.cpp.
//!
//! The model is loaded once at process start and never reloaded or swapped;
//! everything after that is a read-only consumption of the loaded weights.
//!
//! ## Whisper Model Tiers:
//! - **tiny**: ~39MB, fastest but least accurate
//! - **base**: ~74MB, the default here, fast with decent accuracy
//! - **small**: ~244MB, better accuracy
//! - **medium**: ~769MB, good technical vocabulary
//! - **large**: ~1550MB, best accuracy but slowest

pub mod model;

pub use model::{ModelSize, WhisperModel};
