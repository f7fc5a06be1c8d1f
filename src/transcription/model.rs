//! # Whisper Model
//!
//! Loading and running Whisper via Candle-rs. Weights, tokenizer, and config
//! come from HuggingFace (cached by hf-hub after the first download); the
//! model runs on CPU with f32 weights; half-precision arithmetic is
//! deliberately not used.
//!
//! ## Loading Process:
//! 1. Resolve the HuggingFace repo for the configured tier
//! 2. Download config.json, tokenizer.json and model.safetensors (cached)
//! 3. Memory-map the weights into a Candle model on the CPU
//!
//! A load failure is fatal to the process by design: it propagates out of
//! `main` before the server ever binds its port.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Available Whisper model tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository for this tier.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate download size in MB, for startup logging.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!(
                "Unknown model size: {} (expected tiny/base/small/medium/large)",
                s
            )),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

// Special token ids shared by the multilingual Whisper vocabularies.
const SOT_TOKEN: u32 = 50258;
const EOT_TOKEN: u32 = 50257;
const TRANSCRIBE_TOKEN: u32 = 50359;

/// Hard ceiling on generated tokens per request.
const MAX_DECODE_TOKENS: usize = 224;

/// A loaded Whisper model ready for transcription.
///
/// Decoding mutates the model's key/value caches, so callers serialize
/// access; the service keeps one instance behind an async mutex.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    size: ModelSize,
}

impl WhisperModel {
    /// Download (or reuse the cached copy of) and load the given model tier.
    pub async fn load(size: ModelSize) -> Result<Self> {
        info!(
            "Loading Whisper {} model (~{} MB) from {}",
            size,
            size.size_mb(),
            size.repo_name()
        );
        let start_time = std::time::Instant::now();

        let api = build_hub_api()?;
        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;
        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_filename], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let mel_filters = load_mel_filters(config.num_mel_bins as usize)?;

        info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
            mel_filters,
            size,
        })
    }

    /// The tier this model was loaded as.
    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Transcribe 16 kHz mono f32 samples to text.
    ///
    /// The decoder is forced to the given target language and to the
    /// transcription task (not translation). Output is greedy-decoded with a
    /// repetition cut-off and returned with special tokens stripped.
    pub fn transcribe(&mut self, samples: &[f32], language: &str) -> Result<String> {
        if samples.is_empty() {
            return Err(anyhow!("Decoded audio is empty"));
        }

        let start_time = std::time::Instant::now();
        let mel = self.log_mel_spectrogram(samples)?;

        let encoder_output = self.model.encoder.forward(&mel, true)?;

        // Prompt: start-of-transcript, target language, transcribe task
        let mut tokens = vec![SOT_TOKEN];
        if let Some(lang_token) = language_token(language) {
            tokens.push(lang_token);
        }
        tokens.push(TRANSCRIBE_TOKEN);
        let prompt_len = tokens.len();

        let mut generated = Vec::new();
        for _ in 0..MAX_DECODE_TOKENS {
            let input = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            let hidden = self
                .model
                .decoder
                .forward(&input, &encoder_output, tokens.len() == prompt_len)?;

            // Project only the last position through the output head
            let last_hidden = hidden.i((..1, tokens.len() - 1..))?;
            let logits: Vec<f32> = self
                .model
                .decoder
                .final_linear(&last_hidden)?
                .flatten_all()?
                .to_vec1()?;
            let next_token = logits
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(idx, _)| idx as u32)
                .ok_or_else(|| anyhow!("Decoder produced empty logits"))?;

            if next_token == EOT_TOKEN {
                break;
            }

            if is_repetitive(&generated, next_token) {
                debug!("Stopping decode on repetition after {} tokens", generated.len());
                break;
            }

            tokens.push(next_token);
            generated.push(next_token);
        }

        let text = self.decode_tokens(&generated)?;
        debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            samples.len() as f64 / 16000.0,
            start_time.elapsed().as_secs_f64(),
            text
        );

        Ok(text)
    }

    /// Convert samples to the log-mel spectrogram the encoder expects.
    ///
    /// The input window is fixed at 30 seconds (padded with silence or
    /// truncated), which is the frame count the pretrained positional
    /// embeddings were trained on.
    fn log_mel_spectrogram(&self, samples: &[f32]) -> Result<Tensor> {
        let target_len = 30 * 16000;
        let mut padded = vec![0.0f32; target_len];
        let copy_len = samples.len().min(target_len);
        padded[..copy_len].copy_from_slice(&samples[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let mel = audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let n_frames = mel.len() / n_mels;

        Ok(Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?)
    }

    /// Decode generated token ids to cleaned text.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

/// Build the hf-hub API client, honoring HF_TOKEN and cache overrides.
fn build_hub_api() -> Result<hf_hub::api::tokio::Api> {
    use hf_hub::api::tokio::ApiBuilder;

    let mut builder = ApiBuilder::new().with_progress(false);

    if let Ok(token) = std::env::var("HF_TOKEN") {
        builder = builder.with_token(Some(token));
    } else {
        builder = builder.with_token(None);
    }

    if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
        builder = builder.with_cache_dir(cache_dir.into());
    } else if let Ok(hf_home) = std::env::var("HF_HOME") {
        builder = builder.with_cache_dir(std::path::PathBuf::from(hf_home).join("hub"));
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to initialize HuggingFace hub client: {}", e))
}

/// Language token id for the multilingual vocabularies.
fn language_token(language: &str) -> Option<u32> {
    match language.to_lowercase().as_str() {
        "en" | "english" => Some(50259),
        "zh" | "chinese" => Some(50260),
        "de" | "german" => Some(50261),
        "es" | "spanish" => Some(50262),
        "ru" | "russian" => Some(50263),
        "ko" | "korean" => Some(50264),
        "fr" | "french" => Some(50265),
        "ja" | "japanese" => Some(50266),
        "pt" | "portuguese" => Some(50267),
        "it" | "italian" => Some(50274),
        _ => None,
    }
}

/// Detect degenerate decoding: the same token three times in a row, or the
/// same three-token pattern twice.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    let n = tokens.len();

    if n >= 2 && tokens[n - 1] == new_token && tokens[n - 2] == new_token {
        return true;
    }

    if n >= 5 {
        let candidate = [tokens[n - 2], tokens[n - 1], new_token];
        if tokens[n - 5..n - 2] == candidate {
            return true;
        }
    }

    false
}

/// Precomputed 80-bin mel filter bank (16 kHz, 400-point FFT) shared by all
/// multilingual Whisper tiers, stored as row-major little-endian f32.
const MEL_FILTER_BYTES: &[u8] = include_bytes!("melfilters.bin");

/// Load the embedded mel filter bank for the spectrogram front-end.
fn load_mel_filters(n_mels: usize) -> Result<Vec<f32>> {
    if n_mels != 80 {
        return Err(anyhow!(
            "Model expects {} mel bins but only an 80-bin filter bank is bundled",
            n_mels
        ));
    }

    let mut filters = vec![0.0f32; MEL_FILTER_BYTES.len() / 4];
    LittleEndian::read_f32_into(MEL_FILTER_BYTES, &mut filters);
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("base".parse::<ModelSize>().unwrap(), ModelSize::Base);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("enormous".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_model_size_display_round_trips() {
        for size in [
            ModelSize::Tiny,
            ModelSize::Base,
            ModelSize::Small,
            ModelSize::Medium,
            ModelSize::Large,
        ] {
            assert_eq!(size.to_string().parse::<ModelSize>().unwrap(), size);
        }
    }

    #[test]
    fn test_repo_names() {
        assert_eq!(ModelSize::Base.repo_name(), "openai/whisper-base");
        assert_eq!(ModelSize::Large.repo_name(), "openai/whisper-large-v2");
    }

    #[test]
    fn test_language_tokens() {
        assert_eq!(language_token("en"), Some(50259));
        assert_eq!(language_token("English"), Some(50259));
        assert_eq!(language_token("fr"), Some(50265));
        assert_eq!(language_token("tlh"), None);
    }

    #[test]
    fn test_repetition_cutoff() {
        assert!(!is_repetitive(&[], 7));
        assert!(!is_repetitive(&[7], 7));
        assert!(is_repetitive(&[1, 7, 7], 7));
        assert!(is_repetitive(&[1, 2, 3, 1, 2], 3));
        assert!(is_repetitive(&[0, 1, 2, 3, 1, 2], 3));
        assert!(!is_repetitive(&[1, 2, 3, 4, 5], 6));
    }

    #[test]
    fn test_embedded_mel_filters() {
        // 80 bins x 201 FFT frequencies for a 400-point FFT at 16 kHz
        let filters = load_mel_filters(80).unwrap();
        assert_eq!(filters.len(), 80 * 201);
        assert!(filters.iter().all(|&v| v.is_finite() && v >= 0.0));
        // Every bin carries mass over some frequency range
        for bin in filters.chunks(201) {
            assert!(bin.iter().sum::<f32>() > 0.0);
        }
        assert!(load_mel_filters(128).is_err());
    }

    fn base_config() -> Config {
        serde_json::from_value(serde_json::json!({
            "num_mel_bins": 80,
            "max_source_positions": 1500,
            "d_model": 512,
            "encoder_attention_heads": 8,
            "encoder_layers": 6,
            "decoder_attention_heads": 8,
            "decoder_layers": 6,
            "vocab_size": 51865,
            "max_target_positions": 448,
            "suppress_tokens": [],
        }))
        .unwrap()
    }

    #[test]
    fn test_spectrogram_distinguishes_frequencies() {
        // Two equally loud tones at different pitches must produce different
        // spectrograms, otherwise no spectral content reaches the encoder.
        let config = base_config();
        let filters = load_mel_filters(80).unwrap();

        let tone = |hz: f32| -> Vec<f32> {
            (0..16000)
                .map(|i| (2.0 * std::f32::consts::PI * hz * i as f32 / 16000.0).sin() * 0.5)
                .collect()
        };
        let low = audio::pcm_to_mel(&config, &tone(200.0), &filters);
        let high = audio::pcm_to_mel(&config, &tone(3000.0), &filters);

        assert_eq!(low.len(), high.len());
        assert!(low
            .iter()
            .zip(high.iter())
            .any(|(a, b)| (a - b).abs() > 1e-3));
    }
}
