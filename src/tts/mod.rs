pub mod piper;
pub mod voice;

use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::AppError;

pub use piper::PiperVoice;
pub use voice::Voice;

/// A voice that turns text into mono float samples in `[-1.0, 1.0]`.
///
/// Implementations are shared across request handlers, so they must be safe
/// to call from several threads at once.
pub trait Synthesizer: Send + Sync {
    fn sample_rate(&self) -> u32;

    fn synthesize(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

pub struct TtsService {
    voice: Box<dyn Synthesizer>,
}

impl TtsService {
    pub fn new(voice: Box<dyn Synthesizer>) -> Self {
        Self { voice }
    }

    /// Loads the Piper voice at `model_path`. Called once at startup.
    pub fn load(model_path: &Path) -> Result<Self, AppError> {
        let voice = Voice::load(model_path)?;
        tracing::info!(
            model = %voice.model_path.display(),
            sample_rate = voice.config.audio.sample_rate,
            espeak_voice = voice.config.espeak_voice(),
            "Loading voice"
        );
        Ok(Self::new(Box::new(PiperVoice::load(voice)?)))
    }

    pub fn sample_rate(&self) -> u32 {
        self.voice.sample_rate()
    }

    /// Synthesizes `text` into a complete in-memory WAV file.
    pub fn synthesize(&self, text: &str) -> Result<Vec<u8>, AppError> {
        let mut buffer = Cursor::new(Vec::new());
        self.synthesize_wav(text, &mut buffer)?;
        Ok(buffer.into_inner())
    }

    /// Writes a WAV header in the voice's format followed by the PCM for `text`.
    pub fn synthesize_wav<W: Write + Seek>(&self, text: &str, sink: W) -> Result<(), AppError> {
        let samples = self.voice.synthesize(text)?;
        write_wav(sink, wav_spec(self.voice.sample_rate()), &samples_to_pcm(&samples))
    }
}

/// 16-bit mono PCM, the format Piper voices are trained for.
pub fn wav_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Scales one sentence so its peak sits at 1.0. The peak is floored at 0.01
/// so near-silence is not blown up into noise.
pub fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs())).max(0.01);
    let scale = 1.0 / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
}

pub fn samples_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s * 32767.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

pub fn write_wav<W: Write + Seek>(sink: W, spec: WavSpec, pcm: &[i16]) -> Result<(), AppError> {
    let mut writer = WavWriter::new(sink, spec)
        .map_err(|e| AppError::TtsError(format!("Failed to create WAV writer: {}", e)))?;

    for &sample in pcm {
        writer
            .write_sample(sample)
            .map_err(|e| AppError::TtsError(format!("Failed to write sample: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AppError::TtsError(format!("Failed to finalize WAV: {}", e)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Produces a short sine burst whose length grows with the input.
    pub(crate) struct ToneVoice;

    impl Synthesizer for ToneVoice {
        fn sample_rate(&self) -> u32 {
            22050
        }

        fn synthesize(&self, text: &str) -> Result<Vec<f32>, AppError> {
            let len = text.trim().chars().count() * 100;
            Ok((0..len)
                .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 22050.0).sin() * 0.5)
                .collect())
        }
    }

    pub(crate) struct BrokenVoice;

    impl Synthesizer for BrokenVoice {
        fn sample_rate(&self) -> u32 {
            22050
        }

        fn synthesize(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            Err(AppError::TtsError("espeak-ng failed: voice not found".into()))
        }
    }

    #[test]
    fn test_synthesize_produces_wav() {
        let service = TtsService::new(Box::new(ToneVoice));
        let wav = service.synthesize("Bonjour").unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec(), wav_spec(22050));
        assert_eq!(reader.len(), 700);
    }

    #[test]
    fn test_blank_text_gives_header_only_wav() {
        let service = TtsService::new(Box::new(ToneVoice));
        let wav = service.synthesize("  ").unwrap();
        assert!(wav.len() >= 44);
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn test_synthesis_error_propagates() {
        let service = TtsService::new(Box::new(BrokenVoice));
        assert!(matches!(
            service.synthesize("Bonjour"),
            Err(AppError::TtsError(_))
        ));
    }

    #[test]
    fn test_samples_to_pcm_scales_and_clamps() {
        assert_eq!(
            samples_to_pcm(&[0.0, 0.5, -1.0, 1.5, -2.0]),
            vec![0, 16383, -32767, 32767, -32768]
        );
    }

    #[test]
    fn test_normalize_peak_per_sentence() {
        let mut quiet = vec![0.05, -0.1];
        let mut loud = vec![0.8, -0.4];
        normalize_peak(&mut quiet);
        normalize_peak(&mut loud);

        // Both sentences reach full scale on their own.
        assert!((quiet[1] + 1.0).abs() < 1e-6);
        assert!((quiet[0] - 0.5).abs() < 1e-6);
        assert!((loud[0] - 1.0).abs() < 1e-6);
        assert!((loud[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_peak_quiet_input_not_boosted() {
        // Peak is floored at 0.01, so 0.001 ends up at a tenth of full scale.
        let mut near_silent = vec![0.001];
        normalize_peak(&mut near_silent);
        assert!((near_silent[0] - 0.1).abs() < 1e-6);
        assert_eq!(samples_to_pcm(&near_silent), vec![3276]);
    }

    #[test]
    fn test_normalize_peak_empty() {
        let mut empty: Vec<f32> = Vec::new();
        normalize_peak(&mut empty);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_samples_to_pcm_empty() {
        assert!(samples_to_pcm(&[]).is_empty());
    }
}
