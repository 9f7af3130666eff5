use std::collections::HashMap;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::AppError;
use crate::tts::voice::{Voice, VoiceConfig};
use crate::tts::{normalize_peak, Synthesizer};

const BOS: &str = "^";
const EOS: &str = "$";
const PAD: &str = "_";

pub struct PiperEngine {
    session: Mutex<Session>,
    noise_scale: f32,
    length_scale: f32,
    noise_w: f32,
}

impl PiperEngine {
    pub fn new(voice: &Voice) -> Result<Self, AppError> {
        let session = Session::builder()
            .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(4)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&voice.model_path)
            .map_err(|e| AppError::ModelLoad(format!("Failed to load model: {}", e)))?;

        let inference = &voice.config.inference;

        Ok(Self {
            session: Mutex::new(session),
            noise_scale: inference.noise_scale,
            length_scale: inference.length_scale,
            noise_w: inference.noise_w,
        })
    }

    /// Runs the VITS model on one sentence worth of phoneme ids.
    pub fn infer(&self, phoneme_ids: &[i64]) -> Result<Vec<f32>, AppError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [batch, sequence] = [1, phoneme_count]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(|e| AppError::TtsError(format!("Failed to create input tensor: {}", e)))?;

        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(|e| AppError::TtsError(format!("Failed to create lengths tensor: {}", e)))?;

        let scales_value = Value::from_array((
            vec![3],
            vec![self.noise_scale, self.length_scale, self.noise_w],
        ))
        .map_err(|e| AppError::TtsError(format!("Failed to create scales tensor: {}", e)))?;

        // ONNX Runtime sessions are run one at a time here.
        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::TtsError("Inference session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![input_value, lengths_value, scales_value])
            .map_err(|e| AppError::TtsError(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::TtsError("Missing output tensor".to_string()))?;

        let (_, audio) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::TtsError(format!("Failed to extract output tensor: {}", e)))?;

        Ok(audio.to_vec())
    }
}

/// A loaded Piper voice: the ONNX engine plus the config needed to feed it.
pub struct PiperVoice {
    engine: PiperEngine,
    config: VoiceConfig,
}

impl PiperVoice {
    pub fn load(voice: Voice) -> Result<Self, AppError> {
        let engine = PiperEngine::new(&voice)?;
        Ok(Self {
            engine,
            config: voice.config,
        })
    }
}

impl Synthesizer for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.config.audio.sample_rate
    }

    fn synthesize(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let phonemes = phonemize(text, self.config.espeak_voice())?;

        let mut audio = Vec::new();
        for sentence in phonemes.lines().map(str::trim).filter(|s| !s.is_empty()) {
            let ids = phonemes_to_ids(sentence, &self.config.phoneme_id_map);
            tracing::debug!(phonemes = sentence.chars().count(), ids = ids.len(), "Synthesizing sentence");
            let mut chunk = self.engine.infer(&ids)?;
            normalize_peak(&mut chunk);
            audio.extend(chunk);
        }

        Ok(audio)
    }
}

/// Convert text to IPA phonemes using espeak-ng, one sentence per line.
pub fn phonemize(text: &str, voice: &str) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    // Text goes over stdin so input starting with '-' is never read as a flag.
    let mut command = Command::new("espeak-ng");
    command.args(["--ipa", "-q", "--stdin", "-v", voice]);
    run_phonemizer(command, text)
}

/// Feeds `text` to the phonemizer's stdin and collects its stdout. The child
/// is always reaped; a failed exit status is reported before any write error.
fn run_phonemizer(mut command: Command, text: &str) -> Result<String, AppError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            AppError::TtsError(format!(
                "Failed to run espeak-ng (is it installed?): {}",
                e
            ))
        })?;

    // Write from a separate thread so a full stdout pipe cannot stall the write.
    let stdin = child.stdin.take();
    let input = text.to_owned();
    let writer = std::thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(input.as_bytes())?;
        }
        Ok(())
    });

    let output = child.wait_with_output()?;
    let written = writer
        .join()
        .map_err(|_| AppError::TtsError("espeak-ng stdin writer panicked".to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::TtsError(format!(
            "espeak-ng failed: {}",
            stderr.trim()
        )));
    }
    written?;

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Convert phonemes to ids with the voice's map: BOS, PAD, then every known
/// phoneme followed by PAD, then EOS. Phonemes missing from the map are dropped.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let pad = id_map.get(PAD).map(Vec::as_slice).unwrap_or(&[0]);
    let mut ids = Vec::new();

    match id_map.get(BOS) {
        Some(bos) => ids.extend(bos),
        None => ids.push(0),
    }
    ids.extend(pad);

    let mut buf = [0u8; 4];
    for ch in phonemes.chars() {
        let key: &str = ch.encode_utf8(&mut buf);
        if let Some(mapped) = id_map.get(key) {
            ids.extend(mapped);
            ids.extend(pad);
        }
    }

    match id_map.get(EOS) {
        Some(eos) => ids.extend(eos),
        None => ids.push(0),
    }

    ids
}
