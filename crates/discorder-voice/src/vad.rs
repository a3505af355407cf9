//! Voice activity detection. Silero is invoked only on exact 512-sample
//! (32 ms at 16 kHz) chunks — a hard constraint of the model's LSTM state.

#[cfg(feature = "onnx")]
use std::sync::Mutex;

pub const VAD_CHUNK_SAMPLES: usize = 512;

/// Speech probability threshold above which a chunk counts as speech.
pub const SPEECH_THRESHOLD: f32 = 0.5;

pub trait Vad: Send + Sync {
    /// `samples` is always exactly [`VAD_CHUNK_SAMPLES`] long.
    fn speech_probability(&self, samples: &[f32]) -> f32;
}

/// Energy-based fallback VAD — used when the `onnx` feature (Silero) is not
/// compiled in.
pub struct EnergyVad {
    floor_db: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self { floor_db: -50.0 }
    }
}

impl Vad for EnergyVad {
    fn speech_probability(&self, samples: &[f32]) -> f32 {
        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let energy_db = 10.0 * energy.max(1e-10).log10();
        let threshold_db = self.floor_db + 10.0;
        if energy_db > threshold_db {
            ((energy_db - threshold_db) / 30.0).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[cfg(feature = "onnx")]
pub struct SileroVad {
    session: Mutex<ort::session::Session>,
    state: Mutex<SileroState>,
}

#[cfg(feature = "onnx")]
struct SileroState {
    h: ndarray::Array2<f32>,
    c: ndarray::Array2<f32>,
}

#[cfg(feature = "onnx")]
impl SileroVad {
    pub fn new(model_path: impl AsRef<std::path::Path>) -> crate::error::Result<Self> {
        use ort::session::builder::GraphOptimizationLevel;
        use ort::session::Session;

        let session = Session::builder()
            .map_err(|e| crate::error::VoiceError::Vad(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| crate::error::VoiceError::Vad(e.to_string()))?
            .with_intra_threads(1)
            .map_err(|e| crate::error::VoiceError::Vad(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| crate::error::VoiceError::Vad(e.to_string()))?;

        Ok(Self {
            session: Mutex::new(session),
            state: Mutex::new(SileroState {
                h: ndarray::Array2::zeros((2, 64)),
                c: ndarray::Array2::zeros((2, 64)),
            }),
        })
    }
}

#[cfg(feature = "onnx")]
impl Vad for SileroVad {
    fn speech_probability(&self, samples: &[f32]) -> f32 {
        use ort::value::Tensor;

        let input = match ndarray::Array2::from_shape_vec((1, samples.len()), samples.to_vec()) {
            Ok(a) => a,
            Err(_) => return 0.0,
        };
        let sr = ndarray::arr1(&[16000i64]);

        let mut state = self.state.lock().unwrap();
        let mut session = self.session.lock().unwrap();

        let Ok(input_tensor) = Tensor::from_array(input) else { return 0.0 };
        let Ok(sr_tensor) = Tensor::from_array(sr) else { return 0.0 };
        let Ok(h_tensor) = Tensor::from_array(state.h.clone()) else { return 0.0 };
        let Ok(c_tensor) = Tensor::from_array(state.c.clone()) else { return 0.0 };

        let outputs = match session.run(ort::inputs![
            "input" => input_tensor,
            "sr" => sr_tensor,
            "h" => h_tensor,
            "c" => c_tensor,
        ]) {
            Ok(o) => o,
            Err(_) => return 0.0,
        };

        let prob = outputs
            .get("output")
            .and_then(|t| t.try_extract_tensor::<f32>().ok())
            .and_then(|(_, data)| data.first().copied())
            .unwrap_or(0.0);

        if let Some(hn) = outputs.get("hn").and_then(|t| t.try_extract_tensor::<f32>().ok()) {
            if let Ok(view) = ndarray::ArrayView2::from_shape((2, 64), hn.1) {
                state.h.assign(&view);
            }
        }
        if let Some(cn) = outputs.get("cn").and_then(|t| t.try_extract_tensor::<f32>().ok()) {
            if let Ok(view) = ndarray::ArrayView2::from_shape((2, 64), cn.1) {
                state.c.assign(&view);
            }
        }

        prob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_is_not_speech() {
        let vad = EnergyVad::default();
        let silence = vec![0.0f32; VAD_CHUNK_SAMPLES];
        assert!(vad.speech_probability(&silence) < SPEECH_THRESHOLD);
    }

    #[test]
    fn loud_tone_is_speech() {
        let vad = EnergyVad::default();
        let tone: Vec<f32> = (0..VAD_CHUNK_SAMPLES).map(|i| (i as f32 * 0.3).sin() * 0.8).collect();
        assert!(vad.speech_probability(&tone) > SPEECH_THRESHOLD);
    }
}
