use rubato::{FftFixedIn, Resampler};

use crate::error::{Result, VoiceError};

pub const DISCORD_SAMPLE_RATE: usize = 48_000;
pub const WHISPER_SAMPLE_RATE: usize = 16_000;

/// Resamples mono f32 PCM from Discord's 48 kHz to Whisper's expected 16 kHz.
pub struct Resampler48kTo16k {
    inner: FftFixedIn<f32>,
}

impl Resampler48kTo16k {
    pub fn new(chunk_size: usize) -> Result<Self> {
        let inner = FftFixedIn::new(DISCORD_SAMPLE_RATE, WHISPER_SAMPLE_RATE, chunk_size, 2, 1)
            .map_err(|e| VoiceError::Resample(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let input = vec![samples.to_vec()];
        let output = self
            .inner
            .process(&input, None)
            .map_err(|e| VoiceError::Resample(e.to_string()))?;
        Ok(output.into_iter().next().unwrap_or_default())
    }
}

/// Downmixes interleaved stereo i16 PCM to mono f32 in `[-1.0, 1.0]` by
/// averaging the left/right sample pair per frame.
pub fn downmix_stereo_i16(interleaved: &[i16]) -> Vec<f32> {
    interleaved
        .chunks_exact(2)
        .map(|pair| {
            let l = pair[0] as f32;
            let r = pair[1] as f32;
            (l + r) / 2.0 / 32768.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        let interleaved = [32767i16, -32768, 0, 0];
        let mono = downmix_stereo_i16(&interleaved);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - (-0.0000152587890625)).abs() < 1e-6);
        assert_eq!(mono[1], 0.0);
    }
}
