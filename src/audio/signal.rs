//! Sine test tone generation
//!
//! Produces exactly one second of interleaved integer PCM. The caller plays it
//! as a circular buffer, so the tone frequency should divide the sample rate
//! for the loop point to be seamless.

use crate::audio::{AudioBuffer, AudioFormat};
use crate::error::Result;
use std::f64::consts::PI;

/// Tone parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    /// Tone frequency in Hz
    pub frequency_hz: u32,
    /// Target RMS level in dBFS
    pub volume_db: f64,
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            frequency_hz: 1000,
            volume_db: -18.0,
        }
    }
}

impl ToneParams {
    /// Linear peak scale for the target RMS level
    ///
    /// A sine with peak `p` has RMS `p / sqrt(2)`, hence the correction.
    pub fn scale(&self) -> f64 {
        10f64.powf(self.volume_db / 20.0) * 2f64.sqrt()
    }
}

/// Sine wave generator
pub struct SignalGenerator;

impl SignalGenerator {
    /// Generate one second of a sine tone in `format`
    ///
    /// Every channel of a frame carries the same sample. Values are rounded
    /// and saturate at the format's peak amplitude, so levels above -3 dBFS
    /// clip instead of wrapping.
    ///
    /// The phase `i * f` is reduced modulo the sample rate before conversion to
    /// an angle. Against the direct `sin(2π * i * f / sr)` this can move a
    /// sample by one LSB for some tones (997 Hz at 32-bit, for one). The
    /// default 1000 Hz tone is identical at 16 and 32-bit.
    pub fn generate(format: AudioFormat, tone: ToneParams) -> AudioBuffer {
        let sample_rate = format.sample_rate as u64;
        let peak = format.peak_amplitude();
        let amplitude = tone.scale() * peak as f64;
        let bytes_per_sample = format.bytes_per_sample();

        let mut data = Vec::with_capacity(format.bytes_per_second());
        for i in 0..sample_rate {
            // Reduce the phase in integers so the waveform repeats bit-exactly
            let phase = (i * tone.frequency_hz as u64) % sample_rate;
            let angle = 2.0 * PI * phase as f64 / sample_rate as f64;
            let value = ((angle.sin() * amplitude).round() as i64).clamp(-peak, peak);

            let bytes = value.to_le_bytes();
            for _ in 0..format.channels {
                data.extend_from_slice(&bytes[..bytes_per_sample]);
            }
        }

        AudioBuffer::from_pcm(format, data.into_boxed_slice())
    }

    /// Generate from raw parameters
    pub fn sine(
        sample_rate: u32,
        bytes_per_sample: u16,
        channels: u16,
        frequency_hz: u32,
        volume_db: f64,
    ) -> Result<AudioBuffer> {
        let format = AudioFormat::new(sample_rate, channels, bytes_per_sample * 8)?;
        Ok(Self::generate(
            format,
            ToneParams {
                frequency_hz,
                volume_db,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_tone() -> AudioBuffer {
        SignalGenerator::sine(48000, 2, 2, 1000, -18.0).unwrap()
    }

    #[test]
    fn test_one_second_length() {
        let buffer = reference_tone();
        assert_eq!(buffer.len_bytes(), 48000 * 2 * 2);
        assert_eq!(buffer.frame_count(), 48000);

        let wide = SignalGenerator::sine(48000, 4, 8, 1000, -18.0).unwrap();
        assert_eq!(wide.len_bytes(), 48000 * 4 * 8);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(reference_tone().as_bytes(), reference_tone().as_bytes());
    }

    #[test]
    fn test_channels_carry_identical_samples() {
        let buffer = reference_tone();
        for frame in 0..buffer.frame_count() {
            assert_eq!(buffer.sample(frame, 0), buffer.sample(frame, 1));
        }
    }

    #[test]
    fn test_reference_level() {
        let buffer = reference_tone();
        // -18 dBFS RMS: peak = 32767 * 10^(-0.9) * sqrt(2), about 5834
        let expected_peak = (ToneParams::default().scale() * 32767.0).round() as i32;
        assert_eq!(expected_peak, 5834);
        let peak = (0..buffer.frame_count())
            .map(|f| buffer.sample(f, 0).abs())
            .max()
            .unwrap();
        assert_eq!(peak, expected_peak);
        // Quarter period of a 1 kHz tone at 48 kHz lands on the crest
        assert_eq!(buffer.sample(12, 0), expected_peak);
    }

    #[test]
    fn test_amplitude_bound_at_full_scale() {
        for volume_db in [0.0, -1.0, -3.0, -18.0, -60.0] {
            let buffer = SignalGenerator::sine(48000, 2, 2, 1000, volume_db).unwrap();
            for frame in 0..buffer.frame_count() {
                assert!(buffer.sample(frame, 0).abs() <= i16::MAX as i32);
            }
        }
    }

    #[test]
    fn test_periodicity() {
        let buffer = reference_tone();
        let period = 48000 / 1000;
        for frame in 0..buffer.frame_count() - period {
            assert_eq!(buffer.sample(frame, 0), buffer.sample(frame + period, 0));
        }
        // Zero crossings at the start and middle of every period
        for cycle in 0..1000 {
            assert_eq!(buffer.sample(cycle * period, 0), 0);
            assert_eq!(buffer.sample(cycle * period + period / 2, 0), 0);
        }
    }

    #[test]
    fn test_default_tone_matches_direct_formula() {
        for bits in [16u16, 32] {
            let format = AudioFormat::new(48000, 2, bits).unwrap();
            let tone = ToneParams::default();
            let buffer = SignalGenerator::generate(format, tone);
            let peak = format.peak_amplitude();
            let amplitude = tone.scale() * peak as f64;

            for i in 0..48000usize {
                let angle = 2.0 * PI * i as f64 * 1000.0 / 48000.0;
                let direct = ((angle.sin() * amplitude).round() as i64).clamp(-peak, peak);
                assert_eq!(buffer.sample(i, 0) as i64, direct, "{}-bit sample {}", bits, i);
            }
        }
    }

    #[test]
    fn test_32bit_depth() {
        let buffer = SignalGenerator::sine(48000, 4, 2, 1000, -18.0).unwrap();
        let expected_peak = (ToneParams::default().scale() * i32::MAX as f64).round() as i32;
        assert_eq!(buffer.sample(12, 1), expected_peak);
        assert_eq!(buffer.sample(36, 0), -expected_peak);
    }

    #[test]
    fn test_scale_is_rms_corrected() {
        let tone = ToneParams {
            frequency_hz: 1000,
            volume_db: 0.0,
        };
        approx::assert_relative_eq!(tone.scale(), 2f64.sqrt());
    }
}
