//! Sine tone synthesis with a linear attack/release envelope.

use std::f64::consts::TAU;
use std::time::Duration;

use super::AudioError;

/// Share of the tone spent ramping up, and again ramping down.
const RAMP_FRACTION: f64 = 0.1;

/// Longest tone we are willing to synthesize.
pub const MAX_DURATION_MS: u32 = 10_000;

/// Mono PCM samples in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    frequency: u32,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl Waveform {
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Checks that a tone can be synthesized.
///
/// # Errors
/// Returns an error for zero frequency, zero or overlong duration, or a
/// volume that is not a finite number.
pub fn validate(frequency: u32, duration_ms: u32, volume: f32) -> Result<(), AudioError> {
    if frequency == 0 {
        return Err(AudioError::synthesis("frequency must be positive"));
    }
    if duration_ms == 0 || duration_ms > MAX_DURATION_MS {
        return Err(AudioError::synthesis(format!(
            "duration {duration_ms}ms outside 1..={MAX_DURATION_MS}"
        )));
    }
    if !volume.is_finite() {
        return Err(AudioError::synthesis("volume must be finite"));
    }
    Ok(())
}

/// Synthesizes a sine tone shaped by a linear attack, plateau and release.
///
/// Volume is clamped to `[0.0, 1.0]`.
///
/// # Errors
/// Returns an error if the parameters fail [`validate`] or the sample rate
/// is zero.
pub fn synthesize(
    frequency: u32,
    duration_ms: u32,
    volume: f32,
    sample_rate: u32,
) -> Result<Waveform, AudioError> {
    validate(frequency, duration_ms, volume)?;
    if sample_rate == 0 {
        return Err(AudioError::synthesis("sample rate must be positive"));
    }

    let len = (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize;
    let ramp = (len as f64 * RAMP_FRACTION) as usize;
    let amplitude = f64::from(volume.clamp(0.0, 1.0));
    let step = TAU * f64::from(frequency) / f64::from(sample_rate);

    let samples = (0..len)
        .map(|i| {
            let envelope = if ramp == 0 {
                1.0
            } else if i < ramp {
                i as f64 / ramp as f64
            } else if i >= len - ramp {
                (len - 1 - i) as f64 / ramp as f64
            } else {
                1.0
            };
            ((step * i as f64).sin() * amplitude * envelope) as f32
        })
        .collect();

    Ok(Waveform {
        frequency,
        sample_rate,
        samples,
    })
}
