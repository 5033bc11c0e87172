use crate::config::DspConfig;

/// Level the automatic gain control steers towards, about -20dBFS
const AGC_TARGET_RMS: f32 = 3300.0;
const AGC_MIN_GAIN: f32 = 0.5;
const AGC_MAX_GAIN: f32 = 8.0;
/// Fraction of the distance to the desired gain covered per frame
const AGC_ADAPTATION: f32 = 0.1;
/// Frames quieter than this are not used to adapt the gain
const AGC_SILENCE_RMS: f32 = 100.0;

/// Frames below `NOISE_GATE_RATIO` times the noise floor are attenuated
const NOISE_GATE_RATIO: f32 = 2.0;
const NOISE_GATE_ATTENUATION: f32 = 0.25;
/// Rate at which the noise floor estimate follows louder frames
const NOISE_FLOOR_RISE: f32 = 0.02;

/// Noise gate & automatic gain control for a single audio stream
#[derive(Debug)]
pub(crate) struct Dsp {
    config: DspConfig,
    noise_floor: Option<f32>,
    gain: f32,
}

impl Dsp {
    /// Returns `None` if no processing is enabled
    pub(crate) fn new(config: DspConfig) -> Option<Self> {
        if !config.noise_suppression && !config.agc {
            return None;
        }

        Some(Self {
            config,
            noise_floor: None,
            gain: 1.0,
        })
    }

    pub(crate) fn process(&mut self, samples: &mut [i16]) {
        if samples.is_empty() {
            return;
        }

        let rms = rms(samples);
        let mut gain = 1.0;

        if self.config.noise_suppression {
            let floor = match self.noise_floor {
                // Follow quieter frames immediately, louder ones slowly
                Some(floor) if rms > floor => floor + (rms - floor) * NOISE_FLOOR_RISE,
                _ => rms,
            };
            self.noise_floor = Some(floor);

            if rms < floor * NOISE_GATE_RATIO {
                gain *= NOISE_GATE_ATTENUATION;
            }
        }

        if self.config.agc {
            if rms > AGC_SILENCE_RMS {
                let desired = (AGC_TARGET_RMS / rms).clamp(AGC_MIN_GAIN, AGC_MAX_GAIN);
                self.gain += (desired - self.gain) * AGC_ADAPTATION;
            }

            gain *= self.gain;
        }

        apply_gain(samples, gain);
    }
}

fn rms(samples: &[i16]) -> f32 {
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();

    (sum / samples.len() as f64).sqrt() as f32
}

/// Scale samples, saturating at the i16 range
pub(crate) fn apply_gain(samples: &mut [i16], gain: f32) {
    if gain == 1.0 {
        return;
    }

    for sample in samples {
        *sample = (f32::from(*sample) * gain).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
}
