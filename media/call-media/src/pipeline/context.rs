use crate::{
    audio::{AudioFormat, Dsp, Resampler, apply_gain},
    config::DspConfig,
};

/// Smoothstep fade-in applied to the first frames of a stream
#[derive(Debug)]
pub(super) struct FadeIn {
    factor: f32,
}

impl FadeIn {
    pub(super) fn new() -> Self {
        Self { factor: 0.0 }
    }

    pub(super) fn is_done(&self) -> bool {
        self.factor >= 1.0
    }

    pub(super) fn apply(&mut self, samples: &mut [i16], format: AudioFormat) {
        if self.is_done() || format.sample_rate == 0 {
            return;
        }

        let f = self.factor;
        apply_gain(samples, f * f * (3.0 - 2.0 * f));

        self.factor += format.frames(samples.len()) as f32 / format.sample_rate as f32;
    }
}

/// Per direction state derived from the active codec
#[derive(Debug)]
pub(super) struct AudioContext {
    /// Index of the codec in the pipeline's codec list
    pub(super) codec: usize,
    pub(super) payload_type: u8,
    pub(super) codec_format: AudioFormat,
    /// Converts between the codec's and the audio layer's format
    pub(super) resampler: Option<Resampler>,
    pub(super) dsp: Option<Dsp>,
    pub(super) fade: FadeIn,
}

impl AudioContext {
    pub(super) fn new(
        codec: usize,
        payload_type: u8,
        from: AudioFormat,
        to: AudioFormat,
        codec_format: AudioFormat,
        dsp: DspConfig,
    ) -> Self {
        Self {
            codec,
            payload_type,
            codec_format,
            resampler: (from != to).then(|| Resampler::new(from, to)),
            dsp: Dsp::new(dsp),
            fade: FadeIn::new(),
        }
    }

    pub(super) fn resample(&self, samples: Vec<i16>) -> Vec<i16> {
        match &self.resampler {
            Some(resampler) => resampler.process(&samples),
            None => samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_reaches_unity() {
        let format = AudioFormat::new(8000, 1);
        let mut fade = FadeIn::new();

        let mut first = [1000i16; 160];
        fade.apply(&mut first, format);
        assert_eq!(first[0], 0);

        let mut gains = vec![];
        while !fade.is_done() {
            let mut frame = [1000i16; 160];
            fade.apply(&mut frame, format);
            gains.push(frame[0]);
        }

        // 50 frames of 20ms make up one second
        assert!((48..=50).contains(&gains.len()), "{}", gains.len());
        assert!(gains.windows(2).all(|w| w[0] <= w[1]));

        let mut frame = [1000i16; 160];
        fade.apply(&mut frame, format);
        assert_eq!(frame[0], 1000);
    }
}
