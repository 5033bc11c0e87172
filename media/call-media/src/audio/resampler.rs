use super::AudioFormat;

/// Converts interleaved PCM between channel layouts and sample rates
///
/// Channels are remixed first, then the rate is converted using linear interpolation.
#[derive(Debug)]
pub(crate) struct Resampler {
    from: AudioFormat,
    to: AudioFormat,
}

impl Resampler {
    pub(crate) fn new(from: AudioFormat, to: AudioFormat) -> Self {
        Self { from, to }
    }

    pub(crate) fn process(&self, input: &[i16]) -> Vec<i16> {
        let remixed = remix(input, self.from.channels, self.to.channels);

        if self.from.sample_rate == self.to.sample_rate || self.from.sample_rate == 0 {
            return remixed;
        }

        let channels = usize::from(self.to.channels.max(1));
        let in_frames = remixed.len() / channels;

        if in_frames == 0 {
            return vec![];
        }

        let out_frames = (in_frames as u64 * u64::from(self.to.sample_rate)
            / u64::from(self.from.sample_rate)) as usize;
        let step = f64::from(self.from.sample_rate) / f64::from(self.to.sample_rate);

        let mut output = Vec::with_capacity(out_frames * channels);

        for frame in 0..out_frames {
            let position = frame as f64 * step;
            let index = position.floor() as usize;
            let fraction = position - position.floor();

            for channel in 0..channels {
                let current = remixed
                    .get(index * channels + channel)
                    .copied()
                    .unwrap_or_default();
                let next = remixed
                    .get((index + 1) * channels + channel)
                    .copied()
                    .unwrap_or(current);

                let value = f64::from(current) + (f64::from(next) - f64::from(current)) * fraction;
                output.push(value.round() as i16);
            }
        }

        output
    }
}

fn remix(input: &[i16], from: u16, to: u16) -> Vec<i16> {
    let (from, to) = (usize::from(from.max(1)), usize::from(to.max(1)));

    if from == to {
        return input.to_vec();
    }

    let mut output = Vec::with_capacity(input.len() / from * to);

    for frame in input.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            output.push((sum / from as i32) as i16);
        } else if from == 1 {
            output.extend(std::iter::repeat_n(frame[0], to));
        } else {
            output.extend((0..to).map(|channel| frame[channel.min(from - 1)]));
        }
    }

    output
}
