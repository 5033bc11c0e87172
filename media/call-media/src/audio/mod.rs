use parking_lot::Mutex;
use std::collections::VecDeque;

mod dsp;
mod resampler;

pub(crate) use dsp::{Dsp, apply_gain};
pub(crate) use resampler::Resampler;

/// Sample rate & channel layout of interleaved i16 PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Number of interleaved samples covering `frames` frames
    pub fn samples(&self, frames: usize) -> usize {
        frames * usize::from(self.channels.max(1))
    }

    /// Number of frames in `samples` interleaved samples
    pub fn frames(&self, samples: usize) -> usize {
        samples / usize::from(self.channels.max(1))
    }
}

/// Audio layer shared by all calls, captured audio is read from it and decoded audio written to it
///
/// Implementations must not block, both directions are driven from the media tasks.
pub trait AudioBridge: Send + Sync {
    /// Format of the audio layer, the pipeline converts from & to it
    fn format(&self) -> AudioFormat;

    /// Number of captured interleaved samples available for the call
    fn available(&self, call_id: &str) -> usize;

    /// Fill `out` with captured audio, returns false without consuming anything if not enough is
    /// buffered
    fn read_captured(&self, call_id: &str, out: &mut [i16]) -> bool;

    /// Drop up to `samples` captured samples, returns how many were dropped
    fn discard_captured(&self, call_id: &str, samples: usize) -> usize;

    /// Hand decoded audio to the playback mixer
    fn write_playback(&self, call_id: &str, samples: &[i16]);
}

/// In memory [`AudioBridge`] with one capture & one playback buffer
///
/// Useful for headless calls and tests. Audio is not separated per call.
#[derive(Debug)]
pub struct RingBufferBridge {
    format: AudioFormat,
    capacity: usize,
    captured: Mutex<VecDeque<i16>>,
    playback: Mutex<VecDeque<i16>>,
}

impl RingBufferBridge {
    /// Create a bridge which keeps at most `capacity` samples per direction
    pub fn new(format: AudioFormat, capacity: usize) -> Self {
        Self {
            format,
            capacity,
            captured: Mutex::new(VecDeque::with_capacity(capacity)),
            playback: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Queue audio as if it was captured by the sound card
    pub fn push_captured(&self, samples: &[i16]) {
        push_bounded(&mut self.captured.lock(), samples, self.capacity);
    }

    /// Take all decoded audio written so far
    pub fn take_playback(&self) -> Vec<i16> {
        self.playback.lock().drain(..).collect()
    }
}

fn push_bounded(buffer: &mut VecDeque<i16>, samples: &[i16], capacity: usize) {
    buffer.extend(samples);

    if buffer.len() > capacity {
        let overflow = buffer.len() - capacity;
        buffer.drain(..overflow);
    }
}

impl AudioBridge for RingBufferBridge {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn available(&self, _: &str) -> usize {
        self.captured.lock().len()
    }

    fn read_captured(&self, _: &str, out: &mut [i16]) -> bool {
        let mut captured = self.captured.lock();

        if captured.len() < out.len() {
            return false;
        }

        let len = out.len();
        for (dst, src) in out.iter_mut().zip(captured.drain(..len)) {
            *dst = src;
        }

        true
    }

    fn discard_captured(&self, _: &str, samples: usize) -> usize {
        let mut captured = self.captured.lock();
        let samples = samples.min(captured.len());
        captured.drain(..samples);
        samples
    }

    fn write_playback(&self, _: &str, samples: &[i16]) {
        push_bounded(&mut self.playback.lock(), samples, self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_requires_full_frame() {
        let bridge = RingBufferBridge::new(AudioFormat::new(8000, 1), 1000);
        bridge.push_captured(&[1, 2, 3]);

        let mut out = [0; 4];
        assert!(!bridge.read_captured("call", &mut out));
        assert_eq!(bridge.available("call"), 3);

        bridge.push_captured(&[4]);
        assert!(bridge.read_captured("call", &mut out));
        assert_eq!(out, [1, 2, 3, 4]);
        assert_eq!(bridge.available("call"), 0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let bridge = RingBufferBridge::new(AudioFormat::new(8000, 1), 4);
        bridge.write_playback("call", &[1, 2, 3, 4, 5, 6]);

        assert_eq!(bridge.take_playback(), [3, 4, 5, 6]);
        assert!(bridge.take_playback().is_empty());
    }
}
