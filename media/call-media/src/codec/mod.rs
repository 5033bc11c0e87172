//! Audio codecs usable by the media pipeline

use crate::audio::AudioFormat;

mod g711;

pub use g711::{Pcma, Pcmu};

/// Payload type of G.722 which, for historical reasons, advertises an 8kHz clock while sampling
/// at 16kHz
pub const G722_PAYLOAD_TYPE: u8 = 9;

/// Audio encoder/decoder pair for a single RTP payload type
pub trait AudioCodec: Send {
    fn payload_type(&self) -> u8;

    fn name(&self) -> &str;

    /// Clock rate of the RTP timestamp
    fn clock_rate(&self) -> u32;

    /// Sample rate of the PCM audio the codec consumes and produces
    fn sample_rate(&self) -> u32 {
        self.clock_rate()
    }

    fn channels(&self) -> u16 {
        1
    }

    /// Number of samples per channel in a single frame
    fn frame_size(&self) -> usize;

    /// Encode exactly one frame of interleaved PCM, appending the payload to `out`
    fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>);

    /// Decode a payload, appending the interleaved PCM to `out`
    fn decode(&mut self, payload: &[u8], out: &mut Vec<i16>);

    fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate(), self.channels())
    }
}

/// Increment of the RTP timestamp per encoded frame
pub(crate) fn timestamp_increment(codec: &dyn AudioCodec) -> u32 {
    if codec.payload_type() == G722_PAYLOAD_TYPE {
        return 160;
    }

    let samples = codec.frame_size() as u64 * u64::from(codec.clock_rate());

    (samples / u64::from(codec.sample_rate().max(1))) as u32
}

/// Duration of a single frame in milliseconds, 20ms if it cannot be computed
pub(crate) fn frame_duration_ms(codec: &dyn AudioCodec) -> u64 {
    let sample_rate = u64::from(codec.sample_rate());

    if sample_rate == 0 {
        return 20;
    }

    match codec.frame_size() as u64 * 1000 / sample_rate {
        0 => 20,
        ms => ms,
    }
}

/// Payload types of a codec list, in negotiated order
pub(crate) fn payload_types(codecs: &[Box<dyn AudioCodec>]) -> Vec<u8> {
    codecs.iter().map(|codec| codec.payload_type()).collect()
}
