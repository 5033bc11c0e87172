//! G.711 companding codecs (PCMU & PCMA)

use super::AudioCodec;

/// Samples per channel in a 20ms frame at 8kHz
const DEFAULT_FRAME_SIZE: usize = 160;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Upper bounds of the A-law segments for 13 bit input
const ALAW_SEGMENT_END: [i32; 8] = [0x1F, 0x3F, 0x7F, 0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF];

fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = i32::from(sample);

    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0
    };

    let pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    // pcm is at least ULAW_BIAS so the highest set bit is in 7..=14
    let highest_bit = 31 - pcm.leading_zeros() as i32;
    let exponent = highest_bit - 7;
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

fn ulaw_to_linear(ulaw: u8) -> i16 {
    let ulaw = !ulaw;

    let exponent = (ulaw >> 4) & 0x07;
    let mantissa = i32::from(ulaw & 0x0F);
    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;

    if ulaw & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

fn linear_to_alaw(sample: i16) -> u8 {
    let mut pcm = i32::from(sample) >> 3;

    let mask = if pcm >= 0 {
        0xD5
    } else {
        pcm = -pcm - 1;
        0x55
    };

    let Some(segment) = ALAW_SEGMENT_END.iter().position(|&end| pcm <= end) else {
        return 0x7F ^ mask;
    };

    let quantized = if segment < 2 {
        (pcm >> 1) & 0x0F
    } else {
        (pcm >> segment) & 0x0F
    };

    ((((segment as i32) << 4) | quantized) ^ i32::from(mask)) as u8
}

fn alaw_to_linear(alaw: u8) -> i16 {
    let alaw = alaw ^ 0x55;

    let mut magnitude = i32::from(alaw & 0x0F) << 4;

    match (alaw & 0x70) >> 4 {
        0 => magnitude += 8,
        1 => magnitude += 0x108,
        segment => {
            magnitude += 0x108;
            magnitude <<= segment - 1;
        }
    }

    if alaw & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}

macro_rules! g711_codec {
    ($name:ident, $label:literal, $pt:literal, $encode:ident, $decode:ident) => {
        #[doc = concat!("G.711 ", $label, " codec, mono 8kHz")]
        #[derive(Debug, Clone)]
        pub struct $name {
            frame_size: usize,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    frame_size: DEFAULT_FRAME_SIZE,
                }
            }
        }

        impl $name {
            /// Use frames of `frame_size` samples instead of 20ms
            pub fn with_frame_size(mut self, frame_size: usize) -> Self {
                self.frame_size = frame_size;
                self
            }
        }

        impl AudioCodec for $name {
            fn payload_type(&self) -> u8 {
                $pt
            }

            fn name(&self) -> &str {
                $label
            }

            fn clock_rate(&self) -> u32 {
                8000
            }

            fn frame_size(&self) -> usize {
                self.frame_size
            }

            fn encode(&mut self, pcm: &[i16], out: &mut Vec<u8>) {
                out.extend(pcm.iter().copied().map($encode));
            }

            fn decode(&mut self, payload: &[u8], out: &mut Vec<i16>) {
                out.extend(payload.iter().copied().map($decode));
            }
        }
    };
}

g711_codec!(Pcmu, "PCMU", 0, linear_to_ulaw, ulaw_to_linear);
g711_codec!(Pcma, "PCMA", 8, linear_to_alaw, alaw_to_linear);
