use crate::{
    audio::{AudioBridge, AudioFormat},
    codec::{self, AudioCodec},
    config::DspConfig,
    rate_limit::OccurrenceLimiter,
};
use context::AudioContext;
use std::sync::Arc;

mod context;

/// Consecutive packets with an unknown payload type reported in a single warning
const PAYLOAD_MISMATCH_WARN_INTERVAL: u32 = 250;

/// Encodes captured audio and decodes received payloads for a single call
///
/// Owns the negotiated codecs and the per direction conversion & processing state. The encoder
/// always uses the first codec of the list, the decoder follows the payload type of the received
/// packets.
pub struct MediaCodecPipeline {
    call_id: String,
    bridge: Arc<dyn AudioBridge>,
    dsp_config: DspConfig,
    codecs: Vec<Box<dyn AudioCodec>>,
    encoder: Option<AudioContext>,
    decoder: Option<AudioContext>,
    payload_mismatch: OccurrenceLimiter,
    generation: u64,
    killed: bool,
}

impl MediaCodecPipeline {
    pub fn new(call_id: impl Into<String>, bridge: Arc<dyn AudioBridge>, dsp: DspConfig) -> Self {
        Self {
            call_id: call_id.into(),
            bridge,
            dsp_config: dsp,
            codecs: vec![],
            encoder: None,
            decoder: None,
            payload_mismatch: OccurrenceLimiter::new(PAYLOAD_MISMATCH_WARN_INTERVAL),
            generation: 0,
            killed: false,
        }
    }

    /// Replace the negotiated codecs, the first one is used for encoding
    ///
    /// The conversion and processing state of each direction is only rebuilt when its audio format
    /// differs from the preferred codec's.
    pub fn set_codecs(&mut self, codecs: Vec<Box<dyn AudioCodec>>) {
        let Some(preferred) = codecs.first() else {
            log::warn!("call {}: empty codec list, media is disabled", self.call_id);
            self.codecs.clear();
            self.encoder = None;
            self.decoder = None;
            return;
        };

        let format = preferred.format();
        let payload_type = preferred.payload_type();
        let bridge_format = self.bridge.format();
        let mut rebuilt = false;

        match &mut self.encoder {
            Some(encoder) if encoder.codec_format == format => {
                encoder.codec = 0;
                encoder.payload_type = payload_type;
            }
            encoder => {
                log::debug!(
                    "call {}: initializing encoder for {} ({}Hz, {} channels)",
                    self.call_id,
                    preferred.name(),
                    format.sample_rate,
                    format.channels,
                );

                *encoder = Some(AudioContext::new(
                    0,
                    payload_type,
                    bridge_format,
                    format,
                    format,
                    self.dsp_config,
                ));
                rebuilt = true;
            }
        }

        // The decoder may have switched to another codec since the last update
        match &mut self.decoder {
            Some(decoder) if decoder.codec_format == format => {
                decoder.codec = 0;
                decoder.payload_type = payload_type;
            }
            decoder => {
                *decoder = Some(AudioContext::new(
                    0,
                    payload_type,
                    format,
                    bridge_format,
                    format,
                    self.dsp_config,
                ));
                rebuilt = true;
            }
        }

        if rebuilt {
            self.generation += 1;
        }

        self.codecs = codecs;
    }

    /// Payload types of the negotiated codecs
    pub fn payload_types(&self) -> Vec<u8> {
        codec::payload_types(&self.codecs)
    }

    /// Codec used to encode outgoing audio
    pub fn encoder(&self) -> Option<&dyn AudioCodec> {
        let encoder = self.encoder.as_ref()?;
        self.codecs.get(encoder.codec).map(|codec| &**codec)
    }

    /// Payload type the decoder currently expects
    pub fn decoder_payload_type(&self) -> Option<u8> {
        self.decoder.as_ref().map(|decoder| decoder.payload_type)
    }

    /// Number of times the conversion & processing state has been (re)built
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of captured samples consumed by a single encoded frame
    fn captured_frame_samples(&self, encoder: &AudioContext, codec: &dyn AudioCodec) -> usize {
        let bridge_format = self.bridge.format();

        let frames = codec.frame_size() as u64 * u64::from(bridge_format.sample_rate)
            / u64::from(encoder.codec_format.sample_rate.max(1));

        bridge_format.samples(frames as usize)
    }

    /// Encode one frame of captured audio into `out`
    ///
    /// Returns the number of bytes written, 0 if not enough audio was captured.
    pub fn encode(&mut self, out: &mut Vec<u8>) -> usize {
        if self.killed {
            return 0;
        }

        let Some(encoder) = self.encoder.as_ref() else {
            return 0;
        };
        let Some(codec) = self.codecs.get(encoder.codec) else {
            return 0;
        };

        let mut captured = vec![0; self.captured_frame_samples(encoder, &**codec)];
        let frame_samples = encoder.codec_format.samples(codec.frame_size());

        if !self.bridge.read_captured(&self.call_id, &mut captured) {
            return 0;
        }

        let bridge_format = self.bridge.format();
        let Some(encoder) = self.encoder.as_mut() else {
            return 0;
        };

        encoder.fade.apply(&mut captured, bridge_format);

        let mut pcm = encoder.resample(captured);
        pcm.resize(frame_samples, 0);

        if let Some(dsp) = &mut encoder.dsp {
            dsp.process(&mut pcm);
        }

        let start = out.len();
        self.codecs[encoder.codec].encode(&pcm, out);
        out.len() - start
    }

    /// Drop one frame worth of captured audio, keeping the capture buffer aligned while no audio
    /// is sent
    pub fn discard_frame(&mut self) -> usize {
        let Some(encoder) = self.encoder.as_ref() else {
            return 0;
        };
        let Some(codec) = self.codecs.get(encoder.codec) else {
            return 0;
        };

        let samples = self.captured_frame_samples(encoder, &**codec);
        self.bridge.discard_captured(&self.call_id, samples)
    }

    /// Decode a received payload and deliver it to the audio layer
    ///
    /// Switches the decoder when the payload type belongs to another negotiated codec. Returns the
    /// number of decoded samples.
    pub fn decode(&mut self, payload: &[u8], payload_type: u8) -> usize {
        if self.killed || payload.is_empty() {
            return 0;
        }

        let Some(decoder) = self.decoder.as_ref() else {
            return 0;
        };

        if decoder.payload_type != payload_type {
            let Some(index) = self
                .codecs
                .iter()
                .position(|codec| codec.payload_type() == payload_type)
            else {
                if self.payload_mismatch.hit() {
                    log::warn!(
                        "call {}: received payload type {payload_type} which was not negotiated",
                        self.call_id
                    );
                }

                return 0;
            };

            let codec = &self.codecs[index];
            let format = codec.format();

            log::info!(
                "call {}: switching decoder to {} (payload type {payload_type})",
                self.call_id,
                codec.name(),
            );

            self.decoder = Some(AudioContext::new(
                index,
                payload_type,
                format,
                self.bridge.format(),
                format,
                self.dsp_config,
            ));
        }

        self.payload_mismatch.reset();

        let Some(decoder) = self.decoder.as_mut() else {
            return 0;
        };

        let mut pcm = vec![];
        self.codecs[decoder.codec].decode(payload, &mut pcm);

        let decoded = pcm.len();

        if let Some(dsp) = &mut decoder.dsp {
            dsp.process(&mut pcm);
        }

        decoder.fade.apply(&mut pcm, decoder.codec_format);

        let pcm = decoder.resample(pcm);
        self.bridge.write_playback(&self.call_id, &pcm);

        decoded
    }

    /// Stop processing audio, all further calls to [`encode`](Self::encode) and
    /// [`decode`](Self::decode) are no-ops
    pub fn kill(&mut self) {
        self.killed = true;
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Audio format of the audio layer
    pub fn bridge_format(&self) -> AudioFormat {
        self.bridge.format()
    }
}
