use super::dtmf::DtmfQueue;
use crate::{codec, pipeline::MediaCodecPipeline};
use bytes::Bytes;
use rtp::{
    ExtendedSequenceNumber, RtpPacket, RtpTimestamp, Ssrc, TelephoneEvent, TelephoneEventError,
};
use std::time::{Duration, Instant};

/// The RTP timestamp is realigned to the monotonic clock every this many audio packets
const REALIGN_INTERVAL: u64 = 100;

/// Where the RTP timestamp was at a known point in time
#[derive(Debug, Clone, Copy)]
struct Anchor {
    instant: Instant,
    timestamp: u32,
    clock_rate: u32,
}

/// Packetizer of a session's outgoing stream
///
/// Produces the audio or telephone-event packets for every tick of the send task.
#[derive(Debug)]
pub(crate) struct Outbound {
    ssrc: Ssrc,
    sequence_number: ExtendedSequenceNumber,
    timestamp: u32,
    dtmf_payload_type: u8,
    /// Duration of a single digit in telephone-event clock units
    dtmf_duration: u32,
    dtmf: DtmfQueue,
    audio_packets: u64,
    anchor: Option<Anchor>,
}

impl Outbound {
    pub(crate) fn new(dtmf_payload_type: u8, dtmf_duration: Duration) -> Self {
        let dtmf_duration =
            dtmf_duration.as_millis() as u64 * u64::from(TelephoneEvent::CLOCK_RATE) / 1000;

        Self {
            ssrc: Ssrc(rand::random()),
            sequence_number: ExtendedSequenceNumber(rand::random_range(0xF..0x7FF)),
            timestamp: rand::random(),
            dtmf_payload_type,
            dtmf_duration: dtmf_duration.min(u64::from(u16::MAX)) as u32,
            dtmf: DtmfQueue::default(),
            audio_packets: 0,
            anchor: None,
        }
    }

    pub(crate) fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    #[cfg(test)]
    pub(crate) fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub(crate) fn set_dtmf_payload_type(&mut self, payload_type: u8) {
        self.dtmf_payload_type = payload_type;
    }

    pub(crate) fn queue_digit(&mut self, digit: char) -> Result<(), TelephoneEventError> {
        let event = TelephoneEvent::digit_to_event(digit)?;
        self.dtmf.push(event, self.dtmf_duration);
        Ok(())
    }

    pub(crate) fn pending_digits(&self) -> usize {
        self.dtmf.len()
    }

    /// Produce the packets of a single tick of `tick_ms` milliseconds
    pub(crate) fn tick(
        &mut self,
        pipeline: &mut MediaCodecPipeline,
        tick_ms: u64,
        now: Instant,
    ) -> Vec<RtpPacket> {
        let Some(codec) = pipeline.encoder() else {
            return vec![];
        };

        let payload_type = codec.payload_type();
        let clock_rate = codec.clock_rate();
        let increment = codec::timestamp_increment(codec);

        let dtmf_increment = tick_ms * u64::from(TelephoneEvent::CLOCK_RATE) / 1000;

        if let Some(dtmf) = self.dtmf.tick(dtmf_increment as u32, self.timestamp) {
            // Keep the capture buffer from growing while no audio is sent
            pipeline.discard_frame();

            let packets = (0..dtmf.count)
                .map(|i| {
                    self.packet(
                        self.dtmf_payload_type,
                        dtmf.timestamp,
                        dtmf.marker && i == 0,
                        Bytes::copy_from_slice(&dtmf.payload),
                    )
                })
                .collect();

            self.timestamp = self.timestamp.wrapping_add(increment);

            return packets;
        }

        let mut payload = Vec::new();
        if pipeline.encode(&mut payload) == 0 {
            return vec![];
        }

        let timestamp = self.timestamp;
        let packet = self.packet(payload_type, timestamp, false, payload.into());

        self.timestamp = self.timestamp.wrapping_add(increment);
        self.audio_packets += 1;
        self.realign(now, clock_rate, timestamp);

        vec![packet]
    }

    fn packet(&mut self, pt: u8, timestamp: u32, marker: bool, payload: Bytes) -> RtpPacket {
        RtpPacket {
            pt,
            sequence_number: self.sequence_number.increase_one(),
            ssrc: self.ssrc,
            timestamp: RtpTimestamp(timestamp),
            marker,
            payload,
        }
    }

    /// Move the timestamp forward if the stream fell behind the clock, e.g. due to a capture stall
    fn realign(&mut self, now: Instant, clock_rate: u32, sent_timestamp: u32) {
        let anchor = match self.anchor {
            Some(anchor) if anchor.clock_rate == clock_rate => anchor,
            _ => {
                self.anchor = Some(Anchor {
                    instant: now,
                    timestamp: sent_timestamp,
                    clock_rate,
                });
                return;
            }
        };

        if self.audio_packets % REALIGN_INTERVAL != 0 {
            return;
        }

        let elapsed = now.saturating_duration_since(anchor.instant);
        let elapsed_units = elapsed.as_millis() as u64 * u64::from(clock_rate) / 1000;
        let expected = anchor.timestamp.wrapping_add(elapsed_units as u32);

        if (expected.wrapping_sub(self.timestamp) as i32) > 0 {
            log::debug!(
                "RTP timestamp fell behind by {} units, realigning",
                expected.wrapping_sub(self.timestamp)
            );

            self.timestamp = expected;
        }
    }
}
