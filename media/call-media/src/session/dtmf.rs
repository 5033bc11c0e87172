use rtp::TelephoneEvent;
use std::collections::VecDeque;

/// The final packet of an event is sent multiple times in case it gets lost
const END_PACKET_COUNT: usize = 3;

/// Power level of generated tones in -dBm0
const VOLUME: u8 = 10;

#[derive(Debug)]
struct DtmfEvent {
    event: u8,
    /// Total duration in 8kHz units
    duration: u32,
    /// Duration covered by the packets sent so far
    elapsed: u32,
    /// RTP timestamp of the event, set when its first packet is sent
    timestamp: Option<u32>,
}

/// Packet(s) to send for a DTMF event in a single tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DtmfPacket {
    pub(crate) payload: [u8; 4],
    pub(crate) marker: bool,
    pub(crate) timestamp: u32,
    /// Number of copies to send
    pub(crate) count: usize,
}

/// Queue of DTMF digits waiting to be sent as RFC 4733 telephone events
#[derive(Debug, Default)]
pub(crate) struct DtmfQueue {
    events: VecDeque<DtmfEvent>,
}

impl DtmfQueue {
    pub(crate) fn push(&mut self, event: u8, duration: u32) {
        self.events.push_back(DtmfEvent {
            event,
            duration,
            elapsed: 0,
            timestamp: None,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Advance the current event by `increment` timestamp units
    ///
    /// `timestamp` is the session's current RTP timestamp, it is used for all packets of an
    /// event starting in this tick.
    pub(crate) fn tick(&mut self, increment: u32, timestamp: u32) -> Option<DtmfPacket> {
        let current = self.events.front_mut()?;

        let marker = current.timestamp.is_none();
        let event_timestamp = *current.timestamp.get_or_insert(timestamp);

        let end = current.duration.saturating_sub(current.elapsed) <= increment;
        current.elapsed = current.elapsed.saturating_add(increment).min(current.duration);

        let payload = TelephoneEvent {
            event: current.event,
            end,
            volume: VOLUME,
            duration: current.elapsed.min(u32::from(u16::MAX)) as u16,
        }
        .to_bytes();

        if end {
            self.events.pop_front();
        }

        Some(DtmfPacket {
            payload,
            marker,
            timestamp: event_timestamp,
            count: if end { END_PACKET_COUNT } else { 1 },
        })
    }
}
