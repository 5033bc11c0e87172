mod ntp_timestamp;
mod rtp_packet;
mod session;
mod telephone_event;

pub use ntp_timestamp::NtpTimestamp;
pub use rtp_packet::RtpPacket;
pub use session::{RemoteReport, RtpStatistics, StatisticsSnapshot};
pub use telephone_event::{TelephoneEvent, TelephoneEventError};

pub use rtcp_types;
pub use rtp_types;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ssrc(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedSequenceNumber(pub u64);

impl ExtendedSequenceNumber {
    pub fn increase_one(&mut self) -> SequenceNumber {
        self.0 += 1;
        self.truncated()
    }

    pub fn truncated(&self) -> SequenceNumber {
        SequenceNumber((self.0 & u64::from(u16::MAX)) as u16)
    }

    pub fn guess_extended(&self, seq: SequenceNumber) -> ExtendedSequenceNumber {
        ExtendedSequenceNumber(wrapping_counter_to_u64_counter(
            self.0,
            u64::from(seq.0),
            u64::from(u16::MAX) + 1,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtpTimestamp(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtendedRtpTimestamp(pub u64);

impl ExtendedRtpTimestamp {
    pub fn truncated(&self) -> RtpTimestamp {
        RtpTimestamp(self.0 as u32)
    }

    pub fn guess_extended(&self, timestamp: RtpTimestamp) -> ExtendedRtpTimestamp {
        ExtendedRtpTimestamp(wrapping_counter_to_u64_counter(
            self.0,
            u64::from(timestamp.0),
            u64::from(u32::MAX) + 1,
        ))
    }
}

/// Map a wrapping counter value onto the u64 counter closest to `reference`
fn wrapping_counter_to_u64_counter(reference: u64, got: u64, modulus: u64) -> u64 {
    let base = reference - (reference % modulus);

    [base.checked_sub(modulus), Some(base), base.checked_add(modulus)]
        .into_iter()
        .flatten()
        .map(|base| base + got)
        .min_by_key(|candidate| candidate.abs_diff(reference))
        .unwrap_or(got)
}
