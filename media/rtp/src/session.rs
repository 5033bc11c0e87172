use crate::{ExtendedRtpTimestamp, ExtendedSequenceNumber, NtpTimestamp, RtpPacket, Ssrc};
use rtcp_types::{
    Compound, CompoundBuilder, Packet, ReceiverReport, ReportBlock, ReportBlockBuilder,
    RtcpPacketWriter, RtcpPacketWriterExt, RtcpWriteError, SdesBuilder, SdesChunk, SdesItem,
    SenderReport,
};
use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

/// SDES item type of the canonical name
const SDES_CNAME: u8 = 1;

/// Don't track an unbounded amount of remote sources
const MAX_RECEIVERS: usize = 64;

/// Number of sent sender reports a peer's report block may refer to
const MAX_SENT_REPORTS: usize = 8;

/// Statistics of a single RTP session (1 sender, many receivers)
///
/// Tracks sent and received packets and generates/consumes the RTCP sender & receiver reports.
#[derive(Debug)]
pub struct RtpStatistics {
    ssrc: Ssrc,
    clock_rate: u32,
    cname: Option<String>,

    sender: Option<SenderState>,
    receiver: Vec<ReceiverState>,

    remote: Option<RemoteReport>,
}

#[derive(Debug)]
struct SenderState {
    ntp_timestamp: NtpTimestamp,
    rtp_timestamp: ExtendedRtpTimestamp,

    sender_pkg_count: u32,
    sender_octet_count: u32,

    /// Compact NTP timestamps of the most recent sender reports
    reports_sent: VecDeque<u32>,
}

#[derive(Debug)]
struct ReceiverState {
    ssrc: Ssrc,

    last_rtp_received: Option<(Instant, ExtendedRtpTimestamp)>,
    base_sequence_number: ExtendedSequenceNumber,
    max_sequence_number: ExtendedSequenceNumber,
    received: u64,
    jitter: f32,

    expected_prior: u64,
    received_prior: u64,
    fraction_lost: u8,
    total_lost: u64,

    /// Compact NTP timestamp of the last sender report and when it was received
    last_sr: Option<(u32, Instant)>,
}

impl ReceiverState {
    fn new(ssrc: Ssrc, packet: &RtpPacket, now: Instant) -> Self {
        let sequence_number = ExtendedSequenceNumber(packet.sequence_number.0.into());

        Self {
            ssrc,
            last_rtp_received: Some((now, ExtendedRtpTimestamp(packet.timestamp.0.into()))),
            base_sequence_number: sequence_number,
            max_sequence_number: sequence_number,
            received: 1,
            jitter: 0.0,
            expected_prior: 0,
            received_prior: 0,
            fraction_lost: 0,
            total_lost: 0,
            last_sr: None,
        }
    }

    fn expected(&self) -> u64 {
        self.max_sequence_number.0 - self.base_sequence_number.0 + 1
    }
}

/// Reception quality of our stream as reported by the remote peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteReport {
    /// Fraction of packets lost since the previous report (0.0..=1.0)
    pub fraction_lost: f32,
    pub cumulative_lost: u32,
    pub jitter: Duration,
    /// Round trip time derived from the delay since our last sender report
    pub rtt: Option<Duration>,
}

/// Point in time view of the session statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsSnapshot {
    pub packets_sent: u32,
    pub octets_sent: u32,
    pub packets_received: u64,
    /// Fraction of packets lost in the last report interval (0.0..=1.0)
    pub fraction_lost: f32,
    pub cumulative_lost: u64,
    pub jitter: Duration,
    pub rtt: Option<Duration>,
}

impl RtpStatistics {
    pub fn new(ssrc: Ssrc, clock_rate: u32) -> Self {
        Self {
            ssrc,
            clock_rate,
            cname: None,
            sender: None,
            receiver: vec![],
            remote: None,
        }
    }

    /// Canonical name put into the SDES packet of every report
    pub fn with_cname(mut self, cname: impl Into<String>) -> Self {
        self.cname = Some(cname.into());
        self
    }

    /// Sender ssrc of this session
    pub fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    /// Clock rate of the RTP timestamp
    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    pub fn set_clock_rate(&mut self, clock_rate: u32) {
        self.clock_rate = clock_rate;
    }

    /// Register an RTP packet before sending it out
    pub fn send_rtp(&mut self, packet: &RtpPacket) {
        let sender_status = self.sender.get_or_insert(SenderState {
            ntp_timestamp: NtpTimestamp::ZERO,
            rtp_timestamp: ExtendedRtpTimestamp(packet.timestamp.0.into()),

            sender_pkg_count: 0,
            sender_octet_count: 0,

            reports_sent: VecDeque::new(),
        });

        sender_status.ntp_timestamp = NtpTimestamp::now();
        sender_status.rtp_timestamp = sender_status.rtp_timestamp.guess_extended(packet.timestamp);

        sender_status.sender_pkg_count = sender_status.sender_pkg_count.wrapping_add(1);
        sender_status.sender_octet_count = sender_status
            .sender_octet_count
            .wrapping_add(packet.payload.len() as u32);
    }

    /// Register a received RTP packet
    pub fn recv_rtp(&mut self, packet: &RtpPacket) {
        let now = Instant::now();

        let Some(receiver_status) = self.receiver.iter_mut().find(|r| r.ssrc == packet.ssrc)
        else {
            if self.receiver.len() >= MAX_RECEIVERS {
                log::debug!("ignoring packet of new source {:?}", packet.ssrc);
                return;
            }

            self.receiver
                .push(ReceiverState::new(packet.ssrc, packet, now));
            return;
        };

        receiver_status.received += 1;

        let sequence_number = receiver_status
            .max_sequence_number
            .guess_extended(packet.sequence_number);

        if sequence_number > receiver_status.max_sequence_number {
            receiver_status.max_sequence_number = sequence_number;
        }

        let Some((last_rtp_instant, last_rtp_timestamp)) = receiver_status.last_rtp_received
        else {
            return;
        };

        let timestamp = last_rtp_timestamp.guess_extended(packet.timestamp);

        // Only update jitter if the timestamp changes
        if timestamp > last_rtp_timestamp {
            // Rj - Ri
            let a = now - last_rtp_instant;
            let a = (a.as_secs_f32() * self.clock_rate as f32) as i64;

            // Sj - Si
            let b = (timestamp.0 - last_rtp_timestamp.0) as i64;

            // (Rj - Ri) - (Sj - Si)
            let d = a.abs_diff(b);

            receiver_status.jitter += (d as f32 - receiver_status.jitter) / 16.;
            receiver_status.last_rtp_received = Some((now, timestamp));
        }
    }

    /// Consume an incoming RTCP compound packet
    ///
    /// Returns the remote peer's view of our stream if the packet contained a report about it.
    pub fn recv_rtcp(&mut self, compound: Compound<'_>) -> Option<RemoteReport> {
        let now = Instant::now();
        let mut remote = None;

        for packet in compound {
            let packet = match packet {
                Ok(packet) => packet,
                Err(e) => {
                    log::warn!("Failed to parse RTCP packet in compound packet, {e}");
                    break;
                }
            };

            match packet {
                Packet::Sr(sender_report) => {
                    if let Some(receiver) = self
                        .receiver
                        .iter_mut()
                        .find(|r| r.ssrc.0 == sender_report.ssrc())
                    {
                        let compact = (sender_report.ntp_timestamp() >> 16) as u32;
                        receiver.last_sr = Some((compact, now));
                    }

                    for report_block in sender_report.report_blocks() {
                        remote = remote.or(self.handle_report_block(report_block));
                    }
                }
                Packet::Rr(receiver_report) => {
                    for report_block in receiver_report.report_blocks() {
                        remote = remote.or(self.handle_report_block(report_block));
                    }
                }
                _ => {}
            }
        }

        if remote.is_some() {
            self.remote = remote;
        }

        remote
    }

    fn handle_report_block(&self, report_block: ReportBlock<'_>) -> Option<RemoteReport> {
        if report_block.ssrc() != self.ssrc.0 {
            return None;
        }

        let last_sr = report_block.last_sender_report_timestamp();
        let delay = report_block.delay_since_last_sender_report_timestamp();

        // RTT = A - LSR - DLSR, only for reports about a sender report we actually sent
        let rtt: Option<Duration> = self
            .sender
            .as_ref()
            .filter(|sender| last_sr != 0 && sender.reports_sent.contains(&last_sr))
            .and_then(|_| {
                let arrival = NtpTimestamp::now().to_fixed_u32();
                let rtt = arrival.wrapping_sub(last_sr).saturating_sub(delay);

                (NtpTimestamp::from_fixed_u32(rtt) - NtpTimestamp::ZERO)
                    .try_into()
                    .ok()
            });

        Some(RemoteReport {
            fraction_lost: f32::from(report_block.fraction_lost()) / 256.0,
            cumulative_lost: report_block.cumulative_lost(),
            jitter: Duration::from_secs_f32(
                report_block.interarrival_jitter() as f32 / self.clock_rate.max(1) as f32,
            ),
            rtt,
        })
    }

    fn make_report_blocks(&mut self) -> Vec<ReportBlockBuilder> {
        let now = Instant::now();
        let mut report_blocks = vec![];

        for receiver in &mut self.receiver {
            let expected = receiver.expected();
            let expected_interval = expected - receiver.expected_prior;
            let received_interval = receiver.received - receiver.received_prior;

            receiver.expected_prior = expected;
            receiver.received_prior = receiver.received;
            receiver.total_lost = expected.saturating_sub(receiver.received);

            let lost_interval = expected_interval.saturating_sub(received_interval);

            receiver.fraction_lost = if expected_interval == 0 {
                0
            } else {
                ((lost_interval << 8) / expected_interval).min(255) as u8
            };

            let (last_sr, delay) = if let Some((last_sr, received_at)) = receiver.last_sr {
                let delay = now - received_at;
                let delay = (delay.as_secs_f64() * 65536.0) as u32;

                (last_sr, delay)
            } else {
                (0, 0)
            };

            let report_block = ReportBlock::builder(receiver.ssrc.0)
                .fraction_lost(receiver.fraction_lost)
                .cumulative_lost(receiver.total_lost as u32)
                .extended_sequence_number(lower_32bits(receiver.max_sequence_number.0))
                .interarrival_jitter(receiver.jitter as u32)
                .last_sender_report_timestamp(last_sr)
                .delay_since_last_sender_report_timestamp(delay);

            report_blocks.push(report_block);
        }

        report_blocks
    }

    /// Generate a RTCP compound packet containing a sender or receiver report and a SDES packet.
    ///
    /// This resets the interval loss counter of every receiver.
    pub fn rtcp_report(&mut self) -> Result<Vec<u8>, RtcpWriteError> {
        let now = NtpTimestamp::now();
        let report_blocks = self.make_report_blocks();
        let clock_rate = self.clock_rate;

        let mut compound = CompoundBuilder::default();

        if let Some(sender_info) = &mut self.sender {
            let rtp_timestamp = {
                let offset = (now - sender_info.ntp_timestamp).as_seconds_f64() * clock_rate as f64;
                sender_info.rtp_timestamp.0 + offset.max(0.0) as u64
            };

            let mut sr = SenderReport::builder(self.ssrc.0)
                .ntp_timestamp(now.to_fixed_u64())
                .rtp_timestamp(lower_32bits(rtp_timestamp))
                .packet_count(sender_info.sender_pkg_count)
                .octet_count(sender_info.sender_octet_count);

            for report_block in report_blocks {
                sr = sr.add_report_block(report_block);
            }

            if sender_info.reports_sent.len() == MAX_SENT_REPORTS {
                sender_info.reports_sent.pop_front();
            }
            sender_info.reports_sent.push_back(now.to_fixed_u32());
            compound = compound.add_packet(sr);
        } else {
            let mut rr = ReceiverReport::builder(self.ssrc.0);

            for report_block in report_blocks {
                rr = rr.add_report_block(report_block);
            }

            compound = compound.add_packet(rr);
        }

        if let Some(cname) = &self.cname {
            let chunk =
                SdesChunk::builder(self.ssrc.0).add_item(SdesItem::builder(SDES_CNAME, cname));
            compound = compound.add_packet(SdesBuilder::default().add_chunk(chunk));
        }

        let mut buf = vec![0u8; compound.calculate_size()?];
        let len = compound.write_into(&mut buf)?;
        buf.truncate(len);

        Ok(buf)
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let (packets_sent, octets_sent) = self
            .sender
            .as_ref()
            .map(|s| (s.sender_pkg_count, s.sender_octet_count))
            .unwrap_or_default();

        let mut snapshot = StatisticsSnapshot {
            packets_sent,
            octets_sent,
            rtt: self.remote.and_then(|remote| remote.rtt),
            ..StatisticsSnapshot::default()
        };

        for receiver in &self.receiver {
            snapshot.packets_received += receiver.received;
            snapshot.cumulative_lost += receiver.expected().saturating_sub(receiver.received);
            snapshot.fraction_lost = snapshot
                .fraction_lost
                .max(f32::from(receiver.fraction_lost) / 256.0);
            snapshot.jitter = snapshot.jitter.max(Duration::from_secs_f32(
                receiver.jitter / self.clock_rate.max(1) as f32,
            ));
        }

        snapshot
    }
}

fn lower_32bits(i: u64) -> u32 {
    (i & u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RtpTimestamp, SequenceNumber};
    use bytes::Bytes;

    fn packet(ssrc: u32, seq: u16, timestamp: u32) -> RtpPacket {
        RtpPacket {
            pt: 0,
            sequence_number: SequenceNumber(seq),
            ssrc: Ssrc(ssrc),
            timestamp: RtpTimestamp(timestamp),
            marker: false,
            payload: Bytes::from_static(&[0; 160]),
        }
    }

    #[test]
    fn receiver_report_counts_loss() {
        let mut stats = RtpStatistics::new(Ssrc(1), 8000);

        // seq 3 & 4 are missing
        for seq in [0, 1, 2, 5, 6, 7] {
            stats.recv_rtp(&packet(2, seq, u32::from(seq) * 160));
        }

        let report = stats.rtcp_report().unwrap();
        let mut compound = Compound::parse(&report).unwrap();

        let Packet::Rr(rr) = compound.next().unwrap().unwrap() else {
            panic!("expected receiver report")
        };

        let block = rr.report_blocks().next().unwrap();
        assert_eq!(block.ssrc(), 2);
        assert_eq!(block.cumulative_lost(), 2);
        assert_eq!(block.fraction_lost(), 64);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_received, 6);
        assert_eq!(snapshot.cumulative_lost, 2);
    }

    #[test]
    fn sender_report_after_sending() {
        let mut stats = RtpStatistics::new(Ssrc(1), 8000).with_cname("call@host");

        for seq in 0..10 {
            stats.send_rtp(&packet(1, seq, u32::from(seq) * 160));
        }

        let report = stats.rtcp_report().unwrap();
        let mut compound = Compound::parse(&report).unwrap();

        let Packet::Sr(sr) = compound.next().unwrap().unwrap() else {
            panic!("expected sender report")
        };

        assert_eq!(sr.ssrc(), 1);
        assert_eq!(sr.packet_count(), 10);
        assert_eq!(sr.octet_count(), 1600);

        let Packet::Sdes(..) = compound.next().unwrap().unwrap() else {
            panic!("expected source description")
        };

        assert_eq!(stats.snapshot().packets_sent, 10);
    }

    #[test]
    fn round_trip_time_from_peer_report() {
        let mut alice = RtpStatistics::new(Ssrc(1), 8000);
        let mut bob = RtpStatistics::new(Ssrc(2), 8000);

        for seq in 0..5 {
            let p = packet(1, seq, u32::from(seq) * 160);
            alice.send_rtp(&p);
            bob.recv_rtp(&p);
        }

        let sr = alice.rtcp_report().unwrap();
        assert!(bob.recv_rtcp(Compound::parse(&sr).unwrap()).is_none());

        std::thread::sleep(Duration::from_millis(20));

        let rr = bob.rtcp_report().unwrap();
        let remote = alice.recv_rtcp(Compound::parse(&rr).unwrap()).unwrap();

        assert_eq!(remote.cumulative_lost, 0);
        let rtt = remote.rtt.unwrap();
        assert!(rtt < Duration::from_millis(20), "{rtt:?}");
        assert_eq!(alice.snapshot().rtt, Some(rtt));
    }

    #[test]
    fn round_trip_time_uses_referenced_sender_report() {
        let mut alice = RtpStatistics::new(Ssrc(1), 8000);
        let mut bob = RtpStatistics::new(Ssrc(2), 8000);

        let p = packet(1, 0, 0);
        alice.send_rtp(&p);
        bob.recv_rtp(&p);

        // Before any sender report arrived the block carries LSR 0
        let rr = bob.rtcp_report().unwrap();
        let remote = alice.recv_rtcp(Compound::parse(&rr).unwrap()).unwrap();
        assert_eq!(remote.rtt, None);

        let first = alice.rtcp_report().unwrap();
        bob.recv_rtcp(Compound::parse(&first).unwrap());

        std::thread::sleep(Duration::from_millis(40));

        // Lost on the way, bob's next report still refers to the first one
        alice.rtcp_report().unwrap();

        let rr = bob.rtcp_report().unwrap();
        let remote = alice.recv_rtcp(Compound::parse(&rr).unwrap()).unwrap();

        let rtt = remote.rtt.unwrap();
        assert!(rtt < Duration::from_millis(20), "{rtt:?}");
    }

    #[test]
    fn unknown_last_sender_report_has_no_rtt() {
        let mut alice = RtpStatistics::new(Ssrc(1), 8000);
        alice.send_rtp(&packet(1, 0, 0));
        alice.rtcp_report().unwrap();

        let rr = ReceiverReport::builder(2).add_report_block(
            ReportBlock::builder(1)
                .last_sender_report_timestamp(0x1234_5678)
                .delay_since_last_sender_report_timestamp(0x100),
        );

        let mut buf = vec![0u8; rr.calculate_size().unwrap()];
        rr.write_into(&mut buf).unwrap();

        let remote = alice.recv_rtcp(Compound::parse(&buf).unwrap()).unwrap();
        assert_eq!(remote.rtt, None);
    }
}
